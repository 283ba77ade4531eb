//! Built-in request handling on the server side.

use crate::BUILD_UNIX_TIME;
use crate::codec::DecodedMessage;
use crate::endpoint::{MessageHandler, RequestContext};
use crate::error::endpoint::EndpointError;
use crate::proto::{
    ApiQueryRequest, ApiQueryResponse, AuthErrorCode, ErrorCode, IdentifyRequest,
    IdentifyResponse, PingRequest, PingResponse, SignInRequest, SignInResponse, SignOutRequest,
    SignOutResponse, StreamFragmentRequest,
};
use crate::server::ServerShared;
use crate::server::stream::read_fragment;
use crate::transport::CloseReason;

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

pub(crate) struct ServerDispatcher {
    shared: Arc<ServerShared>,
}

impl ServerDispatcher {
    pub(crate) fn new(shared: Arc<ServerShared>) -> Self {
        Self { shared }
    }

    async fn sign_in(
        &self,
        request: &RequestContext,
        sign_in: &SignInRequest,
        signature_valid: Option<bool>,
    ) -> Result<(), EndpointError> {
        if signature_valid != Some(true) {
            return self
                .deny(request, AuthErrorCode::ApiAccessDenied, "sign-in signature is invalid")
                .await;
        }

        let auth = &self.shared.auth;
        let Some(user) = auth.get_user_for_api_key(&sign_in.api_key).await? else {
            return self
                .deny(request, AuthErrorCode::UserAccessDenied, "no user for api key")
                .await;
        };
        let Some(key) = auth.get_key_for_api_key(&sign_in.api_key).await? else {
            return self
                .deny(request, AuthErrorCode::ApiAccessDenied, "no secret for api key")
                .await;
        };
        let Some(client) = auth.get_client_by_id(&user.client_id).await? else {
            return self
                .deny(request, AuthErrorCode::ClientAccessDenied, "unknown client")
                .await;
        };

        let response = SignInResponse {
            user_id: user.user_id.clone(),
            user_name: user.name.clone(),
            client_id: client.client_id.clone(),
            client_name: client.name.clone(),
        };

        {
            let session = request.session().await;
            let mut session = session.write().await;
            session.key = Some(key);
            session.user = Some(user);
            session.client = Some(client);
        }

        info!(
            "{} signed in as {} ({})",
            request.connection_id(),
            response.user_id,
            response.client_id
        );
        request.reply(&response).await
    }

    async fn deny(
        &self,
        request: &RequestContext,
        code: AuthErrorCode,
        description: &str,
    ) -> Result<(), EndpointError> {
        warn!(
            "{} sign-in denied ({code:?}): {description}",
            request.connection_id()
        );
        request.session().await.write().await.clear();
        request.reply_auth_error(code, description).await?;

        if self.shared.endpoint.config().security.close_on_auth_failure {
            request
                .transport()
                .close(CloseReason::PolicyViolation, description)
                .await?;
        }
        Ok(())
    }

    async fn sign_out(&self, request: &RequestContext) -> Result<(), EndpointError> {
        request.session().await.write().await.clear();
        info!("{} signed out", request.connection_id());
        request.reply(&SignOutResponse {}).await?;

        if self.shared.endpoint.config().security.close_on_sign_out {
            request
                .transport()
                .close(CloseReason::Normal, "signed out")
                .await?;
        }
        Ok(())
    }

    fn identify(&self) -> IdentifyResponse {
        let config = self.shared.endpoint.config();
        IdentifyResponse {
            name: config.identity.name.clone(),
            version: config.identity.version.clone(),
            build_time: Some(prost_types::Timestamp {
                seconds: BUILD_UNIX_TIME.parse().unwrap_or_default(),
                nanos: 0,
            }),
            uptime: prost_types::Duration::try_from(self.shared.endpoint.uptime()).ok(),
            timeout: prost_types::Duration::try_from(config.request_timeout()).ok(),
        }
    }

    async fn stream_fragment(
        &self,
        request: &RequestContext,
        fragment: &StreamFragmentRequest,
    ) -> Result<(), EndpointError> {
        let Some(provider) = &self.shared.streams else {
            return request
                .reply_error(ErrorCode::NotImplemented, 0, "streaming is not enabled")
                .await;
        };

        let Some(mut stream) = provider.get_stream_by_id(&fragment.stream_id).await? else {
            return request
                .reply_error(
                    ErrorCode::StreamNotFound,
                    0,
                    format!("stream {} not found", fragment.stream_id),
                )
                .await;
        };

        let length = fragment
            .length
            .min(self.shared.endpoint.config().limits.stream_fragment_size);
        let response = read_fragment(&mut *stream, fragment.offset, length).await?;
        debug!(
            "{} stream {} offset {} sent {} bytes (end: {})",
            request.connection_id(),
            fragment.stream_id,
            fragment.offset,
            response.data.len(),
            response.is_end
        );
        request.reply(&response).await
    }
}

#[async_trait]
impl MessageHandler for ServerDispatcher {
    async fn handle(
        &self,
        request: &RequestContext,
        message: &DecodedMessage,
    ) -> Result<(), EndpointError> {
        if let Some(sign_in) = message.downcast_ref::<SignInRequest>() {
            return self.sign_in(request, sign_in, message.signature_valid).await;
        }
        if message.is::<SignOutRequest>() {
            return self.sign_out(request).await;
        }
        if let Some(ping) = message.downcast_ref::<PingRequest>() {
            return request
                .reply(&PingResponse {
                    sent_at: ping.sent_at.clone(),
                })
                .await;
        }
        if message.is::<IdentifyRequest>() {
            return request.reply(&self.identify()).await;
        }
        if let Some(query) = message.downcast_ref::<ApiQueryRequest>() {
            let types = self
                .shared
                .endpoint
                .registry()
                .describe(query.exclude_internal);
            return request.reply(&ApiQueryResponse { types }).await;
        }
        if let Some(fragment) = message.downcast_ref::<StreamFragmentRequest>() {
            return self.stream_fragment(request, fragment).await;
        }

        if message.context.is_error() {
            warn!(
                "{} ignoring unsolicited {}",
                request.connection_id(),
                message.context.name
            );
            return Ok(());
        }

        if self.shared.handlers.is_empty() {
            return request
                .reply_error(
                    ErrorCode::NotImplemented,
                    0,
                    format!("no handler for {}", message.context.name),
                )
                .await;
        }

        self.shared.handlers.dispatch(request, message).await
    }
}
