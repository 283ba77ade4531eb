use crate::codec::DecodedMessage;
use crate::endpoint::Endpoint;
use crate::error::endpoint::EndpointError;
use crate::proto::{AuthErrorCode, ErrorCode};
use crate::registry::WoofMessage;
use crate::session::SharedSession;
use crate::transport::{ConnectionId, Transport};

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use log::warn;
use uuid::Uuid;

/// Application hook invoked for every message that is not a correlated reply.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        request: &RequestContext,
        message: &DecodedMessage,
    ) -> Result<(), EndpointError>;
}

/// Where a message came from and how to answer it.
#[derive(Clone)]
pub struct RequestContext {
    endpoint: Arc<Endpoint>,
    transport: Arc<dyn Transport>,
    message_id: Option<Uuid>,
}

impl RequestContext {
    pub fn new(
        endpoint: Arc<Endpoint>,
        transport: Arc<dyn Transport>,
        message_id: Option<Uuid>,
    ) -> Self {
        Self {
            endpoint,
            transport,
            message_id,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.transport.connection_id()
    }

    pub fn message_id(&self) -> Option<Uuid> {
        self.message_id
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub async fn session(&self) -> SharedSession {
        self.endpoint.sessions().session(self.connection_id()).await
    }

    /// Reply tagged with the request's message id.
    pub async fn reply<M: WoofMessage>(&self, message: &M) -> Result<(), EndpointError> {
        self.endpoint
            .codec()
            .send_encoded(self.transport.as_ref(), message, self.message_id)
            .await?;
        Ok(())
    }

    pub async fn reply_error(
        &self,
        code: ErrorCode,
        native_code: i32,
        description: impl Into<String>,
    ) -> Result<(), EndpointError> {
        self.endpoint
            .send_error(
                self.transport.as_ref(),
                self.message_id,
                code,
                native_code,
                description.into(),
            )
            .await
    }

    pub async fn reply_auth_error(
        &self,
        code: AuthErrorCode,
        description: impl Into<String>,
    ) -> Result<(), EndpointError> {
        self.endpoint
            .send_auth_error(self.transport.as_ref(), self.message_id, code, description.into())
            .await
    }
}

/// Handlers run one after another; the first failure is reported.
#[derive(Default)]
pub struct HandlerSet {
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
}

impl HandlerSet {
    pub fn add(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn dispatch(
        &self,
        request: &RequestContext,
        message: &DecodedMessage,
    ) -> Result<(), EndpointError> {
        let mut first_error = None;
        for handler in self.snapshot() {
            if let Err(e) = handler.handle(request, message).await {
                warn!(
                    "{} handler failed for {}: {}",
                    request.connection_id(),
                    message.context.name,
                    e
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
