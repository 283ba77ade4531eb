//! Machinery shared by clients and servers: the per-connection receive loop,
//! request/response correlation and error replies.

mod handler;
mod state;

pub use handler::{HandlerSet, MessageHandler, RequestContext};
pub use state::{EndpointState, StateMachine};

use crate::codec::{DecodeResult, DecodedMessage, WoofCodec};
use crate::config::EndpointConfig;
use crate::correlation::{Reply, ResponseTable};
use crate::error::endpoint::EndpointError;
use crate::proto::{AuthErrorCode, AuthErrorResponse, ErrorCode, ErrorResponse};
use crate::registry::{MessageRegistry, WoofMessage};
use crate::session::SessionProvider;
use crate::session::auth::AuthenticationBackend;
use crate::transport::{CloseReason, Transport};

use common::ErrorLocation;

use std::panic::Location;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use tokio::sync::watch;
use uuid::Uuid;

/// Why a receive loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The peer closed the connection.
    Closed,
    /// The endpoint is shutting down.
    Cancelled,
    /// The peer announced a payload above the size limit.
    OverLimit,
    /// Framing broke down; the connection was closed with a protocol error.
    Fatal(String),
}

pub struct Endpoint {
    config: EndpointConfig,
    codec: WoofCodec,
    sessions: Arc<SessionProvider>,
    responses: Arc<ResponseTable>,
    state: StateMachine,
    shutdown: watch::Sender<bool>,
    started_at: OnceCell<Instant>,
}

impl Endpoint {
    pub fn new(
        config: EndpointConfig,
        registry: Arc<MessageRegistry>,
        sessions: SessionProvider,
        auth: Option<Arc<dyn AuthenticationBackend>>,
    ) -> Self {
        let sessions = Arc::new(sessions);
        let codec = WoofCodec::new(
            registry,
            Arc::clone(&sessions),
            auth,
            config.limits.receive_buffer_size as usize,
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            codec,
            sessions,
            responses: Arc::new(ResponseTable::new()),
            state: StateMachine::default(),
            shutdown,
            started_at: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn codec(&self) -> &WoofCodec {
        &self.codec
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        self.codec.registry()
    }

    pub fn sessions(&self) -> &Arc<SessionProvider> {
        &self.sessions
    }

    pub fn responses(&self) -> &Arc<ResponseTable> {
        &self.responses
    }

    pub fn state(&self) -> EndpointState {
        self.state.current()
    }

    pub fn lifecycle(&self) -> &StateMachine {
        &self.state
    }

    pub(crate) fn mark_started(&self) {
        let _ = self.started_at.set(Instant::now());
    }

    pub fn uptime(&self) -> Duration {
        self.started_at
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Cancel every receive loop and accept loop of this endpoint.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// One-way send with a fresh message id.
    pub async fn send_message<M: WoofMessage>(
        &self,
        transport: &dyn Transport,
        message: &M,
    ) -> Result<Uuid, EndpointError> {
        Ok(self.codec.send_encoded(transport, message, None).await?)
    }

    /// Send `request` and wait for the reply carrying the same message id.
    ///
    /// `timeout` defaults to the configured request timeout. Error replies are
    /// translated into [`EndpointError::Authentication`] and
    /// [`EndpointError::Remote`].
    pub async fn send_and_receive<Req, Resp>(
        &self,
        transport: &dyn Transport,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp, EndpointError>
    where
        Req: WoofMessage,
        Resp: WoofMessage,
    {
        if !transport.is_connected() {
            return Err(EndpointError::not_connected(format!(
                "{} is not connected",
                transport.connection_id()
            )));
        }

        let timeout = timeout.unwrap_or_else(|| self.config.request_timeout());
        let mut synchronizer = self.responses.new_synchronizer(transport.connection_id());
        let message_id = synchronizer.id();

        self.codec
            .send_encoded(transport, request, Some(message_id))
            .await?;

        let reply = synchronizer
            .wait(timeout)
            .await
            .map_err(|_| EndpointError::Timeout {
                message_id,
                timeout,
                location: ErrorLocation::from(Location::caller()),
            })?;

        translate_reply::<Resp>(message_id, reply)
    }

    /// Send an `ErrorResponse` correlated with `message_id`; uncorrelated
    /// failures are only logged so the peer's waiters are not released.
    pub async fn send_error(
        &self,
        transport: &dyn Transport,
        message_id: Option<Uuid>,
        code: ErrorCode,
        native_code: i32,
        description: String,
    ) -> Result<(), EndpointError> {
        let Some(message_id) = message_id else {
            debug!(
                "{} not replying {:?} to an uncorrelated message: {}",
                transport.connection_id(),
                code,
                description
            );
            return Ok(());
        };
        let response = ErrorResponse {
            code: code as i32,
            native_code,
            description,
        };
        self.codec
            .send_encoded(transport, &response, Some(message_id))
            .await?;
        Ok(())
    }

    pub async fn send_auth_error(
        &self,
        transport: &dyn Transport,
        message_id: Option<Uuid>,
        code: AuthErrorCode,
        description: String,
    ) -> Result<(), EndpointError> {
        let Some(message_id) = message_id else {
            debug!(
                "{} not replying {:?} to an uncorrelated message: {}",
                transport.connection_id(),
                code,
                description
            );
            return Ok(());
        };
        let response = AuthErrorResponse {
            code: code as i32,
            description,
        };
        self.codec
            .send_encoded(transport, &response, Some(message_id))
            .await?;
        Ok(())
    }

    /// Tell the peer the connection is unusable, then close it.
    async fn abort_connection(&self, transport: &dyn Transport, reason: CloseReason, description: &str) {
        let notice = ErrorResponse {
            code: ErrorCode::ProtocolViolation as i32,
            native_code: 0,
            description: description.to_string(),
        };
        if let Err(e) = self.codec.send_uncorrelated(transport, &notice).await {
            debug!("{} failed to send abort notice: {}", transport.connection_id(), e);
        }
        if let Err(e) = transport.close(reason, description).await {
            debug!("{} failed to close: {}", transport.connection_id(), e);
        }
    }

    /// Read and dispatch frames from `transport` until it closes, a fatal
    /// framing error occurs, or the endpoint shuts down.
    pub async fn run_receive_loop(
        self: Arc<Self>,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn MessageHandler>,
    ) -> LoopExit {
        let connection = transport.connection_id();
        let size_limit = self.config.max_message_size();
        let mut shutdown = self.shutdown.subscribe();
        debug!("{connection} receive loop started");

        let exit = loop {
            let decoded = tokio::select! {
                _ = shutdown.wait_for(|stopped| *stopped) => break LoopExit::Cancelled,
                decoded = self.codec.decode(transport.as_ref(), size_limit) => decoded,
            };

            match decoded {
                DecodeResult::Message(message) => {
                    self.dispatch(&transport, message, &handler);
                }
                DecodeResult::Closed => break LoopExit::Closed,
                DecodeResult::Unauthorized { header, context } => {
                    warn!(
                        "{connection} signature validation failed for {}",
                        context.name
                    );
                    if let Some(id) = header.message_id {
                        if let Some(pending) = self.responses.try_remove(&id, connection) {
                            pending.deliver(Reply::Unauthorized { context });
                            continue;
                        }
                    }
                    let replied = self
                        .send_auth_error(
                            transport.as_ref(),
                            header.message_id,
                            AuthErrorCode::ApiAccessDenied,
                            format!("signature validation failed for {}", context.name),
                        )
                        .await;
                    if let Err(e) = replied {
                        warn!("{connection} failed to send auth error: {e}");
                    }
                    if self.config.security.close_on_auth_failure {
                        if let Err(e) = transport
                            .close(CloseReason::PolicyViolation, "signature validation failed")
                            .await
                        {
                            debug!("{connection} failed to close: {e}");
                        }
                    }
                }
                DecodeResult::UnknownType { header, payload } => {
                    warn!(
                        "{connection} skipped {} bytes of unknown type {}",
                        payload.len(),
                        header.type_id
                    );
                    let replied = self
                        .send_error(
                            transport.as_ref(),
                            header.message_id,
                            ErrorCode::UnknownMessageType,
                            0,
                            format!("unknown message type {}", header.type_id),
                        )
                        .await;
                    if let Err(e) = replied {
                        warn!("{connection} failed to reply to unknown type: {e}");
                    }
                }
                DecodeResult::OverLimit { header, limit } => {
                    error!(
                        "{connection} announced {} byte payload for type {}, limit is {limit}",
                        header.payload_length, header.type_id
                    );
                    let description = format!(
                        "payload of {} bytes exceeds the {limit} byte limit",
                        header.payload_length
                    );
                    self.abort_connection(transport.as_ref(), CloseReason::MessageTooBig, &description)
                        .await;
                    break LoopExit::OverLimit;
                }
                DecodeResult::AuthBackendFailure {
                    header,
                    context,
                    error,
                } => {
                    error!("{connection} authentication backend failed for {}: {error}", context.name);
                    let failure = EndpointError::from(error);
                    let replied = self
                        .send_error(
                            transport.as_ref(),
                            header.message_id,
                            ErrorCode::InternalError,
                            failure.native_code(),
                            "authentication backend unavailable".to_string(),
                        )
                        .await;
                    if let Err(e) = replied {
                        warn!("{connection} failed to send internal error: {e}");
                    }
                }
                DecodeResult::Malformed(e) => {
                    if !transport.is_connected() {
                        break LoopExit::Closed;
                    }
                    error!("{connection} malformed frame: {e}");
                    self.abort_connection(transport.as_ref(), CloseReason::ProtocolError, "malformed frame")
                        .await;
                    break LoopExit::Fatal(e.to_string());
                }
            }
        };

        let released = self.responses.drain_connection(connection);
        if released > 0 {
            debug!("{connection} released {released} pending request(s)");
        }
        info!("{connection} receive loop ended: {exit:?}");
        exit
    }

    /// Replies and uncorrelated errors are settled inline; everything else is
    /// handed to the handler on its own task so the loop keeps reading.
    fn dispatch(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        message: DecodedMessage,
        handler: &Arc<dyn MessageHandler>,
    ) {
        let connection = transport.connection_id();

        match message.message_id() {
            Some(id) => {
                if let Some(pending) = self.responses.try_remove(&id, connection) {
                    if !pending.deliver(Reply::Message(message)) {
                        debug!("{connection} waiter for {id} gave up before its reply");
                    }
                    return;
                }
            }
            None if message.context.is_error() => {
                let released = self.responses.drain_connection(connection);
                warn!(
                    "{connection} received uncorrelated {}; released {released} pending request(s)",
                    message.context.name
                );
                return;
            }
            None => {}
        }

        let request = RequestContext::new(Arc::clone(self), Arc::clone(transport), message.message_id());
        let handler = Arc::clone(handler);
        tokio::spawn(async move {
            handle_message(request, message, handler).await;
        });
    }
}

async fn handle_message(
    request: RequestContext,
    message: DecodedMessage,
    handler: Arc<dyn MessageHandler>,
) {
    let Err(e) = handler.handle(&request, &message).await else {
        return;
    };

    let connection = request.connection_id();
    error!("{connection} failed to handle {}: {e}", message.context.name);
    if message.context.is_error() {
        return;
    }
    let replied = request
        .reply_error(ErrorCode::InternalError, e.native_code(), e.to_string())
        .await;
    if let Err(e) = replied {
        warn!("{connection} failed to send internal error: {e}");
    }
}

fn translate_reply<Resp: WoofMessage>(message_id: Uuid, reply: Reply) -> Result<Resp, EndpointError> {
    let message = match reply {
        Reply::Message(message) => message,
        Reply::Unauthorized { context } => {
            return Err(EndpointError::Authentication {
                code: AuthErrorCode::ApiAccessDenied,
                description: format!("reply {} failed signature validation", context.name),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Reply::Released => {
            return Err(EndpointError::NoReply {
                message_id,
                location: ErrorLocation::from(Location::caller()),
            });
        }
    };

    let type_name = message.context.name;
    if message.is::<Resp>() {
        return message.into_message::<Resp>().ok_or_else(|| EndpointError::UnexpectedMessage {
            type_name,
            payload: String::new(),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    if let Some(auth) = message.downcast_ref::<AuthErrorResponse>() {
        return Err(EndpointError::Authentication {
            code: AuthErrorCode::try_from(auth.code).unwrap_or(AuthErrorCode::Unspecified),
            description: auth.description.clone(),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    if let Some(remote) = message.downcast_ref::<ErrorResponse>() {
        return Err(EndpointError::Remote {
            code: ErrorCode::try_from(remote.code).unwrap_or(ErrorCode::Unspecified),
            native_code: remote.native_code,
            description: remote.description.clone(),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    Err(EndpointError::UnexpectedMessage {
        type_name,
        payload: format!("{:?}", message.message),
        location: ErrorLocation::from(Location::caller()),
    })
}
