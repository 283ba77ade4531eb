//! WOOF client: one outbound connection plus the built-in operations.

use crate::WOOF_SUBPROTOCOL;
use crate::codec::DecodedMessage;
use crate::config::EndpointConfig;
use crate::endpoint::{
    Endpoint, EndpointState, HandlerSet, LoopExit, MessageHandler, RequestContext,
};
use crate::error::endpoint::EndpointError;
use crate::error::stream::StreamError;
use crate::proto::{
    ApiMessageType, ApiQueryRequest, ApiQueryResponse, IdentifyRequest, IdentifyResponse,
    PingRequest, PingResponse, SignInRequest, SignInResponse, SignOutRequest, SignOutResponse,
    StreamFragmentRequest, StreamFragmentResponse,
};
use crate::registry::{MessageRegistry, WoofMessage};
use crate::session::SessionProvider;
use crate::session::auth::{ApiClient, ApiUser};
use crate::transport::{CloseReason, Transport, WebSocketTransport};

use common::{ErrorLocation, RedactedSecret};

use std::panic::Location;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use url::Url;
use uuid::Uuid;

pub struct WoofClient {
    endpoint: Arc<Endpoint>,
    handlers: Arc<HandlerSet>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    receive_loop: Mutex<Option<JoinHandle<LoopExit>>>,
}

impl WoofClient {
    pub fn new(config: EndpointConfig) -> Self {
        Self::with_registry(config, MessageRegistry::builtin())
    }

    pub fn with_registry(config: EndpointConfig, registry: Arc<MessageRegistry>) -> Self {
        Self {
            endpoint: Arc::new(Endpoint::new(
                config,
                registry,
                SessionProvider::single(),
                None,
            )),
            handlers: Arc::new(HandlerSet::default()),
            transport: Mutex::new(None),
            receive_loop: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn state(&self) -> EndpointState {
        self.endpoint.state()
    }

    /// Handlers see every non-reply message except pings.
    pub fn add_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.add(handler);
    }

    pub async fn is_connected(&self) -> bool {
        self.transport
            .lock()
            .await
            .as_ref()
            .is_some_and(|transport| transport.is_connected())
    }

    /// Connect to `url` (ws:// or wss://), negotiating the WOOF subprotocol.
    pub async fn start(&self, url: &str) -> Result<(), EndpointError> {
        self.endpoint.lifecycle().begin_start()?;

        match self.connect(url).await {
            Ok(transport) => {
                self.attach(transport).await;
                info!("Connected to {url}");
                Ok(())
            }
            Err(e) => {
                self.endpoint.lifecycle().abort_start();
                Err(e)
            }
        }
    }

    /// Run over an already-established transport.
    pub async fn start_with_transport(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<(), EndpointError> {
        self.endpoint.lifecycle().begin_start()?;
        self.attach(transport).await;
        Ok(())
    }

    async fn connect(&self, url: &str) -> Result<Arc<dyn Transport>, EndpointError> {
        let url = Url::parse(url).map_err(|e| handshake_error(format!("invalid url {url}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(handshake_error(format!(
                "unsupported scheme {} (expected ws or wss)",
                url.scheme()
            )));
        }

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| handshake_error(e.to_string()))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(WOOF_SUBPROTOCOL));

        let connect_timeout = self.endpoint.config().connect_timeout();
        let (stream, response) = tokio::time::timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| handshake_error(format!("connect timed out after {connect_timeout:?}")))?
            .map_err(|e| handshake_error(e.to_string()))?;

        let negotiated = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok());
        if negotiated != Some(WOOF_SUBPROTOCOL) {
            return Err(handshake_error(format!(
                "server did not accept subprotocol {WOOF_SUBPROTOCOL} (got {negotiated:?})"
            )));
        }

        Ok(Arc::new(WebSocketTransport::new(stream, None)))
    }

    async fn attach(&self, transport: Arc<dyn Transport>) {
        let endpoint = Arc::clone(&self.endpoint);
        let handler: Arc<dyn MessageHandler> = Arc::new(ClientDispatcher {
            handlers: Arc::clone(&self.handlers),
        });
        let loop_transport = Arc::clone(&transport);

        let receive_loop = tokio::spawn(async move {
            endpoint.run_receive_loop(loop_transport, handler).await
        });

        *self.transport.lock().await = Some(transport);
        *self.receive_loop.lock().await = Some(receive_loop);
        self.endpoint.mark_started();
        self.endpoint.lifecycle().complete_start();
    }

    /// Close the connection gracefully within the disconnect timeout.
    pub async fn stop(&self) -> Result<(), EndpointError> {
        self.endpoint.lifecycle().begin_stop()?;
        let disconnect_timeout = self.endpoint.config().disconnect_timeout();

        let transport = self.transport.lock().await.take();
        if let Some(transport) = &transport {
            match tokio::time::timeout(
                disconnect_timeout,
                transport.close(CloseReason::Normal, "client stopping"),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Close failed: {e}"),
                Err(_) => warn!("Close timed out after {disconnect_timeout:?}"),
            }
        }

        let receive_loop = self.receive_loop.lock().await.take();
        if let Some(mut receive_loop) = receive_loop {
            match tokio::time::timeout(disconnect_timeout, &mut receive_loop).await {
                Ok(Ok(exit)) => debug!("Receive loop finished: {exit:?}"),
                Ok(Err(e)) => warn!("Receive loop task failed: {e}"),
                Err(_) => {
                    warn!("Receive loop did not finish in {disconnect_timeout:?}, cancelling");
                    self.endpoint.request_shutdown();
                    receive_loop.abort();
                }
            }
        }

        self.endpoint.responses().drain_all();
        if let Some(transport) = transport {
            self.endpoint
                .sessions()
                .close_session(transport.connection_id())
                .await;
        }
        self.endpoint.request_shutdown();
        self.endpoint.lifecycle().complete_stop();
        info!("Client stopped");
        Ok(())
    }

    async fn transport(&self) -> Result<Arc<dyn Transport>, EndpointError> {
        self.transport
            .lock()
            .await
            .clone()
            .ok_or_else(|| EndpointError::not_connected("client is not started"))
    }

    pub async fn send_message<M: WoofMessage>(&self, message: &M) -> Result<Uuid, EndpointError> {
        let transport = self.transport().await?;
        self.endpoint.send_message(transport.as_ref(), message).await
    }

    pub async fn send_and_receive<Req, Resp>(
        &self,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp, EndpointError>
    where
        Req: WoofMessage,
        Resp: WoofMessage,
    {
        let transport = self.transport().await?;
        self.endpoint
            .send_and_receive(transport.as_ref(), request, timeout)
            .await
    }

    /// Round-trip time of one ping.
    pub async fn ping(&self) -> Result<Duration, EndpointError> {
        let started = Instant::now();
        let request = PingRequest {
            sent_at: Some(SystemTime::now().into()),
        };
        let _: PingResponse = self.send_and_receive(&request, None).await?;
        Ok(started.elapsed())
    }

    pub async fn identify(&self) -> Result<IdentifyResponse, EndpointError> {
        self.send_and_receive(&IdentifyRequest {}, None).await
    }

    pub async fn query_api(
        &self,
        exclude_internal: bool,
    ) -> Result<Vec<ApiMessageType>, EndpointError> {
        let response: ApiQueryResponse = self
            .send_and_receive(&ApiQueryRequest { exclude_internal }, None)
            .await?;
        Ok(response.types)
    }

    /// Sign in with an API key; `api_secret` becomes the session signing key.
    ///
    /// The key is installed before the request is sent (the request is signed
    /// with it) and removed again if the server refuses.
    pub async fn sign_in(
        &self,
        api_key: &str,
        api_secret: RedactedSecret,
    ) -> Result<SignInResponse, EndpointError> {
        let transport = self.transport().await?;
        let session = self
            .endpoint
            .sessions()
            .session(transport.connection_id())
            .await;
        session.write().await.key = Some(api_secret);

        let request = SignInRequest {
            api_key: api_key.to_string(),
            issued_at: Some(SystemTime::now().into()),
            nonce: Uuid::new_v4().as_bytes().to_vec(),
        };

        match self
            .endpoint
            .send_and_receive::<_, SignInResponse>(transport.as_ref(), &request, None)
            .await
        {
            Ok(response) => {
                let mut session = session.write().await;
                session.user = Some(ApiUser {
                    user_id: response.user_id.clone(),
                    name: response.user_name.clone(),
                    client_id: response.client_id.clone(),
                });
                session.client = Some(ApiClient {
                    client_id: response.client_id.clone(),
                    name: response.client_name.clone(),
                });
                info!("Signed in as {}", response.user_id);
                Ok(response)
            }
            Err(e) => {
                session.write().await.clear();
                warn!("Sign-in failed: {e}");
                Err(e)
            }
        }
    }

    /// Sign out; the local session is cleared whether or not the server answers.
    pub async fn sign_out(&self) -> Result<(), EndpointError> {
        let transport = self.transport().await?;
        let result = self
            .endpoint
            .send_and_receive::<_, SignOutResponse>(transport.as_ref(), &SignOutRequest {}, None)
            .await;
        self.endpoint
            .sessions()
            .close_session(transport.connection_id())
            .await;
        result?;
        info!("Signed out");
        Ok(())
    }

    pub async fn fetch_fragment(
        &self,
        stream_id: &str,
        offset: u64,
        length: u32,
    ) -> Result<StreamFragmentResponse, EndpointError> {
        let request = StreamFragmentRequest {
            stream_id: stream_id.to_string(),
            offset,
            length,
        };
        self.send_and_receive(&request, None).await
    }

    /// Download a whole stream into `writer`, one fragment at a time.
    pub async fn download_stream_to<W>(
        &self,
        stream_id: &str,
        writer: &mut W,
    ) -> Result<u64, EndpointError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let fragment_size = self.endpoint.config().limits.stream_fragment_size;
        let mut offset = 0u64;

        loop {
            let fragment = self.fetch_fragment(stream_id, offset, fragment_size).await?;
            writer.write_all(&fragment.data).await?;
            offset += fragment.data.len() as u64;

            if fragment.is_end {
                break;
            }
            if fragment.data.is_empty() {
                return Err(StreamError::Stalled {
                    stream_id: stream_id.to_string(),
                    offset,
                    location: ErrorLocation::from(Location::caller()),
                }
                .into());
            }
        }

        writer.flush().await?;
        debug!("Downloaded {offset} bytes of stream {stream_id}");
        Ok(offset)
    }

    pub async fn download_stream(&self, stream_id: &str) -> Result<Vec<u8>, EndpointError> {
        let mut data = Vec::new();
        self.download_stream_to(stream_id, &mut data).await?;
        Ok(data)
    }
}

#[track_caller]
fn handshake_error(message: impl Into<String>) -> EndpointError {
    EndpointError::Handshake {
        message: message.into(),
        location: ErrorLocation::from(Location::caller()),
    }
}

struct ClientDispatcher {
    handlers: Arc<HandlerSet>,
}

#[async_trait]
impl MessageHandler for ClientDispatcher {
    async fn handle(
        &self,
        request: &RequestContext,
        message: &DecodedMessage,
    ) -> Result<(), EndpointError> {
        if let Some(ping) = message.downcast_ref::<PingRequest>() {
            return request
                .reply(&PingResponse {
                    sent_at: ping.sent_at.clone(),
                })
                .await;
        }

        if message.context.is_error() {
            warn!(
                "{} ignoring unsolicited {}",
                request.connection_id(),
                message.context.name
            );
            return Ok(());
        }

        if self.handlers.is_empty() {
            debug!(
                "{} no handler for {}",
                request.connection_id(),
                message.context.name
            );
            return Ok(());
        }

        self.handlers.dispatch(request, message).await
    }
}
