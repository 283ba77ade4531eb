//! WOOF server: WebSocket accept loop, per-connection receive loops and the
//! built-in administrative handlers.

mod dispatcher;
mod observer;
pub mod stream;

pub use observer::ConnectionObserver;
pub use stream::{FragmentStream, MemoryStreamProvider, StreamProvider};

use crate::WOOF_SUBPROTOCOL;
use crate::config::EndpointConfig;
use crate::endpoint::{Endpoint, EndpointState, HandlerSet, MessageHandler};
use crate::error::codec::CodecError;
use crate::error::endpoint::EndpointError;
use crate::registry::{MessageRegistry, WoofMessage};
use crate::session::auth::AuthenticationBackend;
use crate::session::{Session, SessionProvider};
use crate::transport::{CloseReason, ConnectionId, Transport, WebSocketTransport};

use dispatcher::ServerDispatcher;
use observer::ObserverSet;

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use uuid::Uuid;

/// Outcome of [`WoofServer::broadcast`], in ascending connection order.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub delivered: Vec<ConnectionId>,
    pub failed: Vec<(ConnectionId, CodecError)>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub(crate) struct ServerShared {
    endpoint: Arc<Endpoint>,
    auth: Arc<dyn AuthenticationBackend>,
    streams: Option<Arc<dyn StreamProvider>>,
    handlers: HandlerSet,
    observers: ObserverSet,
    connections: RwLock<BTreeMap<ConnectionId, Arc<dyn Transport>>>,
    tasks: Mutex<HashMap<ConnectionId, JoinHandle<()>>>,
}

impl ServerShared {
    async fn open_connection(self: &Arc<Self>, transport: Arc<dyn Transport>) -> ConnectionId {
        let connection = transport.connection_id();
        self.endpoint.sessions().session(connection).await;
        self.connections
            .write()
            .await
            .insert(connection, Arc::clone(&transport));

        let shared = Arc::clone(self);
        let handler: Arc<dyn MessageHandler> = Arc::new(ServerDispatcher::new(Arc::clone(self)));

        // Held across the spawn so a loop that ends at once cannot
        // deregister before it was registered.
        let mut tasks = self.tasks.lock().await;
        let task = tokio::spawn(async move {
            shared.observers.connected(connection).await;
            let exit = Arc::clone(&shared.endpoint)
                .run_receive_loop(transport, handler)
                .await;
            debug!("{connection} loop exit: {exit:?}");
            shared.close_connection(connection).await;
        });
        tasks.insert(connection, task);

        info!("{connection} connected");
        connection
    }

    async fn close_connection(&self, connection: ConnectionId) {
        self.connections.write().await.remove(&connection);
        self.endpoint.sessions().close_session(connection).await;
        self.tasks.lock().await.remove(&connection);
        info!("{connection} disconnected");
        self.observers.disconnected(connection).await;
    }

    async fn transport_for(&self, connection: ConnectionId) -> Result<Arc<dyn Transport>, EndpointError> {
        self.connections
            .read()
            .await
            .get(&connection)
            .cloned()
            .ok_or_else(|| EndpointError::not_connected(format!("{connection} is not connected")))
    }
}

pub struct WoofServerBuilder {
    config: EndpointConfig,
    registry: Arc<MessageRegistry>,
    auth: Arc<dyn AuthenticationBackend>,
    streams: Option<Arc<dyn StreamProvider>>,
}

impl WoofServerBuilder {
    pub fn registry(mut self, registry: Arc<MessageRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn stream_provider(mut self, provider: Arc<dyn StreamProvider>) -> Self {
        self.streams = Some(provider);
        self
    }

    pub fn build(self) -> WoofServer {
        let endpoint = Arc::new(Endpoint::new(
            self.config,
            self.registry,
            SessionProvider::per_connection(),
            Some(Arc::clone(&self.auth)),
        ));

        WoofServer {
            shared: Arc::new(ServerShared {
                endpoint: Arc::clone(&endpoint),
                auth: self.auth,
                streams: self.streams,
                handlers: HandlerSet::default(),
                observers: ObserverSet::default(),
                connections: RwLock::new(BTreeMap::new()),
                tasks: Mutex::new(HashMap::new()),
            }),
            endpoint,
            accept_loop: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }
}

pub struct WoofServer {
    endpoint: Arc<Endpoint>,
    shared: Arc<ServerShared>,
    accept_loop: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl WoofServer {
    pub fn builder(
        config: EndpointConfig,
        auth: Arc<dyn AuthenticationBackend>,
    ) -> WoofServerBuilder {
        WoofServerBuilder {
            config,
            registry: MessageRegistry::builtin(),
            auth,
            streams: None,
        }
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn state(&self) -> EndpointState {
        self.endpoint.state()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Handlers see application messages; built-in requests never reach them.
    pub fn add_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.shared.handlers.add(handler);
    }

    pub fn add_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.shared.observers.add(observer);
    }

    /// Bind `address` and accept WebSocket upgrades offering the WOOF subprotocol.
    pub async fn start(&self, address: &str) -> Result<SocketAddr, EndpointError> {
        self.endpoint.lifecycle().begin_start()?;

        let listener = match TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(e) => {
                self.endpoint.lifecycle().abort_start();
                error!("Failed to bind {address}: {e}");
                return Err(e.into());
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(e) => {
                self.endpoint.lifecycle().abort_start();
                return Err(e.into());
            }
        };

        let accept_loop = tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            listener,
            self.endpoint.shutdown_signal(),
        ));
        *self.accept_loop.lock().await = Some(accept_loop);
        *self.local_addr.lock().await = Some(local_addr);

        self.endpoint.mark_started();
        self.endpoint.lifecycle().complete_start();
        info!("WOOF server listening on ws://{local_addr}");
        Ok(local_addr)
    }

    /// Start without a listener; connections arrive through [`WoofServer::attach`].
    pub fn start_detached(&self) -> Result<(), EndpointError> {
        self.endpoint.lifecycle().begin_start()?;
        self.endpoint.mark_started();
        self.endpoint.lifecycle().complete_start();
        Ok(())
    }

    /// Serve an already-established transport.
    pub async fn attach(&self, transport: Arc<dyn Transport>) -> Result<ConnectionId, EndpointError> {
        self.endpoint.lifecycle().ensure_started()?;
        Ok(self.shared.open_connection(transport).await)
    }

    pub async fn connections(&self) -> Vec<ConnectionId> {
        self.shared.connections.read().await.keys().copied().collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.shared.connections.read().await.len()
    }

    /// Snapshot of the session bound to `connection`.
    pub async fn session(&self, connection: ConnectionId) -> Option<Session> {
        if !self.shared.connections.read().await.contains_key(&connection) {
            return None;
        }
        let session = self.endpoint.sessions().find(connection).await?;
        let snapshot = session.read().await.clone();
        Some(snapshot)
    }

    pub async fn send_message<M: WoofMessage>(
        &self,
        connection: ConnectionId,
        message: &M,
    ) -> Result<Uuid, EndpointError> {
        let transport = self.shared.transport_for(connection).await?;
        self.endpoint.send_message(transport.as_ref(), message).await
    }

    pub async fn send_and_receive<Req, Resp>(
        &self,
        connection: ConnectionId,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp, EndpointError>
    where
        Req: WoofMessage,
        Resp: WoofMessage,
    {
        let transport = self.shared.transport_for(connection).await?;
        self.endpoint
            .send_and_receive(transport.as_ref(), request, timeout)
            .await
    }

    /// Send `message` to every connection; one failure does not stop the rest.
    pub async fn broadcast<M: WoofMessage>(&self, message: &M) -> BroadcastReport {
        let targets: Vec<(ConnectionId, Arc<dyn Transport>)> = self
            .shared
            .connections
            .read()
            .await
            .iter()
            .map(|(connection, transport)| (*connection, Arc::clone(transport)))
            .collect();

        let codec = self.endpoint.codec();
        let sends = targets.iter().map(|(connection, transport)| async move {
            (
                *connection,
                codec.send_encoded(transport.as_ref(), message, None).await,
            )
        });

        let mut report = BroadcastReport::default();
        for (connection, result) in join_all(sends).await {
            match result {
                Ok(_) => report.delivered.push(connection),
                Err(e) => {
                    warn!("{connection} broadcast failed: {e}");
                    report.failed.push((connection, e));
                }
            }
        }
        report
    }

    /// Close one connection.
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), EndpointError> {
        let transport = self.shared.transport_for(connection).await?;
        transport.close(CloseReason::Normal, "disconnected by server").await?;
        Ok(())
    }

    /// Close every connection, stop accepting and wait for the loops to end.
    pub async fn stop(&self) -> Result<(), EndpointError> {
        self.endpoint.lifecycle().begin_stop()?;
        let disconnect_timeout = self.endpoint.config().disconnect_timeout();

        let transports: Vec<Arc<dyn Transport>> =
            self.shared.connections.read().await.values().cloned().collect();
        for transport in transports {
            let closed = tokio::time::timeout(
                disconnect_timeout,
                transport.close(CloseReason::Normal, "server stopping"),
            )
            .await;
            match closed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("{} close failed: {e}", transport.connection_id()),
                Err(_) => warn!("{} close timed out", transport.connection_id()),
            }
        }

        self.endpoint.request_shutdown();

        let accept_loop = self.accept_loop.lock().await.take();
        if let Some(accept_loop) = accept_loop {
            if let Err(e) = accept_loop.await {
                warn!("Accept loop task failed: {e}");
            }
        }

        let tasks: Vec<JoinHandle<()>> = self
            .shared
            .tasks
            .lock()
            .await
            .drain()
            .map(|(_, task)| task)
            .collect();
        for mut task in tasks {
            if tokio::time::timeout(disconnect_timeout, &mut task).await.is_err() {
                warn!("Receive loop did not finish in {disconnect_timeout:?}, aborting");
                task.abort();
            }
        }

        self.endpoint.responses().drain_all();
        self.endpoint.lifecycle().complete_stop();
        info!("WOOF server stopped");
        Ok(())
    }
}

async fn accept_loop(
    shared: Arc<ServerShared>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.wait_for(|stopped| *stopped) => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {e}");
                continue;
            }
        };

        let handshake_timeout = shared.endpoint.config().connect_timeout();
        match tokio::time::timeout(handshake_timeout, accept_hdr_async(stream, negotiate_subprotocol))
            .await
        {
            Ok(Ok(websocket)) => {
                let transport: Arc<dyn Transport> =
                    Arc::new(WebSocketTransport::new(websocket, Some(peer)));
                let connection = shared.open_connection(transport).await;
                debug!("{connection} accepted from {peer}");
            }
            Ok(Err(e)) => warn!("WebSocket handshake with {peer} failed: {e}"),
            Err(_) => warn!("WebSocket handshake with {peer} timed out"),
        }
    }
    info!("Accept loop stopped");
}

/// Accept the upgrade only when the client offers the WOOF subprotocol.
fn negotiate_subprotocol(request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    let offered = request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|protocol| protocol.trim() == WOOF_SUBPROTOCOL);

    if !offered {
        let mut rejection = ErrorResponse::new(Some(format!(
            "WebSocket subprotocol {WOOF_SUBPROTOCOL} is required"
        )));
        *rejection.status_mut() = StatusCode::BAD_REQUEST;
        return Err(rejection);
    }

    response
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(WOOF_SUBPROTOCOL));
    Ok(response)
}
