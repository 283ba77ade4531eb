// Shared fixtures: application message types, handlers and transports for
// exercising clients and servers without sockets.

use crate::client::WoofClient;
use crate::codec::DecodedMessage;
use crate::config::EndpointConfig;
use crate::endpoint::{MessageHandler, RequestContext};
use crate::error::auth::AuthBackendError;
use crate::error::endpoint::EndpointError;
use crate::error::transport::TransportError;
use crate::registry::{MessageFlags, MessageRegistry, WoofMessage};
use crate::server::WoofServer;
use crate::session::auth::{ApiClient, ApiUser, AuthenticationBackend, StaticAuthBackend};
use crate::transport::{CloseReason, ConnectionId, MemoryTransport, Received, Transport};

use common::RedactedSecret;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use tokio::sync::Mutex;

pub const API_KEY: &str = "api-key-1";
pub const API_SECRET: &str = "s3cret-signing-key";

#[derive(Clone, PartialEq, Message)]
pub struct EchoRequest {
    #[prost(string, tag = "1")]
    pub text: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct EchoResponse {
    #[prost(string, tag = "1")]
    pub text: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Notice {
    #[prost(string, tag = "1")]
    pub body: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct SecureNote {
    #[prost(string, tag = "1")]
    pub body: String,
}

/// Known to senders only; receivers built from [`test_registry`] reject it.
#[derive(Clone, PartialEq, Message)]
pub struct Stranger {
    #[prost(bytes = "vec", tag = "1")]
    pub blob: Vec<u8>,
}

impl WoofMessage for EchoRequest {
    const TYPE_ID: u32 = 100;
    const NAME: &'static str = "EchoRequest";
}

impl WoofMessage for EchoResponse {
    const TYPE_ID: u32 = 101;
    const NAME: &'static str = "EchoResponse";
}

impl WoofMessage for Notice {
    const TYPE_ID: u32 = 102;
    const NAME: &'static str = "Notice";
}

impl WoofMessage for SecureNote {
    const TYPE_ID: u32 = 103;
    const NAME: &'static str = "SecureNote";
    const FLAGS: MessageFlags = MessageFlags::SIGNED;
}

impl WoofMessage for Stranger {
    const TYPE_ID: u32 = 999;
    const NAME: &'static str = "Stranger";
}

pub fn test_registry() -> Arc<MessageRegistry> {
    Arc::new(
        MessageRegistry::builder()
            .register::<EchoRequest>()
            .and_then(|builder| builder.register::<EchoResponse>())
            .and_then(|builder| builder.register::<Notice>())
            .and_then(|builder| builder.register::<SecureNote>())
            .expect("test registry should build")
            .build(),
    )
}

pub fn sender_registry() -> Arc<MessageRegistry> {
    Arc::new(
        MessageRegistry::builder()
            .register::<EchoRequest>()
            .and_then(|builder| builder.register::<Stranger>())
            .expect("sender registry should build")
            .build(),
    )
}

pub fn test_config() -> EndpointConfig {
    let mut config = EndpointConfig::default();
    config.identity.name = "test-node".to_string();
    config.timeouts.request_ms = 2_000;
    config.timeouts.disconnect_ms = 500;
    config
}

pub fn test_user() -> ApiUser {
    ApiUser {
        user_id: "user-1".to_string(),
        name: "Ada".to_string(),
        client_id: "client-1".to_string(),
    }
}

pub fn test_auth() -> StaticAuthBackend {
    StaticAuthBackend::new()
        .with_credential(API_KEY, RedactedSecret::from(API_SECRET), test_user())
        .with_client(ApiClient {
            client_id: "client-1".to_string(),
            name: "Test Client".to_string(),
        })
}

/// Answers `EchoRequest` with the same text.
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(
        &self,
        request: &RequestContext,
        message: &DecodedMessage,
    ) -> Result<(), EndpointError> {
        if let Some(echo) = message.downcast_ref::<EchoRequest>() {
            request
                .reply(&EchoResponse {
                    text: echo.text.clone(),
                })
                .await?;
        }
        Ok(())
    }
}

/// Always fails.
pub struct FailingHandler;

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle(
        &self,
        _request: &RequestContext,
        _message: &DecodedMessage,
    ) -> Result<(), EndpointError> {
        Err(EndpointError::handler("handler exploded"))
    }
}

/// Records the body of every `Notice` and `SecureNote` it sees.
#[derive(Default)]
pub struct RecordingHandler {
    pub received: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        for _ in 0..100 {
            {
                let received = self.received.lock().await;
                if received.len() >= count {
                    return received.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(
        &self,
        _request: &RequestContext,
        message: &DecodedMessage,
    ) -> Result<(), EndpointError> {
        if let Some(notice) = message.downcast_ref::<Notice>() {
            self.received.lock().await.push(notice.body.clone());
        }
        if let Some(note) = message.downcast_ref::<SecureNote>() {
            self.received.lock().await.push(note.body.clone());
        }
        Ok(())
    }
}

/// Backend that is always down.
pub struct UnavailableAuthBackend;

#[async_trait]
impl AuthenticationBackend for UnavailableAuthBackend {
    async fn get_key_for_api_key(
        &self,
        _api_key: &str,
    ) -> Result<Option<RedactedSecret>, AuthBackendError> {
        Err(AuthBackendError::backend("credential store offline"))
    }

    async fn get_client_by_id(
        &self,
        _client_id: &str,
    ) -> Result<Option<ApiClient>, AuthBackendError> {
        Err(AuthBackendError::backend("credential store offline"))
    }

    async fn get_user_for_api_key(
        &self,
        _api_key: &str,
    ) -> Result<Option<ApiUser>, AuthBackendError> {
        Err(AuthBackendError::backend("credential store offline"))
    }
}

/// Memory transport whose sends can be made to fail on demand.
pub struct FlakyTransport {
    inner: MemoryTransport,
    fail_sends: AtomicBool,
}

impl FlakyTransport {
    pub fn new(inner: MemoryTransport) -> Self {
        Self {
            inner,
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    fn connection_id(&self) -> ConnectionId {
        self.inner.connection_id()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn write_gate(&self) -> &Mutex<()> {
        self.inner.write_gate()
    }

    async fn receive(&self, buffer: &mut [u8]) -> Result<Received, TransportError> {
        self.inner.receive(buffer).await
    }

    async fn send(&self, buffer: &[u8], is_final: bool) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::closed("injected send failure"));
        }
        self.inner.send(buffer, is_final).await
    }

    async fn close(&self, reason: CloseReason, description: &str) -> Result<(), TransportError> {
        self.inner.close(reason, description).await
    }
}

pub fn detached_server(config: EndpointConfig) -> WoofServer {
    let server = WoofServer::builder(config, Arc::new(test_auth()))
        .registry(test_registry())
        .build();
    server.start_detached().expect("server should start");
    server
}

/// Connect a fresh client to `server` over an in-memory pair.
pub async fn connect_client(server: &WoofServer, config: EndpointConfig) -> (WoofClient, ConnectionId) {
    let (client_end, server_end) = MemoryTransport::pair();
    let connection = server
        .attach(Arc::new(server_end))
        .await
        .expect("attach should succeed");

    let client = WoofClient::with_registry(config, test_registry());
    client
        .start_with_transport(Arc::new(client_end))
        .await
        .expect("client should start");
    (client, connection)
}
