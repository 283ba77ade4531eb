//! Test helpers for WOOF integration tests.
//!
//! Starts real servers on loopback ports and connects real WebSocket clients.

use woof_core::client::WoofClient;
use woof_core::config::EndpointConfig;
use woof_core::server::{MemoryStreamProvider, WoofServer};
use woof_core::session::auth::{ApiClient, ApiUser, StaticAuthBackend};

use common::RedactedSecret;

use std::net::SocketAddr;
use std::sync::Arc;

/// Test constants for authentication
pub const TEST_API_KEY: &str = "integration-key";
pub const TEST_API_SECRET: &str = "integration-secret";

pub fn test_config() -> EndpointConfig {
    let mut config = EndpointConfig::default();
    config.identity.name = "integration-node".to_string();
    config.timeouts.request_ms = 5_000;
    config.timeouts.connect_ms = 2_000;
    config.timeouts.disconnect_ms = 1_000;
    config
}

pub fn test_auth() -> StaticAuthBackend {
    StaticAuthBackend::new()
        .with_credential(
            TEST_API_KEY,
            RedactedSecret::from(TEST_API_SECRET),
            ApiUser {
                user_id: "user-42".to_string(),
                name: "Grace".to_string(),
                client_id: "client-42".to_string(),
            },
        )
        .with_client(ApiClient {
            client_id: "client-42".to_string(),
            name: "Integration".to_string(),
        })
}

/// Test helper: Start a server on an ephemeral loopback port.
pub async fn start_server() -> (WoofServer, SocketAddr) {
    let streams = MemoryStreamProvider::new().with_stream("blob", (0u8..=255).cycle().take(100_000).collect::<Vec<u8>>());
    let server = WoofServer::builder(test_config(), Arc::new(test_auth()))
        .stream_provider(Arc::new(streams))
        .build();
    let address = server
        .start("127.0.0.1:0")
        .await
        .expect("Failed to start WOOF server");
    (server, address)
}

/// Test helper: Connect a client to `address`.
pub async fn connect_client(address: SocketAddr) -> WoofClient {
    let client = WoofClient::new(test_config());
    client
        .start(&format!("ws://{address}"))
        .await
        .expect("Failed to connect WOOF client");
    client
}
