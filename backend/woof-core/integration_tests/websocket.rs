use crate::helpers::{TEST_API_KEY, TEST_API_SECRET, connect_client, start_server, test_config};

use woof_core::client::WoofClient;
use woof_core::endpoint::EndpointState;
use woof_core::error::EndpointError;
use woof_core::proto::AuthErrorCode;

use common::RedactedSecret;

use std::time::Duration;

use tokio_tungstenite::connect_async;

// ============================================================================
// Public API tests for WOOF over real WebSockets
// These test the PUBLIC interface from an external consumer's perspective
// ============================================================================

/// **VALUE**: Verifies the built-in operations work end to end over TCP.
///
/// **WHY THIS MATTERS**: Unit tests run over memory transports; this proves the
/// WebSocket transport, subprotocol negotiation and framing agree on the wire.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The server does not echo the subprotocol
/// - Frames are split across WebSocket messages incorrectly
/// - Replies are not correlated over a real socket
#[tokio::test]
async fn given_running_server_when_client_pings_and_identifies_then_replies_arrive() {
    // GIVEN: Server and connected client
    let (server, address) = start_server().await;
    let client = connect_client(address).await;

    // WHEN: Calling built-ins
    let rtt = client.ping().await.expect("ping should succeed");
    let identity = client.identify().await.expect("identify should succeed");
    let api = client.query_api(false).await.expect("query should succeed");

    // THEN: Sensible answers
    assert!(rtt < Duration::from_secs(5));
    assert_eq!(identity.name, "integration-node");
    assert_eq!(api.len(), 14);
    assert_eq!(server.connection_count().await, 1);

    client.stop().await.expect("client stop should succeed");
    server.stop().await.expect("server stop should succeed");
}

/// **VALUE**: Verifies sign-in and a large stream download over a real socket.
#[tokio::test]
async fn given_signed_in_client_when_downloading_stream_then_all_bytes_arrive() {
    let (server, address) = start_server().await;
    let client = connect_client(address).await;

    client
        .sign_in(TEST_API_KEY, RedactedSecret::from(TEST_API_SECRET))
        .await
        .expect("sign-in should succeed");
    let data = client
        .download_stream("blob")
        .await
        .expect("download should succeed");

    assert_eq!(data.len(), 100_000);
    assert!(data.iter().enumerate().all(|(i, b)| *b == (i % 256) as u8));

    client.sign_out().await.expect("sign-out should succeed");
    server.stop().await.expect("server stop should succeed");
}

/// **VALUE**: Verifies a bad secret is rejected and the server hangs up.
#[tokio::test]
async fn given_wrong_secret_when_signing_in_then_denied_and_disconnected() {
    let (server, address) = start_server().await;
    let client = connect_client(address).await;

    let result = client
        .sign_in(TEST_API_KEY, RedactedSecret::from("wrong"))
        .await;

    assert_eq!(
        result.expect_err("sign-in should fail").auth_code(),
        Some(AuthErrorCode::ApiAccessDenied)
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connection_count().await, 0);

    server.stop().await.expect("server stop should succeed");
}

/// **VALUE**: Verifies upgrades without the WOOF subprotocol are refused.
///
/// **BUG THIS CATCHES**: Would catch the server accepting plain WebSocket
/// clients that cannot speak the framing.
#[tokio::test]
async fn given_plain_websocket_client_when_connecting_then_handshake_rejected() {
    let (server, address) = start_server().await;

    let result = connect_async(format!("ws://{address}")).await;

    assert!(result.is_err(), "upgrade without subprotocol must fail");
    assert_eq!(server.connection_count().await, 0);

    server.stop().await.expect("server stop should succeed");
}

/// **VALUE**: Verifies a refused connection surfaces as a handshake error.
#[tokio::test]
async fn given_no_server_when_client_starts_then_handshake_error_and_stopped() {
    let client = WoofClient::new(test_config());

    let result = client.start("ws://127.0.0.1:9").await;

    assert!(matches!(result, Err(EndpointError::Handshake { .. })));
    assert_eq!(client.state(), EndpointState::Stopped);
}

/// **VALUE**: Verifies stopping the server disconnects its clients.
#[tokio::test]
async fn given_connected_client_when_server_stops_then_client_disconnected() {
    let (server, address) = start_server().await;
    let client = connect_client(address).await;
    client.ping().await.expect("ping should succeed");

    server.stop().await.expect("server stop should succeed");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!client.is_connected().await);
    assert!(client.ping().await.is_err());
}
