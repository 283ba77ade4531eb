use woof_node::commands;
use woof_node::config::NodeConfig;
use woof_node::error::NodeError;

use common::RedactedSecret;

use std::fs;
use std::net::SocketAddr;

use tempfile::TempDir;

// ============================================================================
// Integration tests: woof-node commands against a node started from config
// ============================================================================

const NODE_CONFIG: &str = r#"{
    "listen_address": "127.0.0.1:0",
    "endpoint": {
        "identity": { "name": "node-under-test", "version": "9.9.9" },
        "timeouts": { "request_ms": 5000, "connect_ms": 2000, "disconnect_ms": 1000 },
        "limits": { "stream_fragment_size": 1000 }
    },
    "credentials": [
        {
            "api_key": "node-key",
            "secret": "node-secret",
            "user": { "user_id": "u-1", "name": "Operator", "client_id": "c-1" },
            "client": { "client_id": "c-1", "name": "Ops" }
        }
    ]
}"#;

/// Test helper: a config file plus a stream directory holding `report.bin`.
fn node_fixture() -> (TempDir, NodeConfig) {
    let dir = TempDir::new().unwrap();
    let streams = dir.path().join("streams");
    fs::create_dir(&streams).unwrap();
    fs::write(
        streams.join("report.bin"),
        (0u8..=250).cycle().take(4_321).collect::<Vec<u8>>(),
    )
    .unwrap();

    let path = dir.path().join("woof-node.json");
    fs::write(&path, NODE_CONFIG).unwrap();

    let mut config = NodeConfig::load(&path).unwrap();
    config.streams_dir = Some(streams);
    (dir, config)
}

fn url(address: SocketAddr) -> String {
    format!("ws://{address}")
}

/// **VALUE**: identify/ping/api work end to end through a config-built node.
///
/// **BUG THIS CATCHES**: Would catch the node ignoring the endpoint section of
/// its config (identity) or the client commands failing to stop cleanly.
#[tokio::test]
async fn given_node_from_config_when_querying_then_identity_and_api_reported() {
    // GIVEN: A running node
    let (_dir, config) = node_fixture();
    let (server, address) = commands::start_server(&config, None).await.unwrap();

    // WHEN: Running the query commands
    let identity = commands::identify(&config, &url(address)).await.unwrap();
    let pings = commands::ping(&config, &url(address), 3).await.unwrap();
    let public = commands::api(&config, &url(address), false).await.unwrap();
    let all = commands::api(&config, &url(address), true).await.unwrap();

    // THEN: Identity comes from config, pings all answered
    assert_eq!(identity.name, "node-under-test");
    assert_eq!(identity.version, "9.9.9");
    assert_eq!(pings.len(), 3);

    // AND: With no application types, only internal ones exist
    assert!(public.is_empty());
    assert_eq!(all.len(), 14);

    server.stop().await.unwrap();
}

/// **VALUE**: A signed-in download writes the exact file contents.
///
/// **WHY THIS MATTERS**: This is the full path: config credentials, sign-in,
/// directory provider, fragmented transfer and file output.
///
/// **BUG THIS CATCHES**: Would catch off-by-one fragment offsets (4321 is not a
/// multiple of the 1000-byte fragment size).
#[tokio::test]
async fn given_credentials_when_downloading_then_file_matches_source() {
    // GIVEN: A running node and an output path
    let (dir, config) = node_fixture();
    let (server, address) = commands::start_server(&config, None).await.unwrap();
    let output = dir.path().join("copy.bin");

    // WHEN: Downloading after sign-in
    let bytes = commands::download(
        &config,
        &url(address),
        "report.bin",
        &output,
        Some(("node-key".to_string(), RedactedSecret::from("node-secret"))),
    )
    .await
    .unwrap();

    // THEN: Byte count and contents match
    let expected = fs::read(dir.path().join("streams").join("report.bin")).unwrap();
    assert_eq!(bytes, 4_321);
    assert_eq!(fs::read(&output).unwrap(), expected);

    server.stop().await.unwrap();
}

/// **VALUE**: Failed downloads leave no partial file behind.
///
/// **BUG THIS CATCHES**: Would catch an empty output file being left for a
/// stream the server does not have.
#[tokio::test]
async fn given_missing_stream_when_downloading_then_error_and_no_output() {
    // GIVEN
    let (dir, config) = node_fixture();
    let (server, address) = commands::start_server(&config, None).await.unwrap();
    let output = dir.path().join("nothing.bin");

    // WHEN
    let result = commands::download(&config, &url(address), "absent.bin", &output, None).await;

    // THEN
    assert!(matches!(result, Err(NodeError::Core { .. })));
    assert!(!output.exists());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn given_wrong_secret_when_downloading_then_sign_in_fails() {
    let (dir, config) = node_fixture();
    let (server, address) = commands::start_server(&config, None).await.unwrap();
    let output = dir.path().join("denied.bin");

    let result = commands::download(
        &config,
        &url(address),
        "report.bin",
        &output,
        Some(("node-key".to_string(), RedactedSecret::from("guessed"))),
    )
    .await;

    assert!(result.is_err());
    assert!(!output.exists());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn given_no_node_when_identifying_then_core_error() {
    // GIVEN: A port nothing listens on
    let (_dir, config) = node_fixture();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    // WHEN
    let result = commands::identify(&config, &url(address)).await;

    // THEN
    assert!(matches!(result, Err(NodeError::Core { .. })));
}
