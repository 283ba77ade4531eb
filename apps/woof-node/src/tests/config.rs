use crate::config::{DEFAULT_LISTEN_ADDRESS, NODE_CONFIG_FILE_NAME, NodeConfig};
use crate::error::NodeError;

use std::fs;
use std::path::Path;

use tempfile::TempDir;

fn write_config(dir: &TempDir, json: &str) -> std::path::PathBuf {
    let path = dir.path().join(NODE_CONFIG_FILE_NAME);
    fs::write(&path, json).unwrap();
    path
}

const VALID_CONFIG: &str = r#"{
    "listen_address": "0.0.0.0:9400",
    "endpoint": { "identity": { "name": "edge-node" } },
    "streams_dir": "/srv/woof",
    "credentials": [
        {
            "api_key": "key-a",
            "secret": "secret-a",
            "user": { "user_id": "u1", "name": "Ada", "client_id": "c1" },
            "client": { "client_id": "c1", "name": "Acme" }
        },
        {
            "api_key": "key-b",
            "secret": "secret-b",
            "user": { "user_id": "u2", "name": "Brian", "client_id": "c1" },
            "client": { "client_id": "c1", "name": "Acme" }
        }
    ]
}"#;

// ============================================================================
// Loading
// ============================================================================

/// **VALUE**: A node without a config file still starts.
///
/// **BUG THIS CATCHES**: Would catch `load` treating a missing file as an error.
#[test]
fn given_missing_file_when_loaded_then_defaults_returned() {
    // GIVEN: An empty directory
    let dir = TempDir::new().unwrap();

    // WHEN: Loading a file that does not exist
    let config = NodeConfig::load(&dir.path().join(NODE_CONFIG_FILE_NAME)).unwrap();

    // THEN: Defaults apply
    assert_eq!(config.listen_address, DEFAULT_LISTEN_ADDRESS);
    assert!(config.credentials.is_empty());
    assert!(config.streams_dir.is_none());
    assert!(config.stream_provider().is_none());
}

/// **VALUE**: Every section of the file reaches the running node.
///
/// **WHY THIS MATTERS**: Credentials feed the authentication backend; a dropped
/// entry means a user who cannot sign in.
///
/// **BUG THIS CATCHES**: Would catch serde renames or a fold that keeps only the
/// last credential.
#[test]
fn given_full_config_when_loaded_then_all_sections_applied() {
    // GIVEN: A config with two credentials and a stream directory
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, VALID_CONFIG);

    // WHEN: Loading it
    let config = NodeConfig::load(&path).unwrap();

    // THEN: Fields are populated, unspecified endpoint fields keep defaults
    assert_eq!(config.listen_address, "0.0.0.0:9400");
    assert_eq!(config.endpoint.identity.name, "edge-node");
    assert_eq!(config.endpoint.timeouts.request_ms, 30_000);
    assert_eq!(config.auth_backend().credential_count(), 2);

    let provider = config.stream_provider().unwrap();
    assert_eq!(provider.root(), Path::new("/srv/woof"));
}

/// **VALUE**: Secrets never appear in debug output of a loaded config.
///
/// **BUG THIS CATCHES**: Would catch `secret` being typed as a plain String.
#[test]
fn given_loaded_config_when_debug_formatted_then_secrets_redacted() {
    let dir = TempDir::new().unwrap();
    let config = NodeConfig::load(&write_config(&dir, VALID_CONFIG)).unwrap();

    let debug = format!("{config:?}");

    assert!(!debug.contains("secret-a"));
    assert!(!debug.contains("secret-b"));
}

#[test]
fn given_malformed_json_when_loaded_then_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "{ not json");

    let result = NodeConfig::load(&path);

    assert!(matches!(result, Err(NodeError::Config { .. })));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn given_bad_listen_address_when_loaded_then_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ "listen_address": "localhost" }"#);

    let err = NodeConfig::load(&path).unwrap_err();

    assert!(err.to_string().contains("listen_address"));
}

/// **VALUE**: Two credentials cannot share an API key.
///
/// **BUG THIS CATCHES**: Would catch the second entry silently replacing the
/// first in the backend's maps.
#[test]
fn given_duplicate_api_key_when_validated_then_rejected() {
    // GIVEN: Both credentials use key-a
    let dir = TempDir::new().unwrap();
    let json = VALID_CONFIG.replace("key-b", "key-a");
    let path = write_config(&dir, &json);

    // WHEN / THEN
    let err = NodeConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("duplicate api_key"));
}

/// **VALUE**: A user must belong to the client listed next to it.
///
/// **BUG THIS CATCHES**: Would catch configs where sign-in would always fail
/// with ClientAccessDenied because the user's client is unknown.
#[test]
fn given_user_of_other_client_when_validated_then_rejected() {
    let dir = TempDir::new().unwrap();
    let json = VALID_CONFIG.replacen(
        r#""client": { "client_id": "c1""#,
        r#""client": { "client_id": "c9""#,
        1,
    );
    let path = write_config(&dir, &json);

    let err = NodeConfig::load(&path).unwrap_err();

    assert!(err.to_string().contains("belongs to client"));
}

#[test]
fn given_empty_secret_when_validated_then_rejected() {
    let dir = TempDir::new().unwrap();
    let json = VALID_CONFIG.replace("secret-a", "");
    let path = write_config(&dir, &json);

    let err = NodeConfig::load(&path).unwrap_err();

    assert!(err.to_string().contains("cannot be empty"));
}

#[test]
fn given_invalid_endpoint_section_when_loaded_then_config_error() {
    // GIVEN: A zero request timeout
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ "endpoint": { "timeouts": { "request_ms": 0 } } }"#);

    // WHEN
    let result = NodeConfig::load(&path);

    // THEN: The endpoint validation error surfaces as a Config error
    match result {
        Err(NodeError::Config { message, .. }) => assert!(message.contains("request_ms")),
        other => panic!("expected Config error, got {other:?}"),
    }
}
