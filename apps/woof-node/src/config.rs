//! Node configuration: where to listen, endpoint settings, credentials and
//! the optional stream directory.

use crate::error::NodeError;
use crate::streams::DirectoryStreamProvider;

use common::RedactedSecret;

use woof_core::config::EndpointConfig;
use woof_core::session::auth::{ApiClient, ApiUser, StaticAuthBackend};

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

pub const NODE_CONFIG_FILE_NAME: &str = "woof-node.json";
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:9300";

/// One API key accepted by the node.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    pub api_key: String,
    pub secret: RedactedSecret,
    pub user: ApiUser,
    pub client: ApiClient,
}

/// Contents of `woof-node.json`. Secrets are read but never written back,
/// so there is no `save`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub streams_dir: Option<PathBuf>,

    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            endpoint: EndpointConfig::default(),
            streams_dir: None,
            credentials: Vec::new(),
        }
    }
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

impl NodeConfig {
    /// Load and validate a node config file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        if !path.exists() {
            info!("Node config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            NodeError::config(format!("Failed to read {}: {e}", path.display()))
        })?;

        let config: NodeConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse node config JSON: {}", e);
            NodeError::config(format!("Failed to parse {}: {e}", path.display()))
        })?;

        config.validate()?;

        info!(
            "Node config loaded from {} ({} credentials)",
            path.display(),
            config.credentials.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        self.endpoint.validate()?;

        self.listen_address.parse::<SocketAddr>().map_err(|e| {
            NodeError::config(format!(
                "Invalid listen_address {:?}: {e}",
                self.listen_address
            ))
        })?;

        let mut seen = HashSet::new();
        for credential in &self.credentials {
            if credential.api_key.trim().is_empty() {
                return Err(NodeError::config("credentials: api_key cannot be empty"));
            }
            if !seen.insert(credential.api_key.as_str()) {
                return Err(NodeError::config(format!(
                    "credentials: duplicate api_key {:?}",
                    credential.api_key
                )));
            }
            if credential.secret.is_empty() {
                return Err(NodeError::config(format!(
                    "credentials: secret for {:?} cannot be empty",
                    credential.api_key
                )));
            }
            if credential.user.client_id != credential.client.client_id {
                return Err(NodeError::config(format!(
                    "credentials: user {:?} belongs to client {:?}, not {:?}",
                    credential.user.user_id, credential.user.client_id, credential.client.client_id
                )));
            }
        }

        Ok(())
    }

    /// In-memory authentication backend holding every configured credential.
    pub fn auth_backend(&self) -> StaticAuthBackend {
        self.credentials
            .iter()
            .fold(StaticAuthBackend::new(), |backend, credential| {
                backend
                    .with_credential(
                        credential.api_key.clone(),
                        credential.secret.clone(),
                        credential.user.clone(),
                    )
                    .with_client(credential.client.clone())
            })
    }

    pub fn stream_provider(&self) -> Option<DirectoryStreamProvider> {
        self.streams_dir.as_deref().map(DirectoryStreamProvider::new)
    }
}
