use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "woof.json";
const CONFIG_VERSION: u32 = 1;

// ============================================
// CONFIG STRUCTS
// ============================================

/// How the endpoint identifies itself in `IdentifyResponse`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_identity_version")]
    pub version: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_identity_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,
    #[serde(default = "default_disconnect_ms")]
    pub disconnect_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_ms(),
            connect_ms: default_connect_ms(),
            disconnect_ms: default_disconnect_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitConfig {
    /// Largest payload accepted from a peer; larger frames close the connection.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: u32,
    #[serde(default = "default_receive_buffer_size")]
    pub receive_buffer_size: u32,
    #[serde(default = "default_stream_fragment_size")]
    pub stream_fragment_size: u32,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            receive_buffer_size: default_receive_buffer_size(),
            stream_fragment_size: default_stream_fragment_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityConfig {
    #[serde(default = "default_close_on_auth_failure")]
    pub close_on_auth_failure: bool,
    #[serde(default)]
    pub close_on_sign_out: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            close_on_auth_failure: default_close_on_auth_failure(),
            close_on_sign_out: false,
        }
    }
}

/// Settings shared by clients and servers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub limits: LimitConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            identity: IdentityConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_name() -> String {
    "woof".to_string()
}
fn default_identity_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_request_ms() -> u64 {
    30_000
}
fn default_connect_ms() -> u64 {
    10_000
}
fn default_disconnect_ms() -> u64 {
    5_000
}
fn default_max_message_size() -> u32 {
    16 * 1024 * 1024
}
fn default_receive_buffer_size() -> u32 {
    8 * 1024
}
fn default_stream_fragment_size() -> u32 {
    64 * 1024
}
fn default_close_on_auth_failure() -> bool {
    true
}

// ============================================
// IMPLEMENTATION
// ============================================

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.connect_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.disconnect_ms)
    }

    pub fn max_message_size(&self) -> usize {
        self.limits.max_message_size as usize
    }

    /// Load config from {config_dir}/woof.json.
    ///
    /// # Returns
    ///
    /// Returns defaults if the file is missing.
    /// Returns `Err(ConfigError)` if the file exists but is corrupted or invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {}", e);
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: EndpointConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {}", e);
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/woof.json using temp file + rename.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation, directory creation,
    /// serialization, the write or the rename fails.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{}.tmp", CONFIG_FILE_NAME));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(invalid(format!(
                "Invalid version: {} (expected 1-{})",
                self.version, CONFIG_VERSION
            )));
        }

        if self.identity.name.trim().is_empty() {
            return Err(invalid("identity.name cannot be empty"));
        }

        let timeouts = [
            ("request_ms", self.timeouts.request_ms),
            ("connect_ms", self.timeouts.connect_ms),
            ("disconnect_ms", self.timeouts.disconnect_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(invalid(format!("timeouts.{name} must be positive")));
            }
        }

        let limits = [
            ("max_message_size", self.limits.max_message_size),
            ("receive_buffer_size", self.limits.receive_buffer_size),
            ("stream_fragment_size", self.limits.stream_fragment_size),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(invalid(format!("limits.{name} must be positive")));
            }
        }

        if self.limits.stream_fragment_size > self.limits.max_message_size {
            return Err(invalid(format!(
                "limits.stream_fragment_size {} exceeds limits.max_message_size {}",
                self.limits.stream_fragment_size, self.limits.max_message_size
            )));
        }

        Ok(())
    }
}

#[track_caller]
fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: reason.into(),
    }
}
