use common::ErrorLocation;

use woof_core::error::{ConfigError, EndpointError};

use std::panic::Location;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the `woof-node` binary.
///
/// Core errors are flattened to their message so the whole enum stays
/// serializable for machine-readable CLI output.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum NodeError {
    /// Error from this binary (logger, filesystem, arguments)
    #[error("Node Error: {message} {location}")]
    Node {
        message: String,
        location: ErrorLocation,
    },

    /// Error from woof-core client/server operations
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// Node configuration could not be loaded or is invalid
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },
}

impl NodeError {
    #[track_caller]
    pub fn node(message: impl Into<String>) -> Self {
        NodeError::Node {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn config(message: impl Into<String>) -> Self {
        NodeError::Config {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<EndpointError> for NodeError {
    #[track_caller]
    fn from(error: EndpointError) -> Self {
        NodeError::Core {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<ConfigError> for NodeError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        NodeError::Config {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
