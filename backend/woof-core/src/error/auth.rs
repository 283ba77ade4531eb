use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Failure raised by an authentication backend lookup.
#[derive(Debug, ThisError)]
pub enum AuthBackendError {
    #[error("Auth Backend Error: {message} {location}")]
    Backend {
        message: String,
        location: ErrorLocation,
    },
}

impl AuthBackendError {
    #[track_caller]
    pub fn backend(message: impl Into<String>) -> Self {
        AuthBackendError::Backend {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
