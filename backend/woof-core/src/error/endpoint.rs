use crate::error::auth::AuthBackendError;
use crate::error::codec::CodecError;
use crate::error::stream::StreamError;
use crate::error::transport::TransportError;
use crate::proto::{AuthErrorCode, ErrorCode};

use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;
use std::time::Duration;

use thiserror::Error as ThisError;
use uuid::Uuid;

#[derive(Debug, ThisError)]
pub enum EndpointError {
    #[error("Invalid State Error: {message} {location}")]
    InvalidState {
        message: String,
        location: ErrorLocation,
    },

    #[error("Timeout Error: no reply to {message_id} within {timeout:?} {location}")]
    Timeout {
        message_id: Uuid,
        timeout: Duration,
        location: ErrorLocation,
    },

    #[error("No Reply Error: {message_id} released without a reply {location}")]
    NoReply {
        message_id: Uuid,
        location: ErrorLocation,
    },

    #[error("Authentication Error: {code:?}: {description} {location}")]
    Authentication {
        code: AuthErrorCode,
        description: String,
        location: ErrorLocation,
    },

    #[error("Remote Error: {code:?} (native {native_code}): {description} {location}")]
    Remote {
        code: ErrorCode,
        native_code: i32,
        description: String,
        location: ErrorLocation,
    },

    #[error("Unexpected Message Error: {type_name}: {payload} {location}")]
    UnexpectedMessage {
        type_name: &'static str,
        payload: String,
        location: ErrorLocation,
    },

    #[error("Not Connected Error: {message} {location}")]
    NotConnected {
        message: String,
        location: ErrorLocation,
    },

    #[error("Handshake Error: {message} {location}")]
    Handshake {
        message: String,
        location: ErrorLocation,
    },

    #[error("Handler Error: {message} {location}")]
    Handler {
        message: String,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    AuthBackend(#[from] AuthBackendError),
}

impl EndpointError {
    /// Build a handler failure; application handlers return this from
    /// [`MessageHandler::handle`](crate::endpoint::MessageHandler::handle).
    #[track_caller]
    pub fn handler(message: impl Into<String>) -> Self {
        EndpointError::Handler {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        EndpointError::InvalidState {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn not_connected(message: impl Into<String>) -> Self {
        EndpointError::NotConnected {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Stable per-variant code carried in `ErrorResponse::native_code`.
    pub fn native_code(&self) -> i32 {
        match self {
            EndpointError::InvalidState { .. } => 1,
            EndpointError::Timeout { .. } => 2,
            EndpointError::NoReply { .. } => 3,
            EndpointError::Authentication { .. } => 4,
            EndpointError::Remote { native_code, .. } => *native_code,
            EndpointError::UnexpectedMessage { .. } => 6,
            EndpointError::NotConnected { .. } => 7,
            EndpointError::Handshake { .. } => 8,
            EndpointError::Handler { .. } => 9,
            EndpointError::Io { .. } => 10,
            EndpointError::Stream(_) => 11,
            EndpointError::Codec(_) => 12,
            EndpointError::Transport(_) => 13,
            EndpointError::AuthBackend(_) => 14,
        }
    }

    /// True for both an elapsed deadline and a waiter released without a reply.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            EndpointError::Timeout { .. } | EndpointError::NoReply { .. }
        )
    }

    pub fn auth_code(&self) -> Option<AuthErrorCode> {
        match self {
            EndpointError::Authentication { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<IoError> for EndpointError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        EndpointError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
