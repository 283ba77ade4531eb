use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;
use tokio_tungstenite::tungstenite::Error as WsError;

#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("Closed Error: {message} {location}")]
    Closed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Send Error: {message} {location}")]
    Send {
        message: String,
        location: ErrorLocation,
    },

    #[error("Receive Error: {message} {location}")]
    Receive {
        message: String,
        location: ErrorLocation,
    },

    #[error("Handshake Error: {message} {location}")]
    Handshake {
        message: String,
        location: ErrorLocation,
    },
}

impl TransportError {
    #[track_caller]
    pub fn closed(message: impl Into<String>) -> Self {
        TransportError::Closed {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Map a tungstenite error raised while writing.
    #[track_caller]
    pub fn from_send(error: WsError) -> Self {
        let location = ErrorLocation::from(Location::caller());
        match error {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed {
                message: error.to_string(),
                location,
            },
            other => TransportError::Send {
                message: other.to_string(),
                location,
            },
        }
    }

    /// Map a tungstenite error raised while reading.
    #[track_caller]
    pub fn from_receive(error: WsError) -> Self {
        let location = ErrorLocation::from(Location::caller());
        match error {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed {
                message: error.to_string(),
                location,
            },
            other => TransportError::Receive {
                message: other.to_string(),
                location,
            },
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed { .. })
    }
}
