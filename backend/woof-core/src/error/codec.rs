use crate::error::transport::TransportError;

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("Metadata Too Large Error: {size} bytes (max 255) {location}")]
    MetadataTooLarge { size: usize, location: ErrorLocation },

    #[error("Unregistered Type Error: {name} {location}")]
    UnregisteredType {
        name: String,
        location: ErrorLocation,
    },

    #[error("Malformed Frame Error: {message} {location}")]
    Malformed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Signing Error: {message} {location}")]
    Signing {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protobuf Decode Error: {message} {location}")]
    ProtobufDecode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protobuf Encode Error: {message} {location}")]
    ProtobufEncode {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CodecError {
    #[track_caller]
    pub fn malformed(message: impl Into<String>) -> Self {
        CodecError::Malformed {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<prost::DecodeError> for CodecError {
    #[track_caller]
    fn from(error: prost::DecodeError) -> Self {
        CodecError::ProtobufDecode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<prost::EncodeError> for CodecError {
    #[track_caller]
    fn from(error: prost::EncodeError) -> Self {
        CodecError::ProtobufEncode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
