use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum StreamError {
    #[error("Stream Not Found Error: {stream_id} {location}")]
    NotFound {
        stream_id: String,
        location: ErrorLocation,
    },

    #[error("Stream Stalled Error: {stream_id} at offset {offset} {location}")]
    Stalled {
        stream_id: String,
        offset: u64,
        location: ErrorLocation,
    },

    #[error("Stream Provider Error: {message} {location}")]
    Provider {
        message: String,
        location: ErrorLocation,
    },

    #[error("Stream IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },
}

impl From<IoError> for StreamError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        StreamError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
