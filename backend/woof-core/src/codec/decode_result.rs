use crate::error::auth::AuthBackendError;
use crate::error::codec::CodecError;
use crate::proto::MessageMetadata;
use crate::registry::{DynMessage, TypeContext};

use std::any::Any;

use uuid::Uuid;

/// Parsed wire header of one logical frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub type_id: u32,
    pub message_id: Option<Uuid>,
    pub payload_length: u32,
    pub signature: Option<Vec<u8>>,
}

impl FrameHeader {
    pub fn from_metadata(metadata: MessageMetadata) -> Result<Self, CodecError> {
        let message_id = match metadata.message_id.len() {
            0 => None,
            16 => Uuid::from_slice(&metadata.message_id).ok(),
            other => {
                return Err(CodecError::malformed(format!(
                    "message id must be 16 bytes, got {other}"
                )));
            }
        };

        Ok(Self {
            type_id: metadata.type_id,
            message_id,
            payload_length: metadata.payload_length,
            signature: (!metadata.signature.is_empty()).then_some(metadata.signature),
        })
    }

    pub fn to_metadata(&self) -> MessageMetadata {
        MessageMetadata {
            type_id: self.type_id,
            message_id: self
                .message_id
                .map(|id| id.as_bytes().to_vec())
                .unwrap_or_default(),
            payload_length: self.payload_length,
            signature: self.signature.clone().unwrap_or_default(),
        }
    }
}

/// A successfully decoded, typed message.
#[derive(Debug)]
pub struct DecodedMessage {
    pub header: FrameHeader,
    pub context: TypeContext,
    pub message: Box<dyn DynMessage>,
    /// `Some` only for signed types; sign-in messages arrive even when invalid
    /// so the server can answer with a specific denial.
    pub signature_valid: Option<bool>,
}

impl DecodedMessage {
    pub fn message_id(&self) -> Option<Uuid> {
        self.header.message_id
    }

    pub fn is<T: Any>(&self) -> bool {
        self.message.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.message.as_any().downcast_ref::<T>()
    }

    pub fn into_message<T: Any>(self) -> Option<T> {
        self.message.into_any().downcast::<T>().ok().map(|boxed| *boxed)
    }
}

/// Every way reading one logical frame can end.
#[derive(Debug)]
pub enum DecodeResult {
    Message(DecodedMessage),
    /// The peer closed the connection at a frame boundary.
    Closed,
    /// A signed, non-sign-in message failed validation.
    Unauthorized {
        header: FrameHeader,
        context: TypeContext,
    },
    /// The payload was drained; the stream sits at the next frame boundary.
    UnknownType { header: FrameHeader, payload: Vec<u8> },
    /// The payload was NOT read; the stream is desynchronised.
    OverLimit { header: FrameHeader, limit: usize },
    AuthBackendFailure {
        header: FrameHeader,
        context: TypeContext,
        error: AuthBackendError,
    },
    Malformed(CodecError),
}

impl DecodeResult {
    /// The connection cannot be read any further after this result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecodeResult::Closed | DecodeResult::OverLimit { .. } | DecodeResult::Malformed(_)
        )
    }
}
