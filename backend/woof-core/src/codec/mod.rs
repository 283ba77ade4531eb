//! The WOOF subprotocol codec.
//!
//! Wire format of one logical frame:
//!
//! ```text
//! [metadata length: u8][MessageMetadata (protobuf)][payload (protobuf), payload_length bytes]
//! ```
//!
//! The three parts are written as three sequential transport writes under the
//! transport's write gate; only the last one is flagged final.

mod decode_result;
mod signature;

pub use decode_result::{DecodeResult, DecodedMessage, FrameHeader};
pub use signature::{sign, verify};

use crate::error::auth::AuthBackendError;
use crate::error::codec::CodecError;
use crate::proto::MessageMetadata;
use crate::registry::{DynMessage, MessageRegistry, TypeContext, WoofMessage};
use crate::session::SessionProvider;
use crate::session::auth::AuthenticationBackend;
use crate::transport::{Received, Transport};

use common::{ErrorLocation, RedactedSecret};

use std::any::Any;
use std::panic::Location;
use std::sync::Arc;

use log::{debug, warn};
use prost::Message as ProstMessage;
use uuid::Uuid;

/// Largest metadata block the one-byte length prefix can describe.
pub const MAX_METADATA_LENGTH: usize = u8::MAX as usize;

enum ReadOutcome {
    Filled { is_final: bool },
    Closed,
}

/// Framing + security engine shared by one endpoint's connections.
pub struct WoofCodec {
    registry: Arc<MessageRegistry>,
    sessions: Arc<SessionProvider>,
    auth: Option<Arc<dyn AuthenticationBackend>>,
    chunk_size: usize,
}

impl WoofCodec {
    pub fn new(
        registry: Arc<MessageRegistry>,
        sessions: Arc<SessionProvider>,
        auth: Option<Arc<dyn AuthenticationBackend>>,
        chunk_size: usize,
    ) -> Self {
        Self {
            registry,
            sessions,
            auth,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Read one logical frame from `transport`.
    ///
    /// Never returns an error: every failure is captured in the result so the
    /// caller still learns which header (if any) triggered it.
    pub async fn decode(&self, transport: &dyn Transport, size_limit: usize) -> DecodeResult {
        let header = match self.read_header(transport).await {
            Ok(Some(header)) => header,
            Ok(None) => return DecodeResult::Closed,
            Err(e) => return DecodeResult::Malformed(e),
        };

        if header.payload_length as u64 > size_limit as u64 {
            return DecodeResult::OverLimit {
                header,
                limit: size_limit,
            };
        }

        let mut payload = vec![0u8; header.payload_length as usize];
        if let Err(e) = self.read_payload(transport, &mut payload).await {
            return DecodeResult::Malformed(e);
        }

        let Some(context) = self.registry.by_id(header.type_id).copied() else {
            return DecodeResult::UnknownType { header, payload };
        };

        let message = match context.decode_payload(&payload) {
            Ok(message) => message,
            Err(e) => return DecodeResult::Malformed(e),
        };

        let signature_valid = if context.is_signed() {
            let key = if context.is_sign_in() {
                match self.resolve_sign_in_key(&context, message.as_ref()).await {
                    Ok(key) => key,
                    Err(error) => {
                        return DecodeResult::AuthBackendFailure {
                            header,
                            context,
                            error,
                        };
                    }
                }
            } else {
                self.sessions.get_key(transport.connection_id()).await
            };

            let valid = match (&key, &header.signature) {
                (Some(key), Some(signature)) => verify(&payload, key, signature),
                _ => false,
            };

            if !valid && !context.is_sign_in() {
                return DecodeResult::Unauthorized { header, context };
            }
            Some(valid)
        } else {
            None
        };

        DecodeResult::Message(DecodedMessage {
            header,
            context,
            message,
            signature_valid,
        })
    }

    /// Encode and send `message`; a fresh identifier is generated when `message_id` is `None`.
    pub async fn send_encoded<M: WoofMessage>(
        &self,
        transport: &dyn Transport,
        message: &M,
        message_id: Option<Uuid>,
    ) -> Result<Uuid, CodecError> {
        let context = *self.registry.context_of::<M>()?;
        self.send_binary(transport, &context, &message.encode_to_vec(), message_id)
            .await
    }

    /// Send an already-encoded payload described by `context`.
    pub async fn send_binary(
        &self,
        transport: &dyn Transport,
        context: &TypeContext,
        payload: &[u8],
        message_id: Option<Uuid>,
    ) -> Result<Uuid, CodecError> {
        let message_id = message_id.unwrap_or_else(Uuid::new_v4);
        self.write_frame(transport, context, payload, Some(message_id))
            .await?;
        Ok(message_id)
    }

    /// Send a type-erased message, resolving its context by runtime shape.
    pub async fn send_dyn(
        &self,
        transport: &dyn Transport,
        message: &dyn DynMessage,
        message_id: Option<Uuid>,
    ) -> Result<Uuid, CodecError> {
        let context = self
            .registry
            .by_shape(Any::type_id(message.as_any()))
            .copied()
            .ok_or_else(|| CodecError::UnregisteredType {
                name: format!("{message:?}"),
                location: ErrorLocation::from(Location::caller()),
            })?;
        self.send_binary(transport, &context, &message.encode_payload(), message_id)
            .await
    }

    /// Send `message` with no identifier: a connection-wide notification that
    /// the receiving side does not correlate with any request.
    pub async fn send_uncorrelated<M: WoofMessage>(
        &self,
        transport: &dyn Transport,
        message: &M,
    ) -> Result<(), CodecError> {
        let context = *self.registry.context_of::<M>()?;
        self.write_frame(transport, &context, &message.encode_to_vec(), None)
            .await
    }

    async fn write_frame(
        &self,
        transport: &dyn Transport,
        context: &TypeContext,
        payload: &[u8],
        message_id: Option<Uuid>,
    ) -> Result<(), CodecError> {
        let signature = if context.is_signed() {
            match self.sessions.get_key(transport.connection_id()).await {
                Some(key) => Some(sign(payload, &key)?),
                None => {
                    warn!(
                        "{} has no session key; sending {} unsigned",
                        transport.connection_id(),
                        context.name
                    );
                    None
                }
            }
        } else {
            None
        };

        let payload_length = u32::try_from(payload.len()).map_err(|_| {
            CodecError::malformed(format!("payload of {} bytes exceeds u32", payload.len()))
        })?;

        let header = FrameHeader {
            type_id: context.type_id,
            message_id,
            payload_length,
            signature,
        };
        let metadata = header.to_metadata().encode_to_vec();
        let metadata_length =
            u8::try_from(metadata.len()).map_err(|_| CodecError::MetadataTooLarge {
                size: metadata.len(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let has_payload = !payload.is_empty();
        let _gate = transport.write_gate().lock().await;

        transport.send(&[metadata_length], false).await?;
        transport.send(&metadata, !has_payload).await?;
        if has_payload {
            transport.send(payload, true).await?;
        }

        debug!(
            "{} sent {} ({} payload bytes)",
            transport.connection_id(),
            context.name,
            payload.len()
        );
        Ok(())
    }

    async fn read_header(&self, transport: &dyn Transport) -> Result<Option<FrameHeader>, CodecError> {
        let mut length = [0u8; 1];
        match read_exact(transport, &mut length).await? {
            ReadOutcome::Closed => return Ok(None),
            ReadOutcome::Filled { is_final: true } => {
                return Err(CodecError::malformed("frame ended after the length byte"));
            }
            ReadOutcome::Filled { is_final: false } => {}
        }

        if length[0] == 0 {
            return Err(CodecError::malformed("metadata length is zero"));
        }

        let mut metadata = vec![0u8; length[0] as usize];
        let is_final = match read_exact(transport, &mut metadata).await? {
            ReadOutcome::Closed => {
                return Err(CodecError::malformed("connection closed inside frame header"));
            }
            ReadOutcome::Filled { is_final } => is_final,
        };

        let header = FrameHeader::from_metadata(MessageMetadata::decode(metadata.as_slice())?)?;
        if is_final && header.payload_length > 0 {
            return Err(CodecError::malformed(format!(
                "frame ended before its {} byte payload",
                header.payload_length
            )));
        }
        Ok(Some(header))
    }

    async fn read_payload(&self, transport: &dyn Transport, payload: &mut [u8]) -> Result<(), CodecError> {
        let chunks = payload.len().div_ceil(self.chunk_size);
        for (index, chunk) in payload.chunks_mut(self.chunk_size).enumerate() {
            match read_exact(transport, chunk).await? {
                ReadOutcome::Closed => {
                    return Err(CodecError::malformed("connection closed inside payload"));
                }
                ReadOutcome::Filled { is_final: true } if index + 1 < chunks => {
                    return Err(CodecError::malformed("frame ended inside payload"));
                }
                ReadOutcome::Filled { .. } => {}
            }
        }
        Ok(())
    }

    async fn resolve_sign_in_key(
        &self,
        context: &TypeContext,
        message: &dyn DynMessage,
    ) -> Result<Option<RedactedSecret>, AuthBackendError> {
        let Some(auth) = &self.auth else {
            debug!("no authentication backend; {} cannot be verified", context.name);
            return Ok(None);
        };
        let Some(api_key) = context.api_key_of(message) else {
            return Ok(None);
        };
        auth.get_key_for_api_key(&api_key).await
    }
}

/// Fill `buffer` completely from `transport`.
///
/// `Closed` is only reported when the peer closed before the first byte.
async fn read_exact(transport: &dyn Transport, buffer: &mut [u8]) -> Result<ReadOutcome, CodecError> {
    let mut filled = 0;
    let mut is_final = false;

    while filled < buffer.len() {
        match transport.receive(&mut buffer[filled..]).await? {
            Received::Close if filled == 0 => return Ok(ReadOutcome::Closed),
            Received::Close => {
                return Err(CodecError::malformed(format!(
                    "connection closed after {filled} of {} bytes",
                    buffer.len()
                )));
            }
            Received::Data { count, is_final: last } => {
                filled += count;
                is_final = last;
                if last && filled < buffer.len() {
                    return Err(CodecError::malformed(format!(
                        "frame ended after {filled} of {} bytes",
                        buffer.len()
                    )));
                }
            }
        }
    }

    Ok(ReadOutcome::Filled { is_final })
}
