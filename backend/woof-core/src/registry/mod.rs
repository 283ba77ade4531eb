//! Message type registry.
//!
//! Maps the small integer type id carried in every frame header to the Rust
//! shape it decodes into, together with the security flags the codec enforces.
//! The table is assembled once at startup from explicit registrations; the
//! built-in administrative catalogue is always present.

pub mod builtin;

use crate::FIRST_APPLICATION_TYPE_ID;
use crate::error::codec::CodecError;
use crate::error::registry::RegistryError;
use crate::proto::ApiMessageType;

use common::ErrorLocation;

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use once_cell::sync::Lazy;

static BUILTIN_REGISTRY: Lazy<Arc<MessageRegistry>> =
    Lazy::new(|| Arc::new(MessageRegistry::builder().build()));

/// Security and routing flags attached to a registered message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageFlags {
    pub signed: bool,
    pub sign_in: bool,
    pub error: bool,
}

impl MessageFlags {
    pub const NONE: Self = Self {
        signed: false,
        sign_in: false,
        error: false,
    };
    pub const SIGNED: Self = Self {
        signed: true,
        sign_in: false,
        error: false,
    };
    /// Signed with a key resolved from the message itself rather than the session.
    pub const SIGN_IN: Self = Self {
        signed: true,
        sign_in: true,
        error: false,
    };
    pub const ERROR: Self = Self {
        signed: false,
        sign_in: false,
        error: true,
    };
}

/// A protobuf message that can travel over a WOOF connection.
pub trait WoofMessage: prost::Message + fmt::Debug + Default + Sized + 'static {
    const TYPE_ID: u32;
    const NAME: &'static str;
    const FLAGS: MessageFlags = MessageFlags::NONE;
}

/// Sign-in messages carry the API key the verification key is looked up by.
pub trait SignInMessage: WoofMessage {
    fn api_key(&self) -> &str;
}

/// Object-safe view of a decoded message.
pub trait DynMessage: Any + Send + Sync + fmt::Debug {
    fn encode_payload(&self) -> Vec<u8>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<T> DynMessage for T
where
    T: prost::Message + fmt::Debug + 'static,
{
    fn encode_payload(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

type DecodeFn = fn(&[u8]) -> Result<Box<dyn DynMessage>, prost::DecodeError>;
type ApiKeyFn = fn(&dyn Any) -> Option<String>;

fn decode_as<T: WoofMessage>(bytes: &[u8]) -> Result<Box<dyn DynMessage>, prost::DecodeError> {
    Ok(Box::new(T::decode(bytes)?))
}

fn api_key_as<T: SignInMessage>(message: &dyn Any) -> Option<String> {
    message
        .downcast_ref::<T>()
        .map(|sign_in| sign_in.api_key().to_string())
}

/// Registry entry: wire id, shape, and flags of one message type.
#[derive(Clone, Copy)]
pub struct TypeContext {
    pub type_id: u32,
    pub name: &'static str,
    pub flags: MessageFlags,
    shape: TypeId,
    decode: DecodeFn,
    api_key: Option<ApiKeyFn>,
}

impl TypeContext {
    pub fn of<T: WoofMessage>() -> Self {
        Self {
            type_id: T::TYPE_ID,
            name: T::NAME,
            flags: T::FLAGS,
            shape: TypeId::of::<T>(),
            decode: decode_as::<T>,
            api_key: None,
        }
    }

    pub fn of_sign_in<T: SignInMessage>() -> Self {
        let mut context = Self::of::<T>();
        context.flags.signed = true;
        context.flags.sign_in = true;
        context.api_key = Some(api_key_as::<T>);
        context
    }

    pub fn is_signed(&self) -> bool {
        self.flags.signed
    }

    pub fn is_sign_in(&self) -> bool {
        self.flags.sign_in
    }

    pub fn is_error(&self) -> bool {
        self.flags.error
    }

    pub fn is_internal(&self) -> bool {
        self.type_id < FIRST_APPLICATION_TYPE_ID
    }

    pub fn shape(&self) -> TypeId {
        self.shape
    }

    pub fn decode_payload(&self, payload: &[u8]) -> Result<Box<dyn DynMessage>, CodecError> {
        Ok((self.decode)(payload)?)
    }

    /// API key embedded in a decoded sign-in message.
    pub fn api_key_of(&self, message: &dyn DynMessage) -> Option<String> {
        self.api_key.and_then(|extract| extract(message.as_any()))
    }

    pub fn describe(&self) -> ApiMessageType {
        ApiMessageType {
            type_id: self.type_id,
            name: self.name.to_string(),
            is_signed: self.flags.signed,
            is_sign_in: self.flags.sign_in,
            is_error: self.flags.error,
        }
    }
}

impl fmt::Debug for TypeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeContext")
            .field("type_id", &self.type_id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Immutable id <-> shape table shared by every endpoint in the process.
pub struct MessageRegistry {
    by_id: HashMap<u32, TypeContext>,
    by_shape: HashMap<TypeId, u32>,
}

impl MessageRegistry {
    /// Start a registry that already contains the built-in catalogue.
    pub fn builder() -> RegistryBuilder {
        let mut builder = RegistryBuilder {
            by_id: HashMap::new(),
            by_shape: HashMap::new(),
        };
        for context in builtin::contexts() {
            builder.by_shape.insert(context.shape, context.type_id);
            builder.by_id.insert(context.type_id, context);
        }
        builder
    }

    /// Registry holding only the built-in catalogue.
    pub fn builtin() -> Arc<MessageRegistry> {
        Arc::clone(&BUILTIN_REGISTRY)
    }

    pub fn by_id(&self, type_id: u32) -> Option<&TypeContext> {
        self.by_id.get(&type_id)
    }

    pub fn by_shape(&self, shape: TypeId) -> Option<&TypeContext> {
        self.by_shape
            .get(&shape)
            .and_then(|type_id| self.by_id.get(type_id))
    }

    /// Context for `T`; encoding an unregistered shape is a programming error.
    #[track_caller]
    pub fn context_of<T: 'static>(&self) -> Result<&TypeContext, CodecError> {
        self.by_shape(TypeId::of::<T>())
            .ok_or_else(|| CodecError::UnregisteredType {
                name: type_name::<T>().to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Registered types ordered by id, optionally without the built-in range.
    pub fn describe(&self, exclude_internal: bool) -> Vec<ApiMessageType> {
        let mut types: Vec<ApiMessageType> = self
            .by_id
            .values()
            .filter(|context| !(exclude_internal && context.is_internal()))
            .map(TypeContext::describe)
            .collect();
        types.sort_by_key(|described| described.type_id);
        types
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("types", &self.by_id.len())
            .finish()
    }
}

/// Collects application registrations; every check happens at registration.
pub struct RegistryBuilder {
    by_id: HashMap<u32, TypeContext>,
    by_shape: HashMap<TypeId, u32>,
}

impl RegistryBuilder {
    #[track_caller]
    pub fn register<T: WoofMessage>(self) -> Result<Self, RegistryError> {
        if T::FLAGS.sign_in {
            return Err(RegistryError::SignInAccessorMissing {
                name: T::NAME,
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.insert(TypeContext::of::<T>())
    }

    #[track_caller]
    pub fn register_sign_in<T: SignInMessage>(self) -> Result<Self, RegistryError> {
        self.insert(TypeContext::of_sign_in::<T>())
    }

    #[track_caller]
    fn insert(mut self, context: TypeContext) -> Result<Self, RegistryError> {
        let location = ErrorLocation::from(Location::caller());

        if context.is_internal() {
            return Err(RegistryError::ReservedId {
                type_id: context.type_id,
                name: context.name,
                location,
            });
        }
        if let Some(existing) = self.by_id.get(&context.type_id) {
            return Err(RegistryError::DuplicateId {
                type_id: context.type_id,
                existing: existing.name,
                name: context.name,
                location,
            });
        }
        if self.by_shape.contains_key(&context.shape) {
            return Err(RegistryError::DuplicateShape {
                name: context.name,
                location,
            });
        }

        self.by_shape.insert(context.shape, context.type_id);
        self.by_id.insert(context.type_id, context);
        Ok(self)
    }

    pub fn build(self) -> MessageRegistry {
        MessageRegistry {
            by_id: self.by_id,
            by_shape: self.by_shape,
        }
    }
}
