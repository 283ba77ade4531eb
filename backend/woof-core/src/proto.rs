//! Wire declarations for the WOOF subprotocol.
//!
//! Every logical frame starts with a [`MessageMetadata`] block; the payload
//! that follows is one of the messages below (or an application message
//! registered by the embedding crate). Type ids for the built-in catalogue are
//! assigned in [`crate::registry::builtin`].

use prost::{Enumeration, Message};

// ============================================================================
// Framing
// ============================================================================

/// Header that precedes every payload on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct MessageMetadata {
    #[prost(uint32, tag = "1")]
    pub type_id: u32,
    /// 16 bytes when present, empty for connection-wide messages.
    #[prost(bytes = "vec", tag = "2")]
    pub message_id: Vec<u8>,
    #[prost(uint32, tag = "3")]
    pub payload_length: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub signature: Vec<u8>,
}

// ============================================================================
// Error replies
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ErrorCode {
    Unspecified = 0,
    InternalError = 1,
    UnknownMessageType = 2,
    NotImplemented = 3,
    InvalidRequest = 4,
    StreamNotFound = 5,
    ProtocolViolation = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum AuthErrorCode {
    Unspecified = 0,
    ApiAccessDenied = 1,
    UserAccessDenied = 2,
    ClientAccessDenied = 3,
}

/// Generic internal-error reply.
#[derive(Clone, PartialEq, Message)]
pub struct ErrorResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub code: i32,
    /// Kind of the failure on the sending side (see `EndpointError::native_code`).
    #[prost(int32, tag = "2")]
    pub native_code: i32,
    #[prost(string, tag = "3")]
    pub description: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct AuthErrorResponse {
    #[prost(enumeration = "AuthErrorCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub description: String,
}

// ============================================================================
// Administrative operations
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct PingRequest {
    #[prost(message, optional, tag = "1")]
    pub sent_at: Option<prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PingResponse {
    #[prost(message, optional, tag = "1")]
    pub sent_at: Option<prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, Message)]
pub struct IdentifyRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct IdentifyResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(message, optional, tag = "3")]
    pub build_time: Option<prost_types::Timestamp>,
    #[prost(message, optional, tag = "4")]
    pub uptime: Option<prost_types::Duration>,
    /// Request timeout the remote endpoint applies to its own calls.
    #[prost(message, optional, tag = "5")]
    pub timeout: Option<prost_types::Duration>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ApiQueryRequest {
    #[prost(bool, tag = "1")]
    pub exclude_internal: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ApiMessageType {
    #[prost(uint32, tag = "1")]
    pub type_id: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(bool, tag = "3")]
    pub is_signed: bool,
    #[prost(bool, tag = "4")]
    pub is_sign_in: bool,
    #[prost(bool, tag = "5")]
    pub is_error: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ApiQueryResponse {
    #[prost(message, repeated, tag = "1")]
    pub types: Vec<ApiMessageType>,
}

// ============================================================================
// Authentication
// ============================================================================

/// Signed with the API secret; the server resolves the key from `api_key`.
#[derive(Clone, PartialEq, Message)]
pub struct SignInRequest {
    #[prost(string, tag = "1")]
    pub api_key: String,
    #[prost(message, optional, tag = "2")]
    pub issued_at: Option<prost_types::Timestamp>,
    #[prost(bytes = "vec", tag = "3")]
    pub nonce: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignInResponse {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub user_name: String,
    #[prost(string, tag = "3")]
    pub client_id: String,
    #[prost(string, tag = "4")]
    pub client_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignOutRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct SignOutResponse {}

// ============================================================================
// Streaming download
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct StreamFragmentRequest {
    #[prost(string, tag = "1")]
    pub stream_id: String,
    #[prost(uint64, tag = "2")]
    pub offset: u64,
    #[prost(uint32, tag = "3")]
    pub length: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct StreamFragmentResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub is_end: bool,
}
