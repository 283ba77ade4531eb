//! Duplex byte transports underneath the codec.
//!
//! A [`Transport`] moves the bytes of one logical frame as a sequence of
//! chunked writes, the last one flagged final, and hands them back to the
//! reader in chunks that report where the frame ends. All writes of one
//! logical frame happen under [`Transport::write_gate`], so frames from
//! concurrent senders never interleave.

mod memory;
mod websocket;

pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

use crate::error::transport::TransportError;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-connection handle, assigned once when a transport is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn allocate() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of a single [`Transport::receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// `count` bytes were written into the buffer; `is_final` marks the end
    /// of the current physical message.
    Data { count: usize, is_final: bool },
    /// The peer closed the connection.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    ProtocolError,
    PolicyViolation,
    MessageTooBig,
    InternalError,
}

impl From<CloseReason> for CloseCode {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Normal => CloseCode::Normal,
            CloseReason::ProtocolError => CloseCode::Protocol,
            CloseReason::PolicyViolation => CloseCode::Policy,
            CloseReason::MessageTooBig => CloseCode::Size,
            CloseReason::InternalError => CloseCode::Error,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn connection_id(&self) -> ConnectionId;

    fn is_connected(&self) -> bool;

    /// Held by the codec across every write of one logical frame.
    fn write_gate(&self) -> &Mutex<()>;

    async fn receive(&self, buffer: &mut [u8]) -> Result<Received, TransportError>;

    /// Buffer `buffer`; the physical message is flushed when `is_final` is set.
    async fn send(&self, buffer: &[u8], is_final: bool) -> Result<(), TransportError>;

    async fn close(&self, reason: CloseReason, description: &str) -> Result<(), TransportError>;
}
