//! In-process [`Transport`] pair, used by tests and by embedders that bridge
//! WOOF over a non-socket channel.

use crate::error::transport::TransportError;
use crate::transport::{CloseReason, ConnectionId, Received, Transport};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::debug;
use tokio::sync::{Mutex, mpsc};

enum MemoryFrame {
    Binary(Vec<u8>),
    Close,
}

struct MemoryReader {
    receiver: mpsc::UnboundedReceiver<MemoryFrame>,
    current: Vec<u8>,
    position: usize,
}

struct MemoryWriter {
    peer: mpsc::UnboundedSender<MemoryFrame>,
    loopback: mpsc::UnboundedSender<MemoryFrame>,
    pending: Vec<u8>,
}

/// One end of an in-memory duplex channel.
pub struct MemoryTransport {
    connection_id: ConnectionId,
    connected: Arc<AtomicBool>,
    reader: Mutex<MemoryReader>,
    writer: Mutex<MemoryWriter>,
    write_gate: Mutex<()>,
}

impl MemoryTransport {
    /// Two connected ends; bytes sent on one are received on the other.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let left = MemoryTransport::new(left_rx, right_tx.clone(), left_tx.clone(), &connected);
        let right = MemoryTransport::new(right_rx, left_tx, right_tx, &connected);
        (left, right)
    }

    fn new(
        receiver: mpsc::UnboundedReceiver<MemoryFrame>,
        peer: mpsc::UnboundedSender<MemoryFrame>,
        loopback: mpsc::UnboundedSender<MemoryFrame>,
        connected: &Arc<AtomicBool>,
    ) -> Self {
        Self {
            connection_id: ConnectionId::allocate(),
            connected: Arc::clone(connected),
            reader: Mutex::new(MemoryReader {
                receiver,
                current: Vec::new(),
                position: 0,
            }),
            writer: Mutex::new(MemoryWriter {
                peer,
                loopback,
                pending: Vec::new(),
            }),
            write_gate: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn write_gate(&self) -> &Mutex<()> {
        &self.write_gate
    }

    async fn receive(&self, buffer: &mut [u8]) -> Result<Received, TransportError> {
        let mut reader = self.reader.lock().await;

        loop {
            if reader.position < reader.current.len() {
                let start = reader.position;
                let count = (reader.current.len() - start).min(buffer.len());
                buffer[..count].copy_from_slice(&reader.current[start..start + count]);
                reader.position += count;
                let is_final = reader.position == reader.current.len();
                return Ok(Received::Data { count, is_final });
            }

            match reader.receiver.recv().await {
                Some(MemoryFrame::Binary(data)) => {
                    reader.current = data;
                    reader.position = 0;
                }
                Some(MemoryFrame::Close) | None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Ok(Received::Close);
                }
            }
        }
    }

    async fn send(&self, buffer: &[u8], is_final: bool) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::closed("memory transport is closed"));
        }

        let mut writer = self.writer.lock().await;
        writer.pending.extend_from_slice(buffer);
        if !is_final {
            return Ok(());
        }

        let frame = std::mem::take(&mut writer.pending);
        writer
            .peer
            .send(MemoryFrame::Binary(frame))
            .map_err(|_| TransportError::closed("memory transport peer dropped"))
    }

    async fn close(&self, reason: CloseReason, description: &str) -> Result<(), TransportError> {
        debug!(
            "{} closing memory transport: {:?} {}",
            self.connection_id, reason, description
        );
        self.connected.store(false, Ordering::SeqCst);

        let writer = self.writer.lock().await;
        // Either side may already be gone; closing is idempotent.
        let _ = writer.peer.send(MemoryFrame::Close);
        let _ = writer.loopback.send(MemoryFrame::Close);
        Ok(())
    }
}
