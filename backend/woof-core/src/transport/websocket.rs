//! [`Transport`] over a tokio-tungstenite WebSocket stream.

use crate::error::transport::TransportError;
use crate::transport::{CloseReason, ConnectionId, Received, Transport};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

struct ReadHalf<S> {
    stream: SplitStream<WebSocketStream<S>>,
    current: Vec<u8>,
    position: usize,
}

struct WriteHalf<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    pending: Vec<u8>,
}

/// One WebSocket connection; each logical frame travels as one binary message.
pub struct WebSocketTransport<S> {
    connection_id: ConnectionId,
    peer: Option<SocketAddr>,
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    write_gate: Mutex<()>,
    connected: AtomicBool,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: WebSocketStream<S>, peer: Option<SocketAddr>) -> Self {
        let (sink, stream) = stream.split();
        Self {
            connection_id: ConnectionId::allocate(),
            peer,
            reader: Mutex::new(ReadHalf {
                stream,
                current: Vec::new(),
                position: 0,
            }),
            writer: Mutex::new(WriteHalf {
                sink,
                pending: Vec::new(),
            }),
            write_gate: Mutex::new(()),
            connected: AtomicBool::new(true),
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
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

            match reader.stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    reader.current = data.to_vec();
                    reader.position = 0;
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("{} received close frame: {:?}", self.connection_id, frame);
                    self.mark_disconnected();
                    return Ok(Received::Close);
                }
                Some(Ok(Message::Text(_))) => {
                    warn!("{} sent a text frame; ignoring", self.connection_id);
                }
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.mark_disconnected();
                    let error = TransportError::from_receive(e);
                    if error.is_closed() {
                        return Ok(Received::Close);
                    }
                    return Err(error);
                }
                None => {
                    self.mark_disconnected();
                    return Ok(Received::Close);
                }
            }
        }
    }

    async fn send(&self, buffer: &[u8], is_final: bool) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.pending.extend_from_slice(buffer);
        if !is_final {
            return Ok(());
        }

        let frame = std::mem::take(&mut writer.pending);
        writer
            .sink
            .send(Message::Binary(frame.into()))
            .await
            .map_err(|e| {
                let error = TransportError::from_send(e);
                if error.is_closed() {
                    self.mark_disconnected();
                }
                error
            })
    }

    async fn close(&self, reason: CloseReason, description: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.pending.clear();

        let frame = CloseFrame {
            code: reason.into(),
            reason: description.to_string().into(),
        };
        let result = writer.sink.send(Message::Close(Some(frame))).await;
        self.mark_disconnected();

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                let error = TransportError::from_send(e);
                if error.is_closed() { Ok(()) } else { Err(error) }
            }
        }
    }
}
