//! Fragmented stream downloads.

use crate::error::stream::StreamError;
use crate::proto::StreamFragmentResponse;

use std::collections::HashMap;
use std::io::{Cursor, SeekFrom};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// A readable, seekable byte stream served in fragments.
pub trait FragmentStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> FragmentStream for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

/// Resolves stream ids to streams. `Ok(None)` means "no such stream".
#[async_trait]
pub trait StreamProvider: Send + Sync {
    async fn get_stream_by_id(
        &self,
        stream_id: &str,
    ) -> Result<Option<Box<dyn FragmentStream>>, StreamError>;
}

/// Streams held in memory, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct MemoryStreamProvider {
    streams: HashMap<String, Vec<u8>>,
}

impl MemoryStreamProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, stream_id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.streams.insert(stream_id.into(), data.into());
        self
    }
}

#[async_trait]
impl StreamProvider for MemoryStreamProvider {
    async fn get_stream_by_id(
        &self,
        stream_id: &str,
    ) -> Result<Option<Box<dyn FragmentStream>>, StreamError> {
        Ok(self
            .streams
            .get(stream_id)
            .map(|data| Box::new(Cursor::new(data.clone())) as Box<dyn FragmentStream>))
    }
}

/// Read up to `length` bytes at `offset`.
///
/// `is_end` is set once `offset + read >= stream length`; an offset at or past
/// the end yields an empty final fragment.
pub async fn read_fragment<S>(
    stream: &mut S,
    offset: u64,
    length: u32,
) -> Result<StreamFragmentResponse, StreamError>
where
    S: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    let total = stream.seek(SeekFrom::End(0)).await?;
    if offset >= total {
        return Ok(StreamFragmentResponse {
            data: Vec::new(),
            is_end: true,
        });
    }

    stream.seek(SeekFrom::Start(offset)).await?;
    let wanted = u64::from(length).min(total - offset) as usize;
    let mut data = vec![0u8; wanted];
    stream.read_exact(&mut data).await?;

    Ok(StreamFragmentResponse {
        is_end: offset + wanted as u64 >= total,
        data,
    })
}
