//! Serves files under a directory as WOOF streams; the stream id is the
//! file's path relative to that directory.

use common::ErrorLocation;

use woof_core::error::StreamError;
use woof_core::server::stream::{FragmentStream, StreamProvider};

use std::io::ErrorKind;
use std::panic::Location;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs::File;

#[derive(Debug, Clone)]
pub struct DirectoryStreamProvider {
    root: PathBuf,
}

impl DirectoryStreamProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a stream id onto a path below the root.
    ///
    /// Only plain relative components are accepted; `..`, absolute paths and
    /// empty ids resolve to `None`.
    pub fn resolve(&self, stream_id: &str) -> Option<PathBuf> {
        let relative = Path::new(stream_id);
        if stream_id.is_empty() {
            return None;
        }
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl StreamProvider for DirectoryStreamProvider {
    async fn get_stream_by_id(
        &self,
        stream_id: &str,
    ) -> Result<Option<Box<dyn FragmentStream>>, StreamError> {
        let Some(path) = self.resolve(stream_id) else {
            warn!("Rejected stream id outside {}: {stream_id:?}", self.root.display());
            return Ok(None);
        };

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StreamError::Provider {
                    message: format!("Failed to open {}: {e}", path.display()),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        if !file.metadata().await?.is_file() {
            debug!("Stream {stream_id:?} is not a regular file");
            return Ok(None);
        }

        Ok(Some(Box::new(file)))
    }
}
