use std::fs::OpenOptions;
use std::future::Future;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use resup_protocol::UploadId;
use tracing::trace;

use crate::chunk::{Chunk, checksum_bytes};

/// Future returned by [`Transport::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

/// Errors reported by a transport. All of them leave the chunk unconfirmed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch at offset {0}")]
    ChecksumMismatch(u64),

    #[error("rejected by remote: {0}")]
    Rejected(String),
}

/// Delivers chunks to the remote destination.
///
/// A successful return means the remote acknowledged the chunk. Delivery is
/// at-least-once: after a lost acknowledgement the same chunk may be sent
/// again on resume, so destinations should apply chunks by offset.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, upload_id: &'a UploadId, chunk: &'a Chunk) -> SendFuture<'a>;
}

// ---------------------------------------------------------------------------
// SimulatedTransport
// ---------------------------------------------------------------------------

/// Accepts every chunk after a fixed delay.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    latency: Duration,
}

impl SimulatedTransport {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Transport for SimulatedTransport {
    fn send<'a>(&'a self, upload_id: &'a UploadId, chunk: &'a Chunk) -> SendFuture<'a> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            trace!(upload = %upload_id, offset = chunk.offset, len = chunk.len(), "simulated send");
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// DirectoryTransport
// ---------------------------------------------------------------------------

/// Writes each upload into a file under a destination directory.
///
/// Chunks are verified against their checksum and written at their own
/// offset, so a re-sent chunk overwrites identical bytes. The file for an
/// upload is named after the SHA-256 of its id.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    /// Creates a transport rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the destination directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File receiving the bytes of `upload_id`.
    pub fn destination_path(&self, upload_id: &UploadId) -> PathBuf {
        let name = checksum_bytes(upload_id.as_str().as_bytes());
        self.root.join(format!("{name}.part"))
    }
}

impl Transport for DirectoryTransport {
    fn send<'a>(&'a self, upload_id: &'a UploadId, chunk: &'a Chunk) -> SendFuture<'a> {
        Box::pin(async move {
            if !chunk.verify() {
                return Err(TransportError::ChecksumMismatch(chunk.offset));
            }
            let path = self.destination_path(upload_id);
            let offset = chunk.offset;
            let data = chunk.data.clone();
            tokio::task::spawn_blocking(move || write_at(&path, offset, &data))
                .await
                .map_err(|e| TransportError::Rejected(format!("task join error: {e}")))??;
            trace!(upload = %upload_id, offset, len = chunk.len(), "chunk written");
            Ok(())
        })
    }
}

fn write_at(path: &Path, offset: u64, data: &[u8]) -> Result<(), TransportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)?;
    file.sync_data()?;
    Ok(())
}
