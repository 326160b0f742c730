//! Durable checkpoint storage for resumable uploads.
//!
//! A checkpoint is the number of bytes of a source that the remote has
//! acknowledged. Entries are keyed `off_<upload id>`; a missing entry means
//! nothing has been confirmed yet.

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use resup_protocol::{Checkpoint, UploadId};

/// Prefix of every persisted key.
pub const KEY_PREFIX: &str = "off_";

/// Errors produced by checkpoint stores.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-upload confirmed offset storage.
///
/// Implementations do not serialize access per key; the supervisor already
/// guarantees a single writer per upload. `set` must be durable before it
/// returns. Offsets are expected to be non-decreasing, which callers ensure.
pub trait CheckpointStore: Send + Sync {
    /// Returns the confirmed offset, or 0 when none is stored.
    fn get(&self, upload_id: &UploadId) -> u64;

    /// Persists `bytes` as the confirmed offset.
    fn set(&self, upload_id: &UploadId, bytes: u64) -> Result<(), CheckpointError>;

    /// Removes the entry. Removing a missing entry succeeds.
    fn clear(&self, upload_id: &UploadId) -> Result<(), CheckpointError>;

    /// Lists every stored checkpoint.
    fn entries(&self) -> Vec<Checkpoint>;
}

/// Persisted key for an upload.
pub fn storage_key(upload_id: &UploadId) -> String {
    format!("{KEY_PREFIX}{upload_id}")
}

/// Inverse of [`storage_key`]. Returns `None` for foreign keys.
pub fn upload_id_from_key(key: &str) -> Option<UploadId> {
    key.strip_prefix(KEY_PREFIX).map(UploadId::from)
}
