//! Chunked, checkpointed upload of a single source with resume support.
//!
//! The [`TransferEngine`] reads a source in bounded chunks, hands each one to
//! a [`Transport`], and records the acknowledged offset in a
//! [`CheckpointStore`](resup_checkpoint::CheckpointStore) after every chunk.
//! A later run for the same upload id skips the confirmed prefix and sends
//! only what remains.

mod chunk;
mod engine;
mod session;
mod source;
mod transport;

use std::time::Duration;

pub use chunk::{Chunk, checksum_bytes};
pub use engine::{EngineConfig, RunOutcome, TransferEngine};
pub use session::TransferSession;
pub use source::{FileSource, FileSourceOpener, OpenedSource, SourceOpener, SourceReader};
pub use transport::{
    DirectoryTransport, SendFuture, SimulatedTransport, Transport, TransportError,
};

use resup_checkpoint::CheckpointError;

/// Default chunk size: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default time allowed for one chunk send before it counts as failed.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors produced by a transfer run.
///
/// Source errors mean the reference is invalid or changed underneath the
/// checkpoint and are never retried. Everything else leaves the checkpoint
/// at the last acknowledged chunk and may be retried by the host.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("could not determine size of {0}")]
    SizeUnknown(String),

    #[error("source changed: ended after {skipped} of {expected} already-confirmed bytes")]
    ShortSkip { expected: u64, skipped: u64 },

    #[error("source truncated: ended at byte {offset} of {total}")]
    TruncatedSource { offset: u64, total: u64 },

    #[error("source read error: {0}")]
    SourceRead(#[source] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("chunk send timed out after {0:?}")]
    Timeout(Duration),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl TransferError {
    /// Returns `true` when the host may re-run the upload from its checkpoint.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SourceUnavailable(_)
            | Self::SizeUnknown(_)
            | Self::ShortSkip { .. }
            | Self::TruncatedSource { .. } => false,
            Self::SourceRead(_) | Self::Transport(_) | Self::Timeout(_) | Self::Checkpoint(_) => {
                true
            }
        }
    }
}
