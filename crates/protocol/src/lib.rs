//! Value types shared by every resup crate.
//!
//! Nothing here performs I/O; these are the identities and events that flow
//! between the checkpoint store, the transfer engine, the supervisor and the
//! status channel.

pub mod types;

// Re-export primary types for convenience.
pub use types::{Checkpoint, ProgressEvent, SourceRef, TransferState, UploadId, percent_of};
