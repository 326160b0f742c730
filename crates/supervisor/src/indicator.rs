//! Foreground-visible status indicator.

use resup_protocol::{ProgressEvent, TransferState};
use tracing::{debug, info, warn};

/// Sink for the user-visible "upload in progress" indicator, such as a
/// notification or a status line. Updated on every progress event.
pub trait StatusIndicator: Send + Sync {
    /// `title` is the display name of the source being uploaded.
    fn update(&self, title: &str, event: &ProgressEvent);
}

/// Indicator that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndicator;

impl StatusIndicator for NoopIndicator {
    fn update(&self, _title: &str, _event: &ProgressEvent) {}
}

/// Reports indicator updates through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingIndicator;

impl StatusIndicator for TracingIndicator {
    fn update(&self, title: &str, event: &ProgressEvent) {
        match (event.state, event.error_message.as_deref()) {
            (TransferState::Running, _) => {
                debug!(upload = %event.upload_id, percent = event.percent, "uploading: {title}");
            }
            (TransferState::Failed, Some(msg)) => {
                warn!(upload = %event.upload_id, percent = event.percent, error = msg, "upload failed: {title}");
            }
            (state, _) => {
                info!(upload = %event.upload_id, percent = event.percent, %state, "upload status: {title}");
            }
        }
    }
}
