use resup_protocol::{TransferState, UploadId};

/// Result of [`TaskSupervisor::submit`](crate::TaskSupervisor::submit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new unit of work was registered.
    Enqueued,
    /// Work for this id is already pending or running; nothing changed.
    AlreadyActive,
}

/// Terminal state of a unit of work, after any retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Succeeded {
        upload_id: UploadId,
    },
    Cancelled {
        upload_id: UploadId,
    },
    Failed {
        upload_id: UploadId,
        error: String,
        /// `true` when the failure was transient but retries ran out.
        retryable: bool,
        attempts: u32,
    },
}

impl TaskEvent {
    pub fn upload_id(&self) -> &UploadId {
        match self {
            Self::Succeeded { upload_id }
            | Self::Cancelled { upload_id }
            | Self::Failed { upload_id, .. } => upload_id,
        }
    }

    pub fn state(&self) -> TransferState {
        match self {
            Self::Succeeded { .. } => TransferState::Succeeded,
            Self::Cancelled { .. } => TransferState::Cancelled,
            Self::Failed { .. } => TransferState::Failed,
        }
    }
}

/// Unique work name registered with the host for an upload.
pub fn work_name(upload_id: &UploadId) -> String {
    format!("upload_{upload_id}")
}
