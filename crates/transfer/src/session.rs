use resup_protocol::{ProgressEvent, TransferState, UploadId, percent_of};

use crate::source::SourceReader;

/// In-memory state of one transfer run.
///
/// The session owns the source reader for its whole lifetime; dropping the
/// session releases it. Nothing here survives a restart, only the checkpoint
/// does.
pub struct TransferSession {
    upload_id: UploadId,
    reader: Box<dyn SourceReader>,
    total_bytes: u64,
    offset: u64,
    state: TransferState,
}

impl TransferSession {
    /// Creates a pending session starting at `start_offset`, clamped to
    /// `total_bytes`.
    pub fn new(
        upload_id: UploadId,
        reader: Box<dyn SourceReader>,
        total_bytes: u64,
        start_offset: u64,
    ) -> Self {
        Self {
            upload_id,
            reader,
            total_bytes,
            offset: start_offset.min(total_bytes),
            state: TransferState::Pending,
        }
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes confirmed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn remaining(&self) -> u64 {
        self.total_bytes - self.offset
    }

    pub fn is_complete(&self) -> bool {
        self.offset >= self.total_bytes
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn percent(&self) -> u8 {
        percent_of(self.offset, self.total_bytes)
    }

    pub(crate) fn reader_mut(&mut self) -> &mut dyn SourceReader {
        self.reader.as_mut()
    }

    pub(crate) fn start(&mut self) {
        self.state = TransferState::Running;
    }

    /// Records `len` acknowledged bytes.
    pub(crate) fn advance(&mut self, len: u64) {
        self.offset = (self.offset + len).min(self.total_bytes);
    }

    pub(crate) fn finish(&mut self, state: TransferState) {
        debug_assert!(state.is_terminal());
        self.state = state;
    }

    /// Progress event describing the current state.
    pub fn event(&self) -> ProgressEvent {
        let percent = match self.state {
            TransferState::Succeeded => 100,
            // 100 is reserved for the success event.
            _ => self.percent().min(99),
        };
        ProgressEvent::new(self.upload_id.clone(), percent, self.state)
    }
}
