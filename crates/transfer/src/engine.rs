//! The checkpointed read/send loop.

use std::sync::Arc;
use std::time::Duration;

use resup_checkpoint::CheckpointStore;
use resup_protocol::{ProgressEvent, SourceRef, TransferState, UploadId};
use resup_status::ProgressSink;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunk::Chunk;
use crate::session::TransferSession;
use crate::source::SourceOpener;
use crate::transport::Transport;
use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_SEND_TIMEOUT, TransferError};

/// Tuning for a [`TransferEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum bytes per chunk. Zero falls back to [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: usize,
    /// Time allowed for one chunk send. Zero falls back to
    /// [`DEFAULT_SEND_TIMEOUT`].
    pub send_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Non-error end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every byte was acknowledged and the checkpoint cleared.
    Succeeded,
    /// The cancellation token fired; the checkpoint is kept for a later run.
    Cancelled,
}

/// Drives resumable uploads.
///
/// The engine is host-agnostic: it knows nothing about retries or
/// scheduling. Each call to [`run`](Self::run) is one attempt that resumes
/// from the stored checkpoint and reports progress to a [`ProgressSink`].
/// At most one run per upload id may be active at a time.
pub struct TransferEngine {
    store: Arc<dyn CheckpointStore>,
    opener: Arc<dyn SourceOpener>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        opener: Arc<dyn SourceOpener>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            opener,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Checkpoint store shared by all runs.
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    fn chunk_size(&self) -> usize {
        if self.config.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.config.chunk_size
        }
    }

    fn send_timeout(&self) -> Duration {
        if self.config.send_timeout.is_zero() {
            DEFAULT_SEND_TIMEOUT
        } else {
            self.config.send_timeout
        }
    }

    /// Runs one attempt of the upload `upload_id` reading from `source`.
    ///
    /// Publishes `Running` events as chunks are confirmed, then exactly one
    /// terminal event. A failed event carries a message only for errors that
    /// must not be retried.
    pub async fn run(
        &self,
        upload_id: &UploadId,
        source: &SourceRef,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<RunOutcome, TransferError> {
        let mut session = match self.open_session(upload_id, source) {
            Ok(session) => session,
            Err(e) => {
                error!(upload = %upload_id, source = %source, error = %e, "cannot open source");
                sink.publish(
                    ProgressEvent::new(upload_id.clone(), 0, TransferState::Failed)
                        .with_error(e.to_string()),
                );
                return Err(e);
            }
        };

        let result = self.drive(&mut session, cancel, sink).await;
        match &result {
            Ok(RunOutcome::Succeeded) => {
                session.finish(TransferState::Succeeded);
                info!(upload = %upload_id, total_bytes = session.total_bytes(), "upload succeeded");
                sink.publish(session.event());
            }
            Ok(RunOutcome::Cancelled) => {
                session.finish(TransferState::Cancelled);
                info!(upload = %upload_id, offset = session.offset(), "upload cancelled");
                sink.publish(session.event());
            }
            Err(e) => {
                session.finish(TransferState::Failed);
                let mut event = session.event();
                if e.is_retryable() {
                    warn!(upload = %upload_id, offset = session.offset(), error = %e, "upload attempt failed");
                } else {
                    error!(upload = %upload_id, offset = session.offset(), error = %e, "upload failed");
                    event = event.with_error(e.to_string());
                }
                sink.publish(event);
            }
        }
        result
    }

    fn open_session(
        &self,
        upload_id: &UploadId,
        source: &SourceRef,
    ) -> Result<TransferSession, TransferError> {
        let opened = self.opener.open(source)?;
        let total = opened.total_bytes;
        let stored = self.store.get(upload_id);
        if stored > total {
            warn!(
                upload = %upload_id,
                stored,
                total,
                "checkpoint beyond source length, clamping"
            );
        }
        Ok(TransferSession::new(
            upload_id.clone(),
            opened.reader,
            total,
            stored,
        ))
    }

    async fn drive(
        &self,
        session: &mut TransferSession,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<RunOutcome, TransferError> {
        let upload_id = session.upload_id().clone();
        session.start();

        if session.total_bytes() == 0 {
            self.store.clear(&upload_id)?;
            return Ok(RunOutcome::Succeeded);
        }

        let resume_from = session.offset();
        info!(
            upload = %upload_id,
            total_bytes = session.total_bytes(),
            resume_from,
            "upload running"
        );
        if resume_from > 0 {
            session.reader_mut().skip(resume_from)?;
            // Observers attaching to a resumed run see where it picked up.
            sink.publish(session.event());
        }

        let chunk_size = self.chunk_size() as u64;
        while !session.is_complete() {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }

            let to_read = chunk_size.min(session.remaining()) as usize;
            let data = match session.reader_mut().read_chunk(to_read)? {
                Some(data) if !data.is_empty() => data,
                _ => {
                    return Err(TransferError::TruncatedSource {
                        offset: session.offset(),
                        total: session.total_bytes(),
                    });
                }
            };
            let chunk = Chunk::new(session.offset(), data);

            let send_timeout = self.send_timeout();
            match tokio::time::timeout(send_timeout, self.transport.send(&upload_id, &chunk)).await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(TransferError::Timeout(send_timeout)),
            }

            session.advance(chunk.len() as u64);
            self.store.set(&upload_id, session.offset())?;
            debug!(
                upload = %upload_id,
                offset = session.offset(),
                len = chunk.len(),
                percent = session.percent(),
                "chunk confirmed"
            );

            if !session.is_complete() {
                sink.publish(session.event());
            }
        }

        self.store.clear(&upload_id)?;
        Ok(RunOutcome::Succeeded)
    }
}
