//! Unique-work registration, retry loop and status relay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use resup_checkpoint::CheckpointError;
use resup_protocol::{ProgressEvent, SourceRef, TransferState, UploadId};
use resup_status::{ProgressSink, StatusChannel};
use resup_transfer::{RunOutcome, TransferEngine};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::executor::HostExecutor;
use crate::indicator::StatusIndicator;
use crate::retry::RetryConfig;
use crate::types::{SubmitOutcome, TaskEvent, work_name};

/// Capacity of the terminal event queue.
const EVENTS_CAPACITY: usize = 256;

/// Supervises background upload work.
///
/// At most one unit of work exists per upload id: submitting an id that is
/// still registered keeps the existing work. The registration lasts until
/// the work exits, including while a cancellation is being honoured.
pub struct TaskSupervisor {
    shared: Arc<Shared>,
    events_rx: Mutex<Option<mpsc::Receiver<TaskEvent>>>,
}

struct Shared {
    engine: Arc<TransferEngine>,
    status: StatusChannel,
    executor: Arc<dyn HostExecutor>,
    indicator: Arc<dyn StatusIndicator>,
    retry: RetryConfig,
    active: Mutex<HashMap<UploadId, ActiveWork>>,
    events_tx: mpsc::Sender<TaskEvent>,
}

struct ActiveWork {
    cancel: CancellationToken,
    /// Clear the checkpoint once the work exits.
    abandon: bool,
}

impl TaskSupervisor {
    pub fn new(
        engine: Arc<TransferEngine>,
        status: StatusChannel,
        executor: Arc<dyn HostExecutor>,
        indicator: Arc<dyn StatusIndicator>,
        retry: RetryConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENTS_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                engine,
                status,
                executor,
                indicator,
                retry,
                active: Mutex::new(HashMap::new()),
                events_tx,
            }),
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the terminal event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<TaskEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Status channel the supervisor publishes to.
    pub fn status(&self) -> &StatusChannel {
        &self.shared.status
    }

    /// Registers upload work for `upload_id` reading from `source`.
    ///
    /// A no-op returning [`SubmitOutcome::AlreadyActive`] if work for the id
    /// is already registered.
    pub fn submit(&self, upload_id: UploadId, source: SourceRef) -> SubmitOutcome {
        let cancel = CancellationToken::new();
        {
            let mut active = self.shared.active.lock().unwrap_or_else(|e| e.into_inner());
            if active.contains_key(&upload_id) {
                debug!(upload = %upload_id, "work already registered, keeping existing");
                return SubmitOutcome::AlreadyActive;
            }
            active.insert(
                upload_id.clone(),
                ActiveWork {
                    cancel: cancel.clone(),
                    abandon: false,
                },
            );
        }

        let name = work_name(&upload_id);
        info!(upload = %upload_id, source = %source, work = %name, "upload enqueued");
        let relay = Relay::new(&self.shared, source.display_name());
        relay.publish(ProgressEvent::new(
            upload_id.clone(),
            0,
            TransferState::Pending,
        ));

        let shared = Arc::clone(&self.shared);
        self.shared.executor.spawn(
            &name,
            Box::pin(run_work(shared, upload_id, source, cancel)),
        );
        SubmitOutcome::Enqueued
    }

    /// Signals cancellation to the work for `upload_id`. No-op if none.
    ///
    /// The checkpoint is kept, so a later submit resumes where this run
    /// stopped.
    pub fn cancel(&self, upload_id: &UploadId) {
        let active = self.shared.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(work) = active.get(upload_id) {
            info!(upload = %upload_id, "cancelling upload");
            work.cancel.cancel();
        }
    }

    /// Cancels any work for `upload_id` and discards its checkpoint.
    ///
    /// When work is active the checkpoint is cleared as soon as it exits;
    /// otherwise it is cleared immediately.
    pub fn abandon(&self, upload_id: &UploadId) -> Result<(), CheckpointError> {
        {
            let mut active = self.shared.active.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(work) = active.get_mut(upload_id) {
                info!(upload = %upload_id, "abandoning active upload");
                work.abandon = true;
                work.cancel.cancel();
                return Ok(());
            }
        }
        info!(upload = %upload_id, "discarding checkpoint");
        self.shared.engine.store().clear(upload_id)
    }

    /// Returns `true` while work for `upload_id` is registered.
    pub fn is_active(&self, upload_id: &UploadId) -> bool {
        self.shared
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(upload_id)
    }

    /// Ids with registered work.
    pub fn active_ids(&self) -> Vec<UploadId> {
        let active = self.shared.active.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<UploadId> = active.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Republishes engine events to the status channel and the indicator.
struct Relay {
    status: StatusChannel,
    indicator: Arc<dyn StatusIndicator>,
    title: String,
}

impl Relay {
    fn new(shared: &Shared, title: String) -> Self {
        Self {
            status: shared.status.clone(),
            indicator: Arc::clone(&shared.indicator),
            title,
        }
    }

    fn last_percent(&self, upload_id: &UploadId) -> u8 {
        self.status
            .latest(upload_id)
            .map(|e| e.percent.min(99))
            .unwrap_or(0)
    }
}

impl ProgressSink for Relay {
    fn publish(&self, event: ProgressEvent) {
        self.indicator.update(&self.title, &event);
        self.status.publish(event);
    }
}

/// Keeps an upload id registered while its work is alive.
///
/// Dropping the guard unregisters the id and applies a pending abandon on
/// every exit path, including a panic inside the engine or the work future
/// being dropped by the executor. A guard dropped before [`finish`] also
/// reports the work as failed.
///
/// [`finish`]: Registration::finish
struct Registration {
    shared: Arc<Shared>,
    upload_id: UploadId,
    title: String,
    attempts: u32,
    finished: bool,
}

impl Registration {
    fn new(shared: Arc<Shared>, upload_id: UploadId, title: String) -> Self {
        Self {
            shared,
            upload_id,
            title,
            attempts: 0,
            finished: false,
        }
    }

    /// Unregisters the id, then delivers the terminal event.
    fn finish(mut self, event: TaskEvent) {
        self.finished = true;
        let shared = Arc::clone(&self.shared);
        let attempts = self.attempts;
        drop(self);

        debug!(upload = %event.upload_id(), state = %event.state(), attempts, "work finished");
        if let Err(e) = shared.events_tx.try_send(event) {
            warn!("failed to deliver terminal event: {e}");
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let upload_id = &self.upload_id;
        let abandon = {
            let mut active = self.shared.active.lock().unwrap_or_else(|e| e.into_inner());
            active.remove(upload_id).is_some_and(|w| w.abandon)
        };
        if abandon {
            match self.shared.engine.store().clear(upload_id) {
                Ok(()) => info!(upload = %upload_id, "checkpoint discarded"),
                Err(e) => warn!(upload = %upload_id, error = %e, "failed to discard checkpoint"),
            }
        }
        if self.finished {
            return;
        }

        let error = "upload work ended unexpectedly".to_string();
        error!(upload = %upload_id, attempts = self.attempts, "{error}");
        let relay = Relay::new(&self.shared, self.title.clone());
        let percent = relay.last_percent(upload_id);
        relay.publish(
            ProgressEvent::new(upload_id.clone(), percent, TransferState::Failed)
                .with_error(error.clone()),
        );
        let event = TaskEvent::Failed {
            upload_id: upload_id.clone(),
            error,
            retryable: false,
            attempts: self.attempts,
        };
        if let Err(e) = self.shared.events_tx.try_send(event) {
            warn!("failed to deliver terminal event: {e}");
        }
    }
}

/// Body of one unit of work: engine attempts plus backoff between them.
async fn run_work(
    shared: Arc<Shared>,
    upload_id: UploadId,
    source: SourceRef,
    cancel: CancellationToken,
) {
    let title = source.display_name();
    let mut registration =
        Registration::new(Arc::clone(&shared), upload_id.clone(), title.clone());
    let relay = Relay::new(&shared, title);
    let mut attempt: u32 = 0;

    let event = loop {
        attempt = attempt.saturating_add(1);
        registration.attempts = attempt;
        match shared
            .engine
            .run(&upload_id, &source, &cancel, &relay)
            .await
        {
            Ok(RunOutcome::Succeeded) => {
                break TaskEvent::Succeeded {
                    upload_id: upload_id.clone(),
                };
            }
            Ok(RunOutcome::Cancelled) => {
                break TaskEvent::Cancelled {
                    upload_id: upload_id.clone(),
                };
            }
            Err(e) if e.is_retryable() && shared.retry.allows_retry_after(attempt) => {
                let delay = shared.retry.delay_for_attempt(attempt);
                info!(
                    upload = %upload_id,
                    attempt,
                    delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
                    error = %e,
                    "retrying from checkpoint"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(upload = %upload_id, "cancelled during backoff");
                        let percent = relay.last_percent(&upload_id);
                        relay.publish(ProgressEvent::new(
                            upload_id.clone(),
                            percent,
                            TransferState::Cancelled,
                        ));
                        break TaskEvent::Cancelled {
                            upload_id: upload_id.clone(),
                        };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                let retryable = e.is_retryable();
                let error = if retryable {
                    // The engine left the transient failure without a
                    // message; surface the final one.
                    let msg = format!("giving up after {attempt} attempts: {e}");
                    let percent = relay.last_percent(&upload_id);
                    relay.publish(
                        ProgressEvent::new(upload_id.clone(), percent, TransferState::Failed)
                            .with_error(msg.clone()),
                    );
                    msg
                } else {
                    e.to_string()
                };
                break TaskEvent::Failed {
                    upload_id: upload_id.clone(),
                    error,
                    retryable,
                    attempts: attempt,
                };
            }
        }
    };

    registration.finish(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TokioExecutor;
    use crate::indicator::NoopIndicator;
    use resup_checkpoint::{CheckpointStore, MemoryCheckpointStore};
    use resup_transfer::{
        Chunk, EngineConfig, OpenedSource, SendFuture, SourceOpener, SourceReader,
        TransferError, Transport, TransportError,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    struct BytesOpener {
        data: Vec<u8>,
        opens: AtomicUsize,
    }

    struct BytesReader {
        data: Vec<u8>,
        pos: usize,
    }

    impl SourceOpener for BytesOpener {
        fn open(&self, source: &SourceRef) -> Result<OpenedSource, TransferError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if source.as_str() == "missing" {
                return Err(TransferError::SourceUnavailable("missing".into()));
            }
            Ok(OpenedSource {
                reader: Box::new(BytesReader {
                    data: self.data.clone(),
                    pos: 0,
                }),
                total_bytes: self.data.len() as u64,
            })
        }
    }

    impl SourceReader for BytesReader {
        fn skip(&mut self, n: u64) -> Result<(), TransferError> {
            self.pos += n as usize;
            Ok(())
        }

        fn read_chunk(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, TransferError> {
            if self.pos >= self.data.len() {
                return Ok(None);
            }
            let end = (self.pos + max_len).min(self.data.len());
            let out = self.data[self.pos..end].to_vec();
            self.pos = end;
            Ok(Some(out))
        }
    }

    /// Optionally gated by a semaphore; fails the first `failures` sends.
    struct TestTransport {
        gate: Option<Arc<Semaphore>>,
        failures: AtomicUsize,
        sent: AtomicUsize,
        entered: AtomicUsize,
        panics: bool,
    }

    impl TestTransport {
        fn open() -> Self {
            Self {
                gate: None,
                failures: AtomicUsize::new(0),
                sent: AtomicUsize::new(0),
                entered: AtomicUsize::new(0),
                panics: false,
            }
        }

        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::open()
            }
        }

        fn panicking() -> Self {
            Self {
                panics: true,
                ..Self::open()
            }
        }

        fn failing(n: usize) -> Self {
            Self {
                failures: AtomicUsize::new(n),
                ..Self::open()
            }
        }
    }

    impl Transport for TestTransport {
        fn send<'a>(&'a self, _upload_id: &'a UploadId, _chunk: &'a Chunk) -> SendFuture<'a> {
            Box::pin(async move {
                self.entered.fetch_add(1, Ordering::SeqCst);
                if self.panics {
                    panic!("transport crashed");
                }
                if let Some(gate) = &self.gate {
                    gate.acquire().await.unwrap().forget();
                }
                let left = self.failures.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures.store(left - 1, Ordering::SeqCst);
                    return Err(TransportError::Rejected("503".into()));
                }
                self.sent.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    struct Harness {
        supervisor: TaskSupervisor,
        store: Arc<MemoryCheckpointStore>,
        opener: Arc<BytesOpener>,
        transport: Arc<TestTransport>,
        events: mpsc::Receiver<TaskEvent>,
    }

    fn harness(len: usize, transport: TestTransport, retry: RetryConfig) -> Harness {
        harness_with(len, transport, retry, Arc::new(NoopIndicator))
    }

    fn harness_with(
        len: usize,
        transport: TestTransport,
        retry: RetryConfig,
        indicator: Arc<dyn StatusIndicator>,
    ) -> Harness {
        let store = Arc::new(MemoryCheckpointStore::new());
        let opener = Arc::new(BytesOpener {
            data: vec![9u8; len],
            opens: AtomicUsize::new(0),
        });
        let transport = Arc::new(transport);
        let engine = TransferEngine::new(
            Arc::clone(&store) as Arc<dyn CheckpointStore>,
            Arc::clone(&opener) as Arc<dyn SourceOpener>,
            Arc::clone(&transport) as Arc<dyn Transport>,
            EngineConfig {
                chunk_size: 4,
                send_timeout: Duration::from_secs(5),
            },
        );
        let supervisor = TaskSupervisor::new(
            Arc::new(engine),
            StatusChannel::new(),
            Arc::new(TokioExecutor),
            indicator,
            retry,
        );
        let events = supervisor.take_events().unwrap();
        Harness {
            supervisor,
            store,
            opener,
            transport,
            events,
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_attempts,
        }
    }

    fn id() -> UploadId {
        UploadId::from("file:///data/clip.mov")
    }

    fn src() -> SourceRef {
        SourceRef::new("file:///data/clip.mov")
    }

    /// Yields until the work is inside its first chunk send.
    async fn wait_for_send(transport: &TestTransport) {
        while transport.entered.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(sub: &mut resup_status::Subscription) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[tokio::test]
    async fn submit_runs_to_success() {
        let mut h = harness(10, TestTransport::open(), fast_retry(3));
        let mut sub = h.supervisor.status().subscribe(&id());

        assert_eq!(h.supervisor.submit(id(), src()), SubmitOutcome::Enqueued);
        assert!(h.supervisor.is_active(&id()));

        let event = h.events.recv().await.unwrap();
        assert_eq!(event, TaskEvent::Succeeded { upload_id: id() });
        assert!(!h.supervisor.is_active(&id()));
        assert_eq!(h.transport.sent.load(Ordering::SeqCst), 3);
        assert_eq!(h.store.get(&id()), 0);

        let states: Vec<TransferState> = drain(&mut sub).iter().map(|e| e.state).collect();
        assert_eq!(states.first(), Some(&TransferState::Pending));
        assert_eq!(states.last(), Some(&TransferState::Succeeded));
    }

    #[tokio::test]
    async fn duplicate_submit_keeps_existing_work() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(8, TestTransport::gated(Arc::clone(&gate)), fast_retry(3));

        assert_eq!(h.supervisor.submit(id(), src()), SubmitOutcome::Enqueued);
        wait_for_send(&h.transport).await;
        assert_eq!(
            h.supervisor.submit(id(), src()),
            SubmitOutcome::AlreadyActive
        );
        assert_eq!(h.supervisor.active_ids(), vec![id()]);

        gate.add_permits(2);
        assert_eq!(
            h.events.recv().await.unwrap(),
            TaskEvent::Succeeded { upload_id: id() }
        );
        assert_eq!(h.opener.opens.load(Ordering::SeqCst), 1);

        // Registration is released on exit, so the id can be submitted again.
        assert_eq!(h.supervisor.submit(id(), src()), SubmitOutcome::Enqueued);
    }

    #[tokio::test]
    async fn cancel_stops_and_keeps_checkpoint() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(12, TestTransport::gated(Arc::clone(&gate)), fast_retry(3));
        let mut sub = h.supervisor.status().subscribe(&id());

        h.supervisor.submit(id(), src());
        wait_for_send(&h.transport).await;
        h.supervisor.cancel(&id());
        // Resubmitting while the cancellation is in flight is still a no-op.
        assert_eq!(
            h.supervisor.submit(id(), src()),
            SubmitOutcome::AlreadyActive
        );
        gate.add_permits(1);

        assert_eq!(
            h.events.recv().await.unwrap(),
            TaskEvent::Cancelled { upload_id: id() }
        );
        assert_eq!(h.store.get(&id()), 4);
        let last = drain(&mut sub).pop().unwrap();
        assert_eq!(last.state, TransferState::Cancelled);
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_noop() {
        let h = harness(4, TestTransport::open(), fast_retry(3));
        h.supervisor.cancel(&"nobody".into());
        assert!(h.supervisor.active_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_from_checkpoint() {
        let mut h = harness(12, TestTransport::failing(1), fast_retry(3));
        let mut sub = h.supervisor.status().subscribe(&id());

        h.supervisor.submit(id(), src());
        assert_eq!(
            h.events.recv().await.unwrap(),
            TaskEvent::Succeeded { upload_id: id() }
        );
        assert_eq!(h.opener.opens.load(Ordering::SeqCst), 2);
        assert_eq!(h.transport.sent.load(Ordering::SeqCst), 3);

        // Failed -> Running flicker, without a user-facing message.
        let events = drain(&mut sub);
        let failed = events
            .iter()
            .position(|e| e.state == TransferState::Failed)
            .unwrap();
        assert!(events[failed].error_message.is_none());
        assert_eq!(events[failed + 1].state, TransferState::Running);
        assert_eq!(events.last().unwrap().state, TransferState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_failure() {
        let mut h = harness(12, TestTransport::failing(usize::MAX), fast_retry(3));
        let mut sub = h.supervisor.status().subscribe(&id());

        h.supervisor.submit(id(), src());
        match h.events.recv().await.unwrap() {
            TaskEvent::Failed {
                retryable,
                attempts,
                error,
                ..
            } => {
                assert!(retryable);
                assert_eq!(attempts, 3);
                assert!(error.contains("giving up after 3 attempts"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(h.opener.opens.load(Ordering::SeqCst), 3);

        let last = drain(&mut sub).pop().unwrap();
        assert_eq!(last.state, TransferState::Failed);
        assert!(last.error_message.is_some());
    }

    #[tokio::test]
    async fn terminal_failure_is_not_retried() {
        let mut h = harness(12, TestTransport::open(), fast_retry(5));

        h.supervisor.submit(id(), SourceRef::new("missing"));
        match h.events.recv().await.unwrap() {
            TaskEvent::Failed {
                retryable,
                attempts,
                ..
            } => {
                assert!(!retryable);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(h.opener.opens.load(Ordering::SeqCst), 1);
        let latest = h.supervisor.status().latest(&id()).unwrap();
        assert_eq!(latest.state, TransferState::Failed);
        assert!(latest.error_message.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff() {
        let mut h = harness(12, TestTransport::failing(usize::MAX), fast_retry(5));

        h.supervisor.submit(id(), src());
        // Let the first attempt fail and enter backoff.
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.supervisor.cancel(&id());

        assert_eq!(
            h.events.recv().await.unwrap(),
            TaskEvent::Cancelled { upload_id: id() }
        );
        assert_eq!(h.opener.opens.load(Ordering::SeqCst), 1);
        let latest = h.supervisor.status().latest(&id()).unwrap();
        assert_eq!(latest.state, TransferState::Cancelled);
    }

    #[tokio::test]
    async fn abandon_idle_clears_checkpoint() {
        let h = harness(12, TestTransport::open(), fast_retry(3));
        h.store.set(&id(), 8).unwrap();

        h.supervisor.abandon(&id()).unwrap();
        assert_eq!(h.store.get(&id()), 0);
    }

    #[tokio::test]
    async fn abandon_active_clears_after_exit() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(12, TestTransport::gated(Arc::clone(&gate)), fast_retry(3));

        h.supervisor.submit(id(), src());
        wait_for_send(&h.transport).await;
        h.supervisor.abandon(&id()).unwrap();
        gate.add_permits(1);

        assert_eq!(
            h.events.recv().await.unwrap(),
            TaskEvent::Cancelled { upload_id: id() }
        );
        assert_eq!(h.store.get(&id()), 0);
        assert!(h.store.entries().is_empty());
    }

    #[derive(Default)]
    struct RecordingIndicator(std::sync::Mutex<Vec<(String, TransferState)>>);

    impl StatusIndicator for RecordingIndicator {
        fn update(&self, title: &str, event: &ProgressEvent) {
            self.0.lock().unwrap().push((title.to_string(), event.state));
        }
    }

    #[tokio::test]
    async fn indicator_shows_source_name() {
        let indicator = Arc::new(RecordingIndicator::default());
        let mut h = harness_with(
            8,
            TestTransport::open(),
            fast_retry(3),
            Arc::clone(&indicator) as Arc<dyn StatusIndicator>,
        );

        h.supervisor.submit(id(), src());
        h.events.recv().await.unwrap();

        let updates = indicator.0.lock().unwrap().clone();
        assert_eq!(updates.first().unwrap().1, TransferState::Pending);
        assert_eq!(updates.last().unwrap().1, TransferState::Succeeded);
        assert!(updates.iter().all(|(title, _)| title == "clip.mov"));
    }

    #[tokio::test]
    async fn panicking_work_releases_its_id() {
        let mut h = harness(12, TestTransport::panicking(), fast_retry(3));
        h.store.set(&id(), 4).unwrap();

        h.supervisor.submit(id(), src());
        match h.events.recv().await.unwrap() {
            TaskEvent::Failed {
                retryable,
                attempts,
                ..
            } => {
                assert!(!retryable);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!h.supervisor.is_active(&id()));
        // The checkpoint survives so a later run resumes from it.
        assert_eq!(h.store.get(&id()), 4);

        let latest = h.supervisor.status().latest(&id()).unwrap();
        assert_eq!(latest.state, TransferState::Failed);
        assert!(latest.error_message.is_some());

        assert_eq!(h.supervisor.submit(id(), src()), SubmitOutcome::Enqueued);
    }

    #[test]
    fn take_events_once() {
        let h = harness(1, TestTransport::open(), fast_retry(1));
        // The harness already took the receiver.
        assert!(h.supervisor.take_events().is_none());
    }
}
