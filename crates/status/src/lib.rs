//! Keyed progress channel between the transfer engine and its observers.
//!
//! Each upload id has its own broadcast topic plus a last-known slot.
//! Publishing never blocks; a subscriber that falls behind silently skips
//! the events it missed, since only the latest state matters for display.
//! Observers that need durable state query the checkpoint store instead.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures_util::Stream;
use resup_protocol::{ProgressEvent, UploadId};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::trace;

/// Default per-topic buffer before slow subscribers start lagging.
pub const DEFAULT_CAPACITY: usize = 64;

/// Destination for progress events emitted by a transfer run.
pub trait ProgressSink: Send + Sync {
    /// Publishes an event. Must not block.
    fn publish(&self, event: ProgressEvent);
}

/// Multi-subscriber progress stream keyed by upload id.
#[derive(Clone)]
pub struct StatusChannel {
    topics: Arc<RwLock<HashMap<UploadId, Topic>>>,
    capacity: usize,
}

/// Per-upload state. The sender is dropped once a terminal event finds no
/// receivers; only the last-known slot is kept for finished uploads.
#[derive(Default)]
struct Topic {
    tx: Option<broadcast::Sender<ProgressEvent>>,
    last: Option<ProgressEvent>,
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a channel buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "StatusChannel capacity must be > 0");
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Attaches to the topic of `upload_id`.
    ///
    /// The subscription sees events published from now on; the state known
    /// at attach time is available through [`Subscription::latest`].
    pub fn subscribe(&self, upload_id: &UploadId) -> Subscription {
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        let topic = topics.entry(upload_id.clone()).or_default();
        let tx = topic
            .tx
            .get_or_insert_with(|| broadcast::channel(self.capacity).0);
        Subscription {
            upload_id: upload_id.clone(),
            latest: topic.last.clone(),
            rx: tx.subscribe(),
        }
    }

    /// Most recent event published for `upload_id`.
    pub fn latest(&self, upload_id: &UploadId) -> Option<ProgressEvent> {
        let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
        topics.get(upload_id).and_then(|t| t.last.clone())
    }

    fn publish_event(&self, event: ProgressEvent) {
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        let topic = topics.entry(event.upload_id.clone()).or_default();
        let terminal = event.state.is_terminal();
        topic.last = Some(event.clone());
        // No receivers is fine: the last-known slot still holds the event.
        let receivers = match &topic.tx {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        };
        if terminal && receivers == 0 {
            topic.tx = None;
        }
        trace!(receivers, "published progress event");
    }
}

impl ProgressSink for StatusChannel {
    fn publish(&self, event: ProgressEvent) {
        self.publish_event(event);
    }
}

/// One observer's view of an upload's progress.
pub struct Subscription {
    upload_id: UploadId,
    latest: Option<ProgressEvent>,
    rx: broadcast::Receiver<ProgressEvent>,
}

impl Subscription {
    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    /// State known when the subscription was created.
    pub fn latest(&self) -> Option<&ProgressEvent> {
        self.latest.as_ref()
    }

    /// Waits for the next event. Events dropped while this subscriber was
    /// lagging are skipped. Returns `None` only if the channel is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    trace!(upload = %self.upload_id, skipped, "subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    trace!(upload = %self.upload_id, skipped, "subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Adapts the subscription into a [`Stream`] of events.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}
