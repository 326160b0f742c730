//! Host background-execution seam.

use std::future::Future;
use std::pin::Pin;

use tracing::Instrument;

/// A unit of work handed to the host.
pub type WorkFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Facility that runs long-lived units of work in the background.
///
/// The supervisor decides uniqueness and retries; the executor only needs to
/// drive the future to completion.
pub trait HostExecutor: Send + Sync {
    fn spawn(&self, name: &str, work: WorkFuture);
}

/// Runs work on the ambient tokio runtime.
///
/// Must be used from within a runtime context.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioExecutor;

impl HostExecutor for TokioExecutor {
    fn spawn(&self, name: &str, work: WorkFuture) {
        let span = tracing::info_span!("work", name = %name);
        tokio::spawn(work.instrument(span));
    }
}
