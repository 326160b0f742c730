//! Background lifecycle for resumable uploads.
//!
//! The [`TaskSupervisor`] registers one uniquely named unit of work per
//! upload id with a [`HostExecutor`], runs the transfer engine inside it,
//! retries transient failures from the persisted checkpoint, and relays
//! progress to the status channel and a foreground [`StatusIndicator`].

pub mod executor;
pub mod indicator;
pub mod retry;
pub mod supervisor;
pub mod types;

// Re-export primary types for convenience.
pub use executor::{HostExecutor, TokioExecutor, WorkFuture};
pub use indicator::{NoopIndicator, StatusIndicator, TracingIndicator};
pub use retry::RetryConfig;
pub use supervisor::TaskSupervisor;
pub use types::{SubmitOutcome, TaskEvent, work_name};
