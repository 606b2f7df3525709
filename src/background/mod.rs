// ============================================================================
// Background jobs that run outside the partition pipeline
// ============================================================================

pub mod archiver;
pub mod backoff;
pub mod manager;
pub mod rescheduled;

pub use archiver::{
    ApplyRolloverPeriodJob, ArchiverRepository, InMemoryArchiverRepository,
    NoopArchiverRepository, UserTaskArchiverJob,
};
pub use backoff::ExponentialBackoff;
pub use manager::{BackgroundTaskManager, TaskExecutor, TokioTaskExecutor};
pub use rescheduled::RescheduledOnErrorTask;

use crate::core::Result;
use futures::future::BoxFuture;

/// A recurring job. `execute` returns the job's work as a future resolving
/// to the number of processed items, or `None` when there is nothing to run.
pub trait BackgroundTask: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self) -> Option<BoxFuture<'static, Result<usize>>>;
}
