use super::BackgroundTask;
use crate::core::{EngineError, Result};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Storage the archiver jobs move finished documents through.
#[async_trait]
pub trait ArchiverRepository: Send + Sync {
    /// Archives up to `batch_size` finished user tasks; returns how many moved.
    async fn archive_completed_user_tasks(&self, batch_size: usize) -> Result<usize>;

    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryArchiverRepository {
    completed: Mutex<VecDeque<i64>>,
    archived: Mutex<Vec<i64>>,
    closed: AtomicBool,
}

impl InMemoryArchiverRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_completed_user_task(&self, user_task_key: i64) -> Result<()> {
        self.completed.lock()?.push_back(user_task_key);
        Ok(())
    }

    pub fn archived(&self) -> Result<Vec<i64>> {
        Ok(self.archived.lock()?.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiverRepository for InMemoryArchiverRepository {
    async fn archive_completed_user_tasks(&self, batch_size: usize) -> Result<usize> {
        if self.is_closed() {
            return Err(EngineError::BackgroundError(
                "archiver repository is closed".to_string(),
            ));
        }
        let mut completed = self.completed.lock()?;
        let count = batch_size.min(completed.len());
        let batch: Vec<i64> = completed.drain(..count).collect();
        self.archived.lock()?.extend(batch);
        Ok(count)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Repository used when archiving is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopArchiverRepository;

#[async_trait]
impl ArchiverRepository for NoopArchiverRepository {
    async fn archive_completed_user_tasks(&self, _batch_size: usize) -> Result<usize> {
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Moves finished user tasks to the archive, one batch per run.
///
/// ```
/// use cmdflow::background::{BackgroundTask, InMemoryArchiverRepository, UserTaskArchiverJob};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let repository = Arc::new(InMemoryArchiverRepository::new());
/// repository.add_completed_user_task(7).unwrap();
/// let job = UserTaskArchiverJob::new(repository.clone(), 10);
///
/// assert_eq!(job.execute().unwrap().await.unwrap(), 1);
/// assert_eq!(repository.archived().unwrap(), vec![7]);
/// # });
/// ```
pub struct UserTaskArchiverJob {
    repository: Arc<dyn ArchiverRepository>,
    batch_size: usize,
}

impl UserTaskArchiverJob {
    pub fn new(repository: Arc<dyn ArchiverRepository>, batch_size: usize) -> Self {
        Self {
            repository,
            batch_size,
        }
    }
}

impl BackgroundTask for UserTaskArchiverJob {
    fn name(&self) -> &str {
        "user-task-archiver"
    }

    fn execute(&self) -> Option<BoxFuture<'static, Result<usize>>> {
        let repository = self.repository.clone();
        let batch_size = self.batch_size;
        Some(async move { repository.archive_completed_user_tasks(batch_size).await }.boxed())
    }
}

/// Applies index rollover periods. Nothing to roll over in memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyRolloverPeriodJob;

impl BackgroundTask for ApplyRolloverPeriodJob {
    fn name(&self) -> &str {
        "apply-rollover-period"
    }

    fn execute(&self) -> Option<BoxFuture<'static, Result<usize>>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn archiver_job_moves_one_batch() {
        let repository = Arc::new(InMemoryArchiverRepository::new());
        for key in 1..=5 {
            repository.add_completed_user_task(key).unwrap();
        }
        let job = UserTaskArchiverJob::new(repository.clone(), 3);

        let moved = job.execute().unwrap().await.unwrap();
        assert_eq!(moved, 3);
        assert_eq!(repository.archived().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn rollover_job_returns_no_result() {
        assert!(ApplyRolloverPeriodJob.execute().is_none());
    }
}
