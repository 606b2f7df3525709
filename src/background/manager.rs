use super::archiver::{ApplyRolloverPeriodJob, ArchiverRepository, UserTaskArchiverJob};
use super::rescheduled::RescheduledOnErrorTask;
use super::BackgroundTask;
use crate::config::ArchiverConfig;
use crate::core::{EngineError, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use log::{error, info};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runs submitted futures until shut down.
pub trait TaskExecutor: Send + Sync {
    fn submit(&self, task: BoxFuture<'static, ()>) -> Result<()>;

    /// Stops every submitted task; later submissions fail.
    fn shutdown(&self);
}

pub struct TokioTaskExecutor {
    handle: Handle,
    running: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl TokioTaskExecutor {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            running: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Executor on the runtime of the caller.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|err| EngineError::BackgroundError(format!("no tokio runtime: {}", err)))?;
        Ok(Self::new(handle))
    }
}

impl TaskExecutor for TokioTaskExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(EngineError::BackgroundError(
                "executor is shut down".to_string(),
            ));
        }
        let join = self.handle.spawn(task);
        self.running.lock()?.push(join);
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        if let Ok(mut running) = self.running.lock() {
            for join in running.drain(..) {
                join.abort();
            }
        }
    }
}

struct ManagedTask {
    task: Arc<dyn BackgroundTask>,
    submitted: bool,
}

/// Supervises the recurring out-of-band jobs.
pub struct BackgroundTaskManager {
    tasks: Vec<ManagedTask>,
    executor: Arc<dyn TaskExecutor>,
    repository: Arc<dyn ArchiverRepository>,
    delay_between_runs: Duration,
    max_delay_between_runs: Duration,
}

impl BackgroundTaskManager {
    pub fn new(
        config: &ArchiverConfig,
        repository: Arc<dyn ArchiverRepository>,
        executor: Arc<dyn TaskExecutor>,
        tasks: Vec<Arc<dyn BackgroundTask>>,
    ) -> Self {
        Self {
            tasks: tasks
                .into_iter()
                .map(|task| ManagedTask {
                    task,
                    submitted: false,
                })
                .collect(),
            executor,
            repository,
            delay_between_runs: Duration::from_millis(config.delay_between_runs_ms),
            max_delay_between_runs: Duration::from_millis(config.max_delay_between_runs_ms),
        }
    }

    /// Manager with the user task archiver and the rollover job.
    pub fn with_archiver_jobs(
        config: &ArchiverConfig,
        repository: Arc<dyn ArchiverRepository>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        let tasks: Vec<Arc<dyn BackgroundTask>> = vec![
            Arc::new(UserTaskArchiverJob::new(
                repository.clone(),
                config.rollover_batch_size,
            )),
            Arc::new(ApplyRolloverPeriodJob),
        ];
        Self::new(config, repository, executor, tasks)
    }

    /// Submits every task that is not running yet. Calling it again only
    /// resubmits tasks whose previous submission failed.
    pub fn start(&mut self) -> Result<()> {
        let mut failed = Vec::new();
        for managed in self.tasks.iter_mut().filter(|managed| !managed.submitted) {
            let runner = RescheduledOnErrorTask::new(
                managed.task.clone(),
                self.delay_between_runs,
                self.max_delay_between_runs,
            );
            match self.executor.submit(runner.run().boxed()) {
                Ok(()) => {
                    info!("Started background task {}", managed.task.name());
                    managed.submitted = true;
                }
                Err(err) => {
                    error!("Failed to submit background task {}: {}", managed.task.name(), err);
                    failed.push(managed.task.name().to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(EngineError::BackgroundError(format!(
                "failed to submit background tasks: {}",
                failed.join(", ")
            )))
        }
    }

    pub fn submitted_count(&self) -> usize {
        self.tasks.iter().filter(|managed| managed.submitted).count()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops the executor and closes the repository. Close failures are
    /// logged only.
    pub async fn close(&self) {
        self.executor.shutdown();
        if let Err(err) = self.repository.close().await {
            error!("Failed to close archiver repository: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::archiver::NoopArchiverRepository;
    use std::sync::atomic::AtomicUsize;

    /// Rejects the first `failures` submissions and drops the rest.
    struct FlakyExecutor {
        failures: AtomicUsize,
        accepted: AtomicUsize,
    }

    impl TaskExecutor for FlakyExecutor {
        fn submit(&self, _task: BoxFuture<'static, ()>) -> Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(EngineError::BackgroundError("queue full".to_string()));
            }
            self.accepted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(&self) {}
    }

    #[test]
    fn restart_only_resubmits_failed_tasks() {
        let executor = Arc::new(FlakyExecutor {
            failures: AtomicUsize::new(1),
            accepted: AtomicUsize::new(0),
        });
        let mut manager = BackgroundTaskManager::with_archiver_jobs(
            &ArchiverConfig::default(),
            Arc::new(NoopArchiverRepository),
            executor.clone(),
        );

        assert!(manager.start().is_err());
        assert_eq!(manager.submitted_count(), 1);

        manager.start().unwrap();
        manager.start().unwrap();
        assert_eq!(manager.submitted_count(), 2);
        assert_eq!(executor.accepted.load(Ordering::SeqCst), 2);
    }
}
