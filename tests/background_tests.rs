use async_trait::async_trait;
use cmdflow::EngineError;
use cmdflow::background::{
    ArchiverRepository, BackgroundTaskManager, InMemoryArchiverRepository, TokioTaskExecutor,
};
use cmdflow::config::ArchiverConfig;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

fn archiver_config() -> ArchiverConfig {
    ArchiverConfig {
        delay_between_runs_ms: 1_000,
        max_delay_between_runs_ms: 5_000,
        rollover_batch_size: 100,
    }
}

#[tokio::test(start_paused = true)]
async fn archiver_moves_one_batch_per_run() {
    let repository = Arc::new(InMemoryArchiverRepository::new());
    for key in 1..=250 {
        repository.add_completed_user_task(key).unwrap();
    }
    let mut manager = BackgroundTaskManager::with_archiver_jobs(
        &archiver_config(),
        repository.clone(),
        Arc::new(TokioTaskExecutor::current().unwrap()),
    );

    manager.start().unwrap();
    manager.start().unwrap();
    assert_eq!(manager.task_count(), 2);
    assert_eq!(manager.submitted_count(), 2);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(repository.archived().unwrap().len(), 100);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(repository.archived().unwrap().len(), 200);

    tokio::time::sleep(Duration::from_millis(3_000)).await;
    let archived = repository.archived().unwrap();
    assert_eq!(archived.len(), 250);
    assert_eq!(archived.first(), Some(&1));
    assert_eq!(archived.last(), Some(&250));

    manager.close().await;
    assert!(repository.is_closed());
}

/// Fails the first `failures` runs and records when each run happened.
struct FlakyRepository {
    started: Instant,
    failures: Mutex<usize>,
    runs: Mutex<Vec<u128>>,
}

impl FlakyRepository {
    fn new(failures: usize) -> Self {
        Self {
            started: Instant::now(),
            failures: Mutex::new(failures),
            runs: Mutex::new(Vec::new()),
        }
    }

    fn runs(&self) -> Vec<u128> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiverRepository for FlakyRepository {
    async fn archive_completed_user_tasks(&self, _batch_size: usize) -> cmdflow::Result<usize> {
        self.runs
            .lock()
            .unwrap()
            .push(self.started.elapsed().as_millis());
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(EngineError::BackgroundError("archive unavailable".to_string()));
        }
        Ok(0)
    }

    async fn close(&self) -> cmdflow::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn failing_runs_back_off_and_success_resets_the_delay() {
    let repository = Arc::new(FlakyRepository::new(2));
    let mut manager = BackgroundTaskManager::with_archiver_jobs(
        &archiver_config(),
        repository.clone(),
        Arc::new(TokioTaskExecutor::current().unwrap()),
    );
    manager.start().unwrap();

    tokio::time::sleep(Duration::from_millis(3_500)).await;

    // fail, fail after 1000ms, succeed after 1200ms, then the nominal delay
    assert_eq!(repository.runs(), vec![0, 1_000, 2_200, 3_200]);
    manager.close().await;
}
