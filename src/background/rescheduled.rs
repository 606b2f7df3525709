use super::BackgroundTask;
use super::backoff::ExponentialBackoff;
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;

/// Runs a background task forever: after a success it waits the nominal
/// delay, after an error it backs off exponentially.
pub struct RescheduledOnErrorTask {
    task: Arc<dyn BackgroundTask>,
    nominal_delay: Duration,
    backoff: ExponentialBackoff,
    error_delay: Duration,
}

impl RescheduledOnErrorTask {
    pub fn new(task: Arc<dyn BackgroundTask>, nominal_delay: Duration, max_delay: Duration) -> Self {
        Self {
            task,
            nominal_delay,
            backoff: ExponentialBackoff::new(nominal_delay, max_delay, ExponentialBackoff::DEFAULT_FACTOR),
            error_delay: Duration::ZERO,
        }
    }

    /// Runs the task once and returns the delay before the next run.
    pub async fn run_once(&mut self) -> Duration {
        let Some(job) = self.task.execute() else {
            warn!(
                "Expected to perform a background task, but no result returned for job {}; rescheduling anyway",
                self.task.name()
            );
            return self.on_success(0);
        };

        match job.await {
            Ok(count) => self.on_success(count),
            Err(err) => {
                self.error_delay = self.backoff.next_delay(self.error_delay);
                error!(
                    "Error occurred while performing a background task {}; operation will be retried in {} ms: {}",
                    self.task.name(),
                    self.error_delay.as_millis(),
                    err
                );
                self.error_delay
            }
        }
    }

    fn on_success(&mut self, count: usize) -> Duration {
        debug!("Background task {} processed {} items", self.task.name(), count);
        self.error_delay = Duration::ZERO;
        self.nominal_delay
    }

    pub async fn run(mut self) {
        loop {
            let delay = self.run_once().await;
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineError, Result};
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a scripted sequence of outcomes; `None` entries return no job.
    struct ScriptedTask {
        outcomes: Mutex<VecDeque<Option<bool>>>,
    }

    impl ScriptedTask {
        fn new(outcomes: &[Option<bool>]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
            })
        }
    }

    impl BackgroundTask for ScriptedTask {
        fn name(&self) -> &str {
            "scripted"
        }

        fn execute(&self) -> Option<BoxFuture<'static, Result<usize>>> {
            let outcome = self.outcomes.lock().unwrap().pop_front().flatten()?;
            Some(
                async move {
                    if outcome {
                        Ok(1)
                    } else {
                        Err(EngineError::BackgroundError("boom".to_string()))
                    }
                }
                .boxed(),
            )
        }
    }

    #[tokio::test]
    async fn errors_back_off_and_success_resets() {
        let task = ScriptedTask::new(&[Some(false), Some(false), Some(false), Some(true), Some(false)]);
        let mut runner = RescheduledOnErrorTask::new(
            task,
            Duration::from_millis(10),
            Duration::from_millis(100),
        );

        assert_eq!(runner.run_once().await, Duration::from_millis(10));
        assert_eq!(runner.run_once().await, Duration::from_millis(12));
        assert_eq!(runner.run_once().await, Duration::from_millis(14));
        assert_eq!(runner.run_once().await, Duration::from_millis(10));
        assert_eq!(runner.run_once().await, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn missing_result_is_rescheduled_with_nominal_delay() {
        let task = ScriptedTask::new(&[None]);
        let mut runner = RescheduledOnErrorTask::new(
            task,
            Duration::from_millis(25),
            Duration::from_millis(100),
        );
        assert_eq!(runner.run_once().await, Duration::from_millis(25));
    }
}
