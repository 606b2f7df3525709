//! Tokio actors driving a partition: the processing actor owns the stream
//! processor and its timers, the async actor runs state-less tasks.

use super::log::LogStorage;
use super::processor::{StreamProcessor, run_async_task};
use super::schedule::{PartitionMessage, TaskActor, TaskTimers};
use super::transport::InterPartitionCommandSender;
use crate::core::{EngineError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{Level, event};

const IDLE_WAKEUP: Duration = Duration::from_secs(3600);

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn deadline(started: Instant, due_ms: Option<u64>) -> Instant {
    match due_ms {
        Some(due_ms) => started + Duration::from_millis(due_ms),
        None => Instant::now() + IDLE_WAKEUP,
    }
}

/// Handle of a running partition.
pub struct PartitionHandle {
    partition_id: u32,
    inbox: mpsc::UnboundedSender<PartitionMessage>,
    processor_join: Option<JoinHandle<Result<()>>>,
    async_join: Option<JoinHandle<()>>,
}

impl PartitionHandle {
    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    /// Stops both actors and waits for them. Returns the error that halted
    /// the partition, if any.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.inbox.send(PartitionMessage::Shutdown);
        let mut outcome = Ok(());
        if let Some(join) = self.processor_join.take() {
            outcome = join.await.map_err(|err| {
                EngineError::ProcessingError(format!("partition actor join: {}", err))
            })?;
        }
        if let Some(join) = self.async_join.take() {
            let _ = join.await;
        }
        outcome
    }
}

impl Drop for PartitionHandle {
    fn drop(&mut self) {
        if let Some(join) = self.processor_join.take() {
            join.abort();
        }
        if let Some(join) = self.async_join.take() {
            join.abort();
        }
    }
}

/// The deterministic actor of a partition.
pub struct PartitionActor {
    processor: StreamProcessor,
    inbox_tx: mpsc::UnboundedSender<PartitionMessage>,
    inbox: mpsc::UnboundedReceiver<PartitionMessage>,
    async_inbox: mpsc::UnboundedSender<PartitionMessage>,
    timers: TaskTimers,
    started: Instant,
}

impl PartitionActor {
    /// Spawns the processing actor and its async actor.
    ///
    /// `inbox_tx` must be the sender the processor's schedule service was
    /// built with.
    pub fn spawn(
        processor: StreamProcessor,
        inbox_tx: mpsc::UnboundedSender<PartitionMessage>,
        inbox: mpsc::UnboundedReceiver<PartitionMessage>,
        sender: Arc<dyn InterPartitionCommandSender>,
    ) -> PartitionHandle {
        let partition_id = processor.partition_id();
        let (async_tx, async_rx) = mpsc::unbounded_channel();

        let async_actor = AsyncTaskActor {
            partition_id,
            log: processor.log().clone(),
            sender,
            inbox_tx: async_tx.clone(),
            inbox: async_rx,
            timers: TaskTimers::new(),
            started: Instant::now(),
        };
        let async_join = tokio::spawn(async_actor.run());

        let actor = PartitionActor {
            processor,
            inbox_tx: inbox_tx.clone(),
            inbox,
            async_inbox: async_tx,
            timers: TaskTimers::new(),
            started: Instant::now(),
        };
        let processor_join = tokio::spawn(actor.run());

        PartitionHandle {
            partition_id,
            inbox: inbox_tx,
            processor_join: Some(processor_join),
            async_join: Some(async_join),
        }
    }

    async fn run(mut self) -> Result<()> {
        let partition_id = self.processor.partition_id();
        let outcome = self.run_loop().await;
        if let Err(err) = &outcome {
            event!(Level::ERROR, partition = partition_id, error = %err, "partition actor stopped");
        }
        let _ = self.async_inbox.send(PartitionMessage::Shutdown);
        outcome
    }

    async fn run_loop(&mut self) -> Result<()> {
        self.processor.recover()?;
        let mut log_changes = self.processor.log().subscribe();

        loop {
            log_changes.borrow_and_update();
            while self.processor.has_pending_command() {
                self.processor.process_batch()?;
                tokio::task::yield_now().await;
            }

            let next_due = self.timers.next_due_ms();
            tokio::select! {
                message = self.inbox.recv() => match message {
                    None | Some(PartitionMessage::Shutdown) => return Ok(()),
                    Some(message) => self.handle_message(message),
                },
                changed = log_changes.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                _ = sleep_until(deadline(self.started, next_due)), if next_due.is_some() => {
                    self.fire_due_tasks()?;
                }
            }
        }
    }

    fn handle_message(&mut self, message: PartitionMessage) {
        match message {
            PartitionMessage::Schedule(request) => match request.actor {
                TaskActor::Processor => {
                    self.timers
                        .register(elapsed_ms(self.started), request, &self.inbox_tx)
                }
                TaskActor::Async => {
                    let _ = self.async_inbox.send(PartitionMessage::Schedule(request));
                }
            },
            PartitionMessage::Cancel { actor, id } => match actor {
                TaskActor::Processor => {
                    self.timers.cancel(id);
                }
                TaskActor::Async => {
                    let _ = self
                        .async_inbox
                        .send(PartitionMessage::Cancel { actor, id });
                }
            },
            PartitionMessage::Shutdown => {}
        }
    }

    fn fire_due_tasks(&mut self) -> Result<()> {
        let now_ms = elapsed_ms(self.started);
        while let Some(mut due) = self.timers.pop_due(now_ms) {
            self.processor.run_task(due.task.as_mut())?;
            self.timers.reschedule(now_ms, due);
        }
        Ok(())
    }
}

/// Runs async-scheduled tasks of a partition.
struct AsyncTaskActor {
    partition_id: u32,
    log: Arc<dyn LogStorage>,
    sender: Arc<dyn InterPartitionCommandSender>,
    inbox_tx: mpsc::UnboundedSender<PartitionMessage>,
    inbox: mpsc::UnboundedReceiver<PartitionMessage>,
    timers: TaskTimers,
    started: Instant,
}

impl AsyncTaskActor {
    async fn run(mut self) {
        loop {
            let next_due = self.timers.next_due_ms();
            tokio::select! {
                message = self.inbox.recv() => match message {
                    None | Some(PartitionMessage::Shutdown) => break,
                    Some(PartitionMessage::Schedule(request)) => {
                        self.timers.register(elapsed_ms(self.started), request, &self.inbox_tx);
                    }
                    Some(PartitionMessage::Cancel { id, .. }) => {
                        self.timers.cancel(id);
                    }
                },
                _ = sleep_until(deadline(self.started, next_due)), if next_due.is_some() => {
                    self.fire_due_tasks();
                }
            }
        }
    }

    fn fire_due_tasks(&mut self) {
        let now_ms = elapsed_ms(self.started);
        while let Some(mut due) = self.timers.pop_due(now_ms) {
            if let Err(err) = run_async_task(
                self.partition_id,
                self.log.as_ref(),
                self.sender.as_ref(),
                due.task.as_mut(),
            ) {
                event!(Level::ERROR, partition = self.partition_id, error = %err, "async task failed");
            }
            self.timers.reschedule(now_ms, due);
        }
    }
}
