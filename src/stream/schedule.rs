//! Scheduling of tasks on the processing actor and on the async actor.
//!
//! Scheduling and cancellation are messages to the owning actor's inbox. A
//! processing-actor task sees the partition state and its commands are
//! processed in log order like any other command. An async task runs on a
//! separate actor without state access, so it can never skew replay.

use super::writers::{CommandWriter, ProcessingResultBuilder, SideEffectWriter};
use crate::core::Result;
use crate::protocol::{Intent, Record, RecordValue};
use crate::state::ProcessingState;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub type TaskId = u64;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> TaskId {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Which actor of a partition runs a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskActor {
    Processor,
    Async,
}

/// What a running task may see and produce.
pub struct TaskContext<'a> {
    partition_id: u32,
    state: Option<&'a ProcessingState>,
    result: &'a mut ProcessingResultBuilder,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        partition_id: u32,
        state: Option<&'a ProcessingState>,
        result: &'a mut ProcessingResultBuilder,
    ) -> Self {
        Self {
            partition_id,
            state,
            result,
        }
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    /// Partition state; `None` on the async actor.
    pub fn state(&self) -> Option<&ProcessingState> {
        self.state
    }

    /// Writes a command to the local log.
    pub fn append_command(&mut self, key: i64, intent: Intent, value: impl Into<RecordValue>) {
        CommandWriter::new(self.result).append_follow_up_command(key, intent, value);
    }

    /// Sends a command to another partition once the task result is committed.
    pub fn send_command(&mut self, partition_id: u32, command: Record) {
        SideEffectWriter::new(self.result).send_command(partition_id, command);
    }
}

pub trait Task: Send {
    fn execute(&mut self, context: &mut TaskContext<'_>) -> Result<()>;
}

impl<F> Task for F
where
    F: FnMut(&mut TaskContext<'_>) -> Result<()> + Send,
{
    fn execute(&mut self, context: &mut TaskContext<'_>) -> Result<()> {
        self(context)
    }
}

pub struct ScheduleRequest {
    pub id: TaskId,
    pub actor: TaskActor,
    pub delay: Duration,
    pub fixed_rate: bool,
    pub task: Box<dyn Task>,
    /// Completed with the task handle once the owning actor registered it.
    pub registered: Option<oneshot::Sender<ScheduledTask>>,
}

/// Inbox message of a partition's processing actor and async actor.
pub enum PartitionMessage {
    Schedule(ScheduleRequest),
    Cancel { actor: TaskActor, id: TaskId },
    Shutdown,
}

/// Handle of a scheduled task. Cancelling is best effort: an invocation that
/// already fired is not undone.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    id: TaskId,
    actor: TaskActor,
    inbox: mpsc::UnboundedSender<PartitionMessage>,
}

impl ScheduledTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn cancel(&self) {
        let _ = self.inbox.send(PartitionMessage::Cancel {
            actor: self.actor,
            id: self.id,
        });
    }
}

/// Handle of a task scheduled on the async actor.
///
/// The inner handle only exists once the request travelled through the
/// processing actor to the async actor; `cancel` takes the same route and may
/// lose the race against one invocation that already fired.
#[derive(Clone)]
pub struct AsyncScheduledTask {
    id: TaskId,
    processor_inbox: mpsc::UnboundedSender<PartitionMessage>,
    inner: Shared<BoxFuture<'static, Option<ScheduledTask>>>,
}

impl AsyncScheduledTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn cancel(&self) {
        let _ = self.processor_inbox.send(PartitionMessage::Cancel {
            actor: TaskActor::Async,
            id: self.id,
        });
    }

    /// Resolves to the handle issued by the async actor, `None` if the
    /// request was dropped before registration.
    pub fn scheduled(&self) -> Shared<BoxFuture<'static, Option<ScheduledTask>>> {
        self.inner.clone()
    }
}

/// Entry point for scheduling work on a partition.
#[derive(Clone)]
pub struct ProcessingScheduleService {
    inbox: mpsc::UnboundedSender<PartitionMessage>,
}

impl ProcessingScheduleService {
    pub fn new(inbox: mpsc::UnboundedSender<PartitionMessage>) -> Self {
        Self { inbox }
    }

    pub fn run_delayed(&self, delay: Duration, task: impl Task + 'static) -> ScheduledTask {
        self.schedule_on_processor(delay, false, Box::new(task))
    }

    pub fn run_at_fixed_rate(&self, interval: Duration, task: impl Task + 'static) -> ScheduledTask {
        self.schedule_on_processor(interval, true, Box::new(task))
    }

    pub fn run_delayed_async(&self, delay: Duration, task: impl Task + 'static) -> AsyncScheduledTask {
        self.schedule_async(delay, false, Box::new(task))
    }

    pub fn run_at_fixed_rate_async(
        &self,
        interval: Duration,
        task: impl Task + 'static,
    ) -> AsyncScheduledTask {
        self.schedule_async(interval, true, Box::new(task))
    }

    fn schedule_on_processor(&self, delay: Duration, fixed_rate: bool, task: Box<dyn Task>) -> ScheduledTask {
        let id = next_task_id();
        let _ = self.inbox.send(PartitionMessage::Schedule(ScheduleRequest {
            id,
            actor: TaskActor::Processor,
            delay,
            fixed_rate,
            task,
            registered: None,
        }));
        ScheduledTask {
            id,
            actor: TaskActor::Processor,
            inbox: self.inbox.clone(),
        }
    }

    fn schedule_async(&self, delay: Duration, fixed_rate: bool, task: Box<dyn Task>) -> AsyncScheduledTask {
        let id = next_task_id();
        let (registered_tx, registered_rx) = oneshot::channel();
        let _ = self.inbox.send(PartitionMessage::Schedule(ScheduleRequest {
            id,
            actor: TaskActor::Async,
            delay,
            fixed_rate,
            task,
            registered: Some(registered_tx),
        }));
        AsyncScheduledTask {
            id,
            processor_inbox: self.inbox.clone(),
            inner: registered_rx.map(|handle| handle.ok()).boxed().shared(),
        }
    }
}

/// A task whose deadline passed, taken out of the timer table.
pub struct DueTask {
    pub id: TaskId,
    pub interval_ms: Option<u64>,
    pub task: Box<dyn Task>,
}

struct TimerEntry {
    due_ms: u64,
    interval_ms: Option<u64>,
    task: Box<dyn Task>,
}

/// Timer table of one actor, driven by a millisecond clock.
#[derive(Default)]
pub struct TaskTimers {
    entries: HashMap<TaskId, TimerEntry>,
}

impl TaskTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request; completes its `registered` channel with a handle
    /// pointing at `owner_inbox`.
    pub fn register(
        &mut self,
        now_ms: u64,
        mut request: ScheduleRequest,
        owner_inbox: &mpsc::UnboundedSender<PartitionMessage>,
    ) {
        if let Some(registered) = request.registered.take() {
            let _ = registered.send(ScheduledTask {
                id: request.id,
                actor: request.actor,
                inbox: owner_inbox.clone(),
            });
        }
        let delay_ms = request.delay.as_millis() as u64;
        self.entries.insert(
            request.id,
            TimerEntry {
                due_ms: now_ms + delay_ms,
                interval_ms: request.fixed_rate.then_some(delay_ms.max(1)),
                task: request.task,
            },
        );
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.entries.values().map(|entry| entry.due_ms).min()
    }

    /// Takes the earliest task due at `now_ms`; ties go to the older task.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<DueTask> {
        let id = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.due_ms <= now_ms)
            .min_by_key(|(id, entry)| (entry.due_ms, **id))
            .map(|(id, _)| *id)?;
        let entry = self.entries.remove(&id)?;
        Some(DueTask {
            id,
            interval_ms: entry.interval_ms,
            task: entry.task,
        })
    }

    /// Puts a fixed-rate task back after it ran at `fired_at_ms`.
    pub fn reschedule(&mut self, fired_at_ms: u64, due: DueTask) {
        if let Some(interval_ms) = due.interval_ms {
            self.entries.insert(
                due.id,
                TimerEntry {
                    due_ms: fired_at_ms + interval_ms,
                    interval_ms: Some(interval_ms),
                    task: due.task,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut TaskContext<'_>) -> Result<()> {
        Ok(())
    }

    fn request(delay_ms: u64, fixed_rate: bool) -> ScheduleRequest {
        ScheduleRequest {
            id: next_task_id(),
            actor: TaskActor::Processor,
            delay: Duration::from_millis(delay_ms),
            fixed_rate,
            task: Box::new(noop),
            registered: None,
        }
    }

    #[test]
    fn tasks_fire_in_deadline_order() {
        let (inbox, _rx) = mpsc::unbounded_channel();
        let mut timers = TaskTimers::new();
        let late = request(20, false);
        let early = request(10, false);
        let (late_id, early_id) = (late.id, early.id);
        timers.register(0, late, &inbox);
        timers.register(0, early, &inbox);

        assert!(timers.pop_due(5).is_none());
        assert_eq!(timers.pop_due(25).unwrap().id, early_id);
        assert_eq!(timers.pop_due(25).unwrap().id, late_id);
        assert!(timers.is_empty());
    }

    #[test]
    fn fixed_rate_tasks_are_rescheduled() {
        let (inbox, _rx) = mpsc::unbounded_channel();
        let mut timers = TaskTimers::new();
        timers.register(0, request(10, true), &inbox);

        let due = timers.pop_due(10).unwrap();
        timers.reschedule(10, due);
        assert_eq!(timers.next_due_ms(), Some(20));
    }

    #[test]
    fn cancelled_tasks_never_fire() {
        let (inbox, _rx) = mpsc::unbounded_channel();
        let mut timers = TaskTimers::new();
        let request = request(0, false);
        let id = request.id;
        timers.register(0, request, &inbox);

        assert!(timers.cancel(id));
        assert!(timers.pop_due(100).is_none());
    }

    #[tokio::test]
    async fn async_handle_resolves_after_registration() {
        let (inbox, mut rx) = mpsc::unbounded_channel();
        let service = ProcessingScheduleService::new(inbox.clone());
        let handle = service.run_delayed_async(Duration::ZERO, noop);

        let Some(PartitionMessage::Schedule(request)) = rx.recv().await else {
            panic!("expected a schedule request");
        };
        assert_eq!(request.actor, TaskActor::Async);

        let mut timers = TaskTimers::new();
        timers.register(0, request, &inbox);
        let inner = handle.scheduled().await.unwrap();
        assert_eq!(inner.id(), handle.id());

        handle.cancel();
        let Some(PartitionMessage::Cancel { actor, id }) = rx.recv().await else {
            panic!("expected a cancel request");
        };
        assert_eq!(actor, TaskActor::Async);
        assert_eq!(id, handle.id());
    }
}
