//! Runs every partition of a cluster inside one process.
//!
//! [`InMemoryCluster`] drives the partitions synchronously on a virtual clock
//! so that timing-dependent behaviour (redistribution, scheduled tasks) is
//! deterministic. [`ActorCluster`] runs each partition on its own tokio
//! actors and is what the binary uses.

use crate::config::EngineConfig;
use crate::core::{EngineError, Result};
use crate::engine::Engine;
use crate::protocol::{Record, RequestMetadata};
use crate::state::ProcessingState;
use crate::stream::{
    CommandResponse, CommandResponseWriter, InMemoryCommandSender, InMemoryLogStorage,
    InterPartitionCommandSender, LogStorage, PartitionActor, PartitionHandle, PartitionMessage,
    PartitionPhase, ProcessingScheduleService, RecordingResponseWriter, StreamProcessor,
    StreamProcessorContext, TaskActor, TaskTimers, run_async_task,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, event};

const REQUEST_STREAM_ID: i32 = 1;

fn build_processor(
    partition_id: u32,
    partition_count: u32,
    log: Arc<InMemoryLogStorage>,
    config: Arc<EngineConfig>,
    sender: Arc<dyn InterPartitionCommandSender>,
    response_writer: Arc<dyn CommandResponseWriter>,
    inbox: mpsc::UnboundedSender<PartitionMessage>,
) -> StreamProcessor {
    StreamProcessor::new(StreamProcessorContext {
        partition_id,
        log,
        record_processor: Arc::new(Engine::new(partition_id, partition_count, config.clone())),
        response_writer,
        sender,
        schedule: ProcessingScheduleService::new(inbox),
        config,
    })
}

/// One partition driven by [`InMemoryCluster`]: the stream processor plus
/// the timer tables of its processing and async actors.
struct PartitionSlot {
    log: Arc<InMemoryLogStorage>,
    sender: Arc<InMemoryCommandSender>,
    processor: StreamProcessor,
    inbox_tx: mpsc::UnboundedSender<PartitionMessage>,
    inbox: mpsc::UnboundedReceiver<PartitionMessage>,
    timers: TaskTimers,
    async_inbox_tx: mpsc::UnboundedSender<PartitionMessage>,
    async_inbox: mpsc::UnboundedReceiver<PartitionMessage>,
    async_timers: TaskTimers,
}

impl PartitionSlot {
    fn start(
        partition_id: u32,
        partition_count: u32,
        log: Arc<InMemoryLogStorage>,
        config: Arc<EngineConfig>,
        sender: Arc<InMemoryCommandSender>,
        responses: Arc<RecordingResponseWriter>,
    ) -> Result<Self> {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (async_inbox_tx, async_inbox) = mpsc::unbounded_channel();
        let mut processor = build_processor(
            partition_id,
            partition_count,
            log.clone(),
            config,
            sender.clone(),
            responses,
            inbox_tx.clone(),
        );
        processor.recover()?;

        Ok(Self {
            log,
            sender,
            processor,
            inbox_tx,
            inbox,
            timers: TaskTimers::new(),
            async_inbox_tx,
            async_inbox,
            async_timers: TaskTimers::new(),
        })
    }

    fn partition_id(&self) -> u32 {
        self.processor.partition_id()
    }

    fn next_due_ms(&self) -> Option<u64> {
        match (self.timers.next_due_ms(), self.async_timers.next_due_ms()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Registers pending schedule and cancel requests at `now_ms`.
    fn drain_inboxes(&mut self, now_ms: u64) -> bool {
        let mut handled = false;
        while let Ok(message) = self.inbox.try_recv() {
            handled = true;
            match message {
                PartitionMessage::Schedule(request) => match request.actor {
                    TaskActor::Processor => self.timers.register(now_ms, request, &self.inbox_tx),
                    TaskActor::Async => {
                        let _ = self.async_inbox_tx.send(PartitionMessage::Schedule(request));
                    }
                },
                PartitionMessage::Cancel { actor, id } => match actor {
                    TaskActor::Processor => {
                        self.timers.cancel(id);
                    }
                    TaskActor::Async => {
                        let _ = self
                            .async_inbox_tx
                            .send(PartitionMessage::Cancel { actor, id });
                    }
                },
                PartitionMessage::Shutdown => {}
            }
        }
        while let Ok(message) = self.async_inbox.try_recv() {
            handled = true;
            match message {
                PartitionMessage::Schedule(request) => {
                    self.async_timers
                        .register(now_ms, request, &self.async_inbox_tx)
                }
                PartitionMessage::Cancel { id, .. } => {
                    self.async_timers.cancel(id);
                }
                PartitionMessage::Shutdown => {}
            }
        }
        handled
    }

    fn fire_due_tasks(&mut self, now_ms: u64) -> Result<bool> {
        let mut fired = false;
        while let Some(mut due) = self.timers.pop_due(now_ms) {
            fired = true;
            self.processor.run_task(due.task.as_mut())?;
            self.timers.reschedule(now_ms, due);
        }
        while let Some(mut due) = self.async_timers.pop_due(now_ms) {
            fired = true;
            if let Err(err) = run_async_task(
                self.partition_id(),
                &*self.log,
                &*self.sender,
                due.task.as_mut(),
            ) {
                event!(Level::ERROR, partition = self.partition_id(), error = %err, "async task failed");
            }
            self.async_timers.reschedule(now_ms, due);
        }
        Ok(fired)
    }

    fn process_pending(&mut self) -> Result<bool> {
        let mut processed = false;
        while self.processor.has_pending_command() {
            if self.processor.process_batch()? == 0 {
                break;
            }
            processed = true;
        }
        Ok(processed)
    }
}

/// Deterministic single-threaded cluster on a virtual clock.
pub struct InMemoryCluster {
    partition_count: u32,
    config: Arc<EngineConfig>,
    sender: Arc<InMemoryCommandSender>,
    responses: Arc<RecordingResponseWriter>,
    partitions: BTreeMap<u32, PartitionSlot>,
    now_ms: u64,
    next_request_id: i64,
}

impl InMemoryCluster {
    /// Starts partitions `1..=partition_count` and runs them until idle.
    pub fn new(partition_count: u32, config: EngineConfig) -> Result<Self> {
        if partition_count == 0 {
            return Err(EngineError::ConfigError(
                "a cluster needs at least one partition".to_string(),
            ));
        }
        config.validate()?;

        let config = Arc::new(config);
        let sender = Arc::new(InMemoryCommandSender::new());
        let responses = Arc::new(RecordingResponseWriter::new());
        let mut partitions = BTreeMap::new();
        for partition_id in 1..=partition_count {
            let log = Arc::new(InMemoryLogStorage::new());
            sender.register_partition(partition_id, log.clone());
            let slot = PartitionSlot::start(
                partition_id,
                partition_count,
                log,
                config.clone(),
                sender.clone(),
                responses.clone(),
            )?;
            partitions.insert(partition_id, slot);
        }

        let mut cluster = Self {
            partition_count,
            config,
            sender,
            responses,
            partitions,
            now_ms: 0,
            next_request_id: 0,
        };
        cluster.pump()?;
        Ok(cluster)
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Virtual time elapsed since the cluster started.
    pub fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms)
    }

    fn slot(&self, partition_id: u32) -> Result<&PartitionSlot> {
        self.partitions
            .get(&partition_id)
            .ok_or(EngineError::UnknownPartition(partition_id))
    }

    /// Appends a command to the partition's log without processing it.
    pub fn write_command(&self, partition_id: u32, mut command: Record) -> Result<i64> {
        let slot = self.slot(partition_id)?;
        command.partition_id = partition_id;
        slot.log.append(vec![command])
    }

    /// Writes a client command and runs the cluster until idle. The response
    /// may still be outstanding, e.g. while task listeners run.
    pub fn submit(&mut self, partition_id: u32, mut command: Record) -> Result<RequestMetadata> {
        self.next_request_id += 1;
        let request = RequestMetadata {
            request_stream_id: REQUEST_STREAM_ID,
            request_id: self.next_request_id,
        };
        command.request = Some(request);
        self.write_command(partition_id, command)?;
        self.pump()?;
        Ok(request)
    }

    /// Submits a client command and returns the response to it.
    pub fn execute(&mut self, partition_id: u32, command: Record) -> Result<CommandResponse> {
        let request = self.submit(partition_id, command)?;
        self.response_to(request).ok_or_else(|| {
            EngineError::ProcessingError(format!(
                "no response for request {} on partition {}",
                request.request_id, partition_id
            ))
        })
    }

    pub fn response_to(&self, request: RequestMetadata) -> Option<CommandResponse> {
        self.responses.responses_for(request).pop()
    }

    /// Runs every partition until no command, message or due task is left.
    pub fn pump(&mut self) -> Result<()> {
        loop {
            let mut progressed = false;
            for slot in self.partitions.values_mut() {
                progressed |= slot.drain_inboxes(self.now_ms);
                progressed |= slot.fire_due_tasks(self.now_ms)?;
                progressed |= slot.process_pending()?;
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    /// Moves the virtual clock forward, firing due tasks in deadline order.
    pub fn advance_time(&mut self, duration: Duration) -> Result<()> {
        let target_ms = self.now_ms + duration.as_millis() as u64;
        self.pump()?;
        loop {
            let next_due = self
                .partitions
                .values()
                .filter_map(PartitionSlot::next_due_ms)
                .min();
            match next_due {
                Some(due_ms) if due_ms <= target_ms => {
                    self.now_ms = self.now_ms.max(due_ms);
                    self.pump()?;
                }
                _ => break,
            }
        }
        self.now_ms = target_ms;
        self.pump()
    }

    pub fn records(&self, partition_id: u32) -> Result<Vec<Record>> {
        self.slot(partition_id)?.log.records()
    }

    pub fn state(&self, partition_id: u32) -> Result<&ProcessingState> {
        Ok(self.slot(partition_id)?.processor.state())
    }

    pub fn phase(&self, partition_id: u32) -> Result<PartitionPhase> {
        Ok(self.slot(partition_id)?.processor.phase())
    }

    pub fn responses(&self) -> Vec<CommandResponse> {
        self.responses.responses()
    }

    /// Drops the partition's processor and scheduled tasks, then rebuilds
    /// its state from the log.
    pub fn restart_partition(&mut self, partition_id: u32) -> Result<()> {
        let log = self.slot(partition_id)?.log.clone();
        let slot = PartitionSlot::start(
            partition_id,
            self.partition_count,
            log,
            self.config.clone(),
            self.sender.clone(),
            self.responses.clone(),
        )?;
        self.partitions.insert(partition_id, slot);
        event!(Level::INFO, partition = partition_id, "partition restarted");
        self.pump()
    }

    /// Commands sent to the partition are lost until it is reconnected.
    pub fn disconnect(&self, partition_id: u32) {
        self.sender.disconnect(partition_id);
    }

    pub fn reconnect(&self, partition_id: u32) {
        self.sender.reconnect(partition_id);
    }
}

/// Cluster whose partitions run on tokio actors.
pub struct ActorCluster {
    logs: BTreeMap<u32, Arc<InMemoryLogStorage>>,
    handles: Vec<PartitionHandle>,
    next_request_id: AtomicI64,
}

impl ActorCluster {
    /// Spawns the actors of every partition; must be called inside a tokio
    /// runtime.
    pub fn start(
        partition_count: u32,
        config: Arc<EngineConfig>,
        response_writer: Arc<dyn CommandResponseWriter>,
    ) -> Result<Self> {
        if partition_count == 0 {
            return Err(EngineError::ConfigError(
                "a cluster needs at least one partition".to_string(),
            ));
        }
        config.validate()?;

        let sender = Arc::new(InMemoryCommandSender::new());
        let logs: BTreeMap<u32, Arc<InMemoryLogStorage>> = (1..=partition_count)
            .map(|partition_id| (partition_id, Arc::new(InMemoryLogStorage::new())))
            .collect();
        for (partition_id, log) in &logs {
            sender.register_partition(*partition_id, log.clone());
        }

        let handles = logs
            .iter()
            .map(|(partition_id, log)| {
                let (inbox_tx, inbox) = mpsc::unbounded_channel();
                let processor = build_processor(
                    *partition_id,
                    partition_count,
                    log.clone(),
                    config.clone(),
                    sender.clone(),
                    response_writer.clone(),
                    inbox_tx.clone(),
                );
                PartitionActor::spawn(processor, inbox_tx, inbox, sender.clone())
            })
            .collect();

        event!(Level::INFO, partitions = partition_count, "cluster started");
        Ok(Self {
            logs,
            handles,
            next_request_id: AtomicI64::new(0),
        })
    }

    /// Writes a client command and returns the request its response will
    /// carry.
    pub fn submit(&self, partition_id: u32, mut command: Record) -> Result<RequestMetadata> {
        let log = self
            .logs
            .get(&partition_id)
            .ok_or(EngineError::UnknownPartition(partition_id))?;
        let request = RequestMetadata {
            request_stream_id: REQUEST_STREAM_ID,
            request_id: self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1,
        };
        command.partition_id = partition_id;
        command.request = Some(request);
        log.append(vec![command])?;
        Ok(request)
    }

    pub fn records(&self, partition_id: u32) -> Result<Vec<Record>> {
        self.logs
            .get(&partition_id)
            .ok_or(EngineError::UnknownPartition(partition_id))?
            .records()
    }

    /// Stops every partition; returns the first error that halted one.
    pub async fn shutdown(mut self) -> Result<()> {
        let mut outcome = Ok(());
        for handle in self.handles.drain(..) {
            let partition_id = handle.partition_id();
            if let Err(err) = handle.shutdown().await {
                event!(Level::ERROR, partition = partition_id, error = %err, "partition stopped with error");
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GroupRecord, Intent};

    fn config() -> EngineConfig {
        EngineConfig::default()
            .with_identity_setup(false)
            .with_password_hash_cost(4)
    }

    #[test]
    fn unknown_partition_is_an_error() {
        let cluster = InMemoryCluster::new(2, config()).unwrap();
        let command = Record::command(3, -1, Intent::Create, GroupRecord::default());
        assert!(matches!(
            cluster.write_command(3, command),
            Err(EngineError::UnknownPartition(3))
        ));
    }

    #[test]
    fn virtual_clock_only_moves_on_request() {
        let mut cluster = InMemoryCluster::new(1, config()).unwrap();
        assert_eq!(cluster.now(), Duration::ZERO);
        cluster.advance_time(Duration::from_secs(25)).unwrap();
        assert_eq!(cluster.now(), Duration::from_secs(25));
    }
}
