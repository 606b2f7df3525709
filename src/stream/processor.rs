use super::log::LogStorage;
use super::response::CommandResponseWriter;
use super::schedule::{ProcessingScheduleService, Task, TaskContext};
use super::transport::InterPartitionCommandSender;
use super::writers::{ProcessingResult, ProcessingResultBuilder, SideEffect};
use crate::config::EngineConfig;
use crate::core::{EngineError, Result};
use crate::protocol::Record;
use crate::state::{EventAppliers, ProcessingState};
use std::sync::Arc;
use tracing::{Level, event, info_span};

/// Handles the commands of one partition.
pub trait RecordProcessor: Send + Sync {
    /// Processes one command. Output goes through `result`; an error is fatal
    /// for the partition.
    fn process(
        &self,
        command: &Record,
        state: &mut ProcessingState,
        result: &mut ProcessingResultBuilder,
    ) -> Result<()>;

    /// Called once replay finished, before the first command is processed.
    fn on_recovered(&self, context: &RecoveredContext<'_>);
}

pub struct RecoveredContext<'a> {
    pub partition_id: u32,
    pub schedule: &'a ProcessingScheduleService,
    pub state: &'a ProcessingState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionPhase {
    Initial,
    Replay,
    Processing,
    /// Processing hit a fatal error; no further commands are processed.
    Failed,
}

/// Collaborators of a stream processor.
pub struct StreamProcessorContext {
    pub partition_id: u32,
    pub log: Arc<dyn LogStorage>,
    pub record_processor: Arc<dyn RecordProcessor>,
    pub response_writer: Arc<dyn CommandResponseWriter>,
    pub sender: Arc<dyn InterPartitionCommandSender>,
    pub schedule: ProcessingScheduleService,
    pub config: Arc<EngineConfig>,
}

/// Reads a partition log in order, replays events and processes commands one
/// at a time.
pub struct StreamProcessor {
    partition_id: u32,
    log: Arc<dyn LogStorage>,
    record_processor: Arc<dyn RecordProcessor>,
    response_writer: Arc<dyn CommandResponseWriter>,
    sender: Arc<dyn InterPartitionCommandSender>,
    schedule: ProcessingScheduleService,
    config: Arc<EngineConfig>,
    state: ProcessingState,
    phase: PartitionPhase,
    next_position: i64,
    last_processed_position: i64,
}

impl StreamProcessor {
    pub fn new(context: StreamProcessorContext) -> Self {
        Self {
            partition_id: context.partition_id,
            log: context.log,
            record_processor: context.record_processor,
            response_writer: context.response_writer,
            sender: context.sender,
            schedule: context.schedule,
            config: context.config,
            state: ProcessingState::new(context.partition_id),
            phase: PartitionPhase::Initial,
            next_position: 1,
            last_processed_position: 0,
        }
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn phase(&self) -> PartitionPhase {
        self.phase
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub fn log(&self) -> &Arc<dyn LogStorage> {
        &self.log
    }

    pub fn schedule_service(&self) -> &ProcessingScheduleService {
        &self.schedule
    }

    pub fn last_processed_position(&self) -> i64 {
        self.last_processed_position
    }

    /// Rebuilds the state from the log and resumes after the last command
    /// whose result is in the log.
    pub fn recover(&mut self) -> Result<()> {
        let span = info_span!("partition.recover", partition = self.partition_id);
        let _guard = span.enter();

        self.phase = PartitionPhase::Replay;
        self.state = ProcessingState::new(self.partition_id);
        self.last_processed_position = 0;
        let last_position = self.log.last_position();
        let mut replayed = 0usize;

        for position in 1..=last_position {
            let Some(record) = self.log.read(position)? else {
                break;
            };
            if record.is_command() {
                continue;
            }
            if record.is_event() {
                if let Err(err) = EventAppliers::apply(&mut self.state, &record) {
                    self.phase = PartitionPhase::Failed;
                    event!(Level::ERROR, error = %err, position, "replay failed");
                    return Err(err);
                }
                replayed += 1;
            }
            self.last_processed_position = self
                .last_processed_position
                .max(record.source_record_position);
        }

        self.next_position = self.last_processed_position + 1;
        self.phase = PartitionPhase::Processing;
        event!(
            Level::INFO,
            replayed,
            last_processed_position = self.last_processed_position,
            "partition recovered"
        );

        self.record_processor.on_recovered(&RecoveredContext {
            partition_id: self.partition_id,
            schedule: &self.schedule,
            state: &self.state,
        });
        Ok(())
    }

    pub fn has_pending_command(&self) -> bool {
        self.phase == PartitionPhase::Processing && self.next_position <= self.log.last_position()
    }

    /// Processes the next command in the log. Returns false when the log holds
    /// no unprocessed command.
    pub fn process_next(&mut self) -> Result<bool> {
        loop {
            self.ensure_processing()?;
            let Some(record) = self.log.read(self.next_position)? else {
                return Ok(false);
            };
            self.next_position += 1;

            if !record.is_command() {
                continue;
            }
            if self.config.processing.skip_positions.contains(&record.position) {
                event!(
                    Level::WARN,
                    partition = self.partition_id,
                    position = record.position,
                    "skipping command at configured position"
                );
                continue;
            }

            self.process_command(record)?;
            return Ok(true);
        }
    }

    /// Processes up to `processing.max_commands_in_batch` commands.
    pub fn process_batch(&mut self) -> Result<usize> {
        let mut processed = 0;
        while processed < self.config.processing.max_commands_in_batch {
            if !self.process_next()? {
                break;
            }
            processed += 1;
        }
        Ok(processed)
    }

    fn process_command(&mut self, command: Record) -> Result<()> {
        let span = info_span!(
            "partition.process",
            partition = self.partition_id,
            position = command.position,
            value_type = %command.value_type(),
            intent = %command.intent
        );
        let _guard = span.enter();

        let mut result = ProcessingResultBuilder::for_command(&command);
        if let Err(err) = self
            .record_processor
            .process(&command, &mut self.state, &mut result)
        {
            return Err(self.fail(err));
        }

        self.commit(result.build())?;
        self.last_processed_position = command.position;
        event!(Level::DEBUG, "command processed");
        Ok(())
    }

    /// Runs a processing-actor task against the current state.
    pub fn run_task(&mut self, task: &mut dyn Task) -> Result<()> {
        if self.phase != PartitionPhase::Processing {
            return Ok(());
        }
        let mut result = ProcessingResultBuilder::for_task(self.partition_id);
        {
            let mut context = TaskContext::new(self.partition_id, Some(&self.state), &mut result);
            if let Err(err) = task.execute(&mut context) {
                event!(Level::ERROR, partition = self.partition_id, error = %err, "scheduled task failed");
                return Ok(());
            }
        }
        self.commit(result.build())
    }

    fn commit(&mut self, result: ProcessingResult) -> Result<()> {
        let ProcessingResult {
            records,
            response,
            side_effects,
        } = result;

        if !records.is_empty() {
            if let Err(err) = self.log.append(records) {
                return Err(self.fail(err));
            }
        }
        if let Some(response) = response {
            self.response_writer.send(response);
        }
        for side_effect in side_effects {
            match side_effect {
                SideEffect::SendCommand {
                    partition_id,
                    command,
                } => self.sender.send_command(partition_id, command),
            }
        }
        Ok(())
    }

    fn ensure_processing(&self) -> Result<()> {
        match self.phase {
            PartitionPhase::Processing => Ok(()),
            PartitionPhase::Failed => Err(EngineError::PartitionFailed(self.partition_id)),
            phase => Err(EngineError::ProcessingError(format!(
                "partition {} is not ready to process commands (phase {:?})",
                self.partition_id, phase
            ))),
        }
    }

    fn fail(&mut self, err: EngineError) -> EngineError {
        self.phase = PartitionPhase::Failed;
        event!(
            Level::ERROR,
            partition = self.partition_id,
            error = %err,
            "command processing failed; partition halted"
        );
        err
    }
}

/// Runs a task on the async actor: no state access, commands go straight to
/// the log.
pub fn run_async_task(
    partition_id: u32,
    log: &dyn LogStorage,
    sender: &dyn InterPartitionCommandSender,
    task: &mut dyn Task,
) -> Result<()> {
    let mut result = ProcessingResultBuilder::for_task(partition_id);
    {
        let mut context = TaskContext::new(partition_id, None, &mut result);
        task.execute(&mut context)?;
    }
    let ProcessingResult {
        records,
        side_effects,
        ..
    } = result.build();
    if !records.is_empty() {
        log.append(records)?;
    }
    for side_effect in side_effects {
        match side_effect {
            SideEffect::SendCommand {
                partition_id,
                command,
            } => sender.send_command(partition_id, command),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GroupRecord, Intent, NO_KEY};
    use crate::stream::{
        InMemoryCommandSender, InMemoryLogStorage, RecordingResponseWriter, StateWriter,
    };
    use tokio::sync::mpsc;

    /// Writes one `CREATED` event per command and fails on `DELETE`.
    struct CreatingProcessor;

    impl RecordProcessor for CreatingProcessor {
        fn process(
            &self,
            command: &Record,
            state: &mut ProcessingState,
            result: &mut ProcessingResultBuilder,
        ) -> Result<()> {
            if command.intent == Intent::Delete {
                return Err(EngineError::ProcessingError("boom".to_string()));
            }
            let key = state.key_generator.next_key();
            let group = GroupRecord {
                group_key: key,
                ..command.value.as_group().cloned().unwrap_or_default()
            };
            StateWriter::new(state, result).append_follow_up_event(key, Intent::Created, group)
        }

        fn on_recovered(&self, _context: &RecoveredContext<'_>) {}
    }

    fn processor(log: Arc<InMemoryLogStorage>) -> StreamProcessor {
        let (inbox, _) = mpsc::unbounded_channel();
        StreamProcessor::new(StreamProcessorContext {
            partition_id: 1,
            log,
            record_processor: Arc::new(CreatingProcessor),
            response_writer: Arc::new(RecordingResponseWriter::new()),
            sender: Arc::new(InMemoryCommandSender::new()),
            schedule: ProcessingScheduleService::new(inbox),
            config: Arc::new(EngineConfig::default()),
        })
    }

    fn group_command(intent: Intent, name: &str) -> Record {
        Record::command(
            1,
            NO_KEY,
            intent,
            GroupRecord {
                name: name.to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn replay_resumes_after_last_processed_command() {
        let log = Arc::new(InMemoryLogStorage::new());
        log.append(vec![group_command(Intent::Create, "a"), group_command(Intent::Create, "b")])
            .unwrap();
        let mut first = processor(log.clone());
        first.recover().unwrap();
        assert_eq!(first.process_batch().unwrap(), 2);

        log.append(vec![group_command(Intent::Create, "c")]).unwrap();
        let mut second = processor(log.clone());
        second.recover().unwrap();

        assert_eq!(second.last_processed_position(), 2);
        assert_eq!(second.state().groups.len(), 2);
        assert_eq!(second.process_batch().unwrap(), 1);
        assert_eq!(second.state().groups.len(), 3);
        assert_eq!(log.records().unwrap().len(), 6);
    }

    #[test]
    fn processing_error_halts_the_partition() {
        let log = Arc::new(InMemoryLogStorage::new());
        log.append(vec![
            group_command(Intent::Delete, "a"),
            group_command(Intent::Create, "b"),
        ])
        .unwrap();
        let mut processor = processor(log.clone());
        processor.recover().unwrap();

        assert!(matches!(processor.process_next(), Err(EngineError::ProcessingError(_))));
        assert_eq!(processor.phase(), PartitionPhase::Failed);
        assert!(matches!(processor.process_next(), Err(EngineError::PartitionFailed(1))));
        assert!(!processor.has_pending_command());
        assert_eq!(log.records().unwrap().len(), 2);
    }
}
