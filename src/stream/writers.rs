use super::response::CommandResponse;
use crate::core::Result;
use crate::protocol::{
    Intent, NO_KEY, Record, RecordType, RecordValue, Rejection, RequestMetadata,
};
use crate::state::{EventAppliers, ProcessingState};

/// Work that runs only after the processing result is in the log.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    SendCommand { partition_id: u32, command: Record },
}

/// Everything produced while processing one command or running one task.
#[derive(Debug, Default)]
pub struct ProcessingResult {
    pub records: Vec<Record>,
    pub response: Option<CommandResponse>,
    pub side_effects: Vec<SideEffect>,
}

/// Buffers the output of a processing step until it is committed.
///
/// Nothing reaches the log, the client or another partition if processing
/// fails before [`ProcessingResultBuilder::build`] is committed.
#[derive(Debug)]
pub struct ProcessingResultBuilder {
    partition_id: u32,
    source_position: i64,
    tenant_id: String,
    result: ProcessingResult,
}

impl ProcessingResultBuilder {
    pub fn for_command(command: &Record) -> Self {
        Self {
            partition_id: command.partition_id,
            source_position: command.position,
            tenant_id: command.tenant_id.clone(),
            result: ProcessingResult::default(),
        }
    }

    pub fn for_task(partition_id: u32) -> Self {
        Self {
            partition_id,
            source_position: NO_KEY,
            tenant_id: crate::protocol::DEFAULT_TENANT_ID.to_string(),
            result: ProcessingResult::default(),
        }
    }

    fn follow_up(&self, record_type: RecordType, key: i64, intent: Intent, value: RecordValue) -> Record {
        let mut record = match record_type {
            RecordType::Command => Record::command(self.partition_id, key, intent, value),
            _ => Record::event(self.partition_id, key, intent, value),
        };
        record.source_record_position = self.source_position;
        record.tenant_id = self.tenant_id.clone();
        record
    }

    fn push(&mut self, record: Record) {
        self.result.records.push(record);
    }

    pub fn records(&self) -> &[Record] {
        &self.result.records
    }

    pub fn response(&self) -> Option<&CommandResponse> {
        self.result.response.as_ref()
    }

    pub fn side_effects(&self) -> &[SideEffect] {
        &self.result.side_effects
    }

    pub fn build(self) -> ProcessingResult {
        self.result
    }
}

/// Appends follow-up events and applies them to the state right away.
pub struct StateWriter<'a> {
    state: &'a mut ProcessingState,
    result: &'a mut ProcessingResultBuilder,
}

impl<'a> StateWriter<'a> {
    pub fn new(state: &'a mut ProcessingState, result: &'a mut ProcessingResultBuilder) -> Self {
        Self { state, result }
    }

    pub fn append_follow_up_event(
        &mut self,
        key: i64,
        intent: Intent,
        value: impl Into<RecordValue>,
    ) -> Result<()> {
        self.append(key, intent, value.into(), None)
    }

    /// Like [`Self::append_follow_up_event`], but keeps the request of the
    /// originating command on the event so a later finalizer can answer it.
    pub fn append_follow_up_event_with_request(
        &mut self,
        key: i64,
        intent: Intent,
        value: impl Into<RecordValue>,
        request: Option<RequestMetadata>,
    ) -> Result<()> {
        self.append(key, intent, value.into(), request)
    }

    fn append(
        &mut self,
        key: i64,
        intent: Intent,
        value: RecordValue,
        request: Option<RequestMetadata>,
    ) -> Result<()> {
        let mut event = self.result.follow_up(RecordType::Event, key, intent, value);
        event.request = request;
        EventAppliers::apply(self.state, &event)?;
        self.result.push(event);
        Ok(())
    }
}

/// Appends follow-up commands, processed later in log order.
pub struct CommandWriter<'a> {
    result: &'a mut ProcessingResultBuilder,
}

impl<'a> CommandWriter<'a> {
    pub fn new(result: &'a mut ProcessingResultBuilder) -> Self {
        Self { result }
    }

    pub fn append_follow_up_command(&mut self, key: i64, intent: Intent, value: impl Into<RecordValue>) {
        let command = self
            .result
            .follow_up(RecordType::Command, key, intent, value.into());
        self.result.push(command);
    }
}

/// Answers the client that sent a command.
pub struct ResponseWriter<'a> {
    result: &'a mut ProcessingResultBuilder,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(result: &'a mut ProcessingResultBuilder) -> Self {
        Self { result }
    }

    /// Responds with an event; skipped when the command expects no response.
    pub fn write_event_on_command(
        &mut self,
        key: i64,
        intent: Intent,
        value: impl Into<RecordValue>,
        command: &Record,
    ) {
        if let Some(request) = command.request {
            self.write_response(key, intent, value, request);
        }
    }

    pub fn write_response(
        &mut self,
        key: i64,
        intent: Intent,
        value: impl Into<RecordValue>,
        request: RequestMetadata,
    ) {
        let value = value.into();
        self.result.result.response = Some(CommandResponse {
            request,
            partition_id: self.result.partition_id,
            key,
            record_type: RecordType::Event,
            value_type: value.value_type(),
            intent,
            value,
            rejection: None,
        });
    }
}

/// Records a refused command in the log and answers its client.
pub struct RejectionWriter<'a> {
    result: &'a mut ProcessingResultBuilder,
}

impl<'a> RejectionWriter<'a> {
    pub fn new(result: &'a mut ProcessingResultBuilder) -> Self {
        Self { result }
    }

    pub fn append_rejection(&mut self, command: &Record, rejection: Rejection) {
        let mut record = command.clone();
        record.record_type = RecordType::CommandRejection;
        record.source_record_position = command.position;
        record.position = NO_KEY;
        record.rejection = Some(rejection.clone());
        self.result.push(record);

        if let Some(request) = command.request {
            self.result.result.response = Some(CommandResponse {
                request,
                partition_id: command.partition_id,
                key: command.key,
                record_type: RecordType::CommandRejection,
                value_type: command.value_type(),
                intent: command.intent,
                value: command.value.clone(),
                rejection: Some(rejection),
            });
        }
    }
}

/// Queues post-commit work.
pub struct SideEffectWriter<'a> {
    result: &'a mut ProcessingResultBuilder,
}

impl<'a> SideEffectWriter<'a> {
    pub fn new(result: &'a mut ProcessingResultBuilder) -> Self {
        Self { result }
    }

    pub fn send_command(&mut self, partition_id: u32, command: Record) {
        self.result
            .result
            .side_effects
            .push(SideEffect::SendCommand { partition_id, command });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GroupRecord, RejectionType};

    fn command() -> Record {
        let mut command = Record::command(1, -1, Intent::Create, GroupRecord::default())
            .with_request(RequestMetadata {
                request_stream_id: 1,
                request_id: 9,
            });
        command.position = 4;
        command
    }

    #[test]
    fn events_are_applied_and_buffered() {
        let mut state = ProcessingState::new(1);
        let command = command();
        let mut result = ProcessingResultBuilder::for_command(&command);

        StateWriter::new(&mut state, &mut result)
            .append_follow_up_event(
                5,
                Intent::Created,
                GroupRecord {
                    group_key: 5,
                    name: "ops".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(state.groups.get(5).is_some());
        assert_eq!(result.records().len(), 1);
        assert_eq!(result.records()[0].source_record_position, 4);
    }

    #[test]
    fn rejection_is_logged_and_answered() {
        let command = command();
        let mut result = ProcessingResultBuilder::for_command(&command);
        RejectionWriter::new(&mut result)
            .append_rejection(&command, Rejection::not_found("missing"));

        let response = result.response().unwrap();
        assert_eq!(response.rejection.as_ref().unwrap().kind, RejectionType::NotFound);
        assert!(result.records()[0].is_rejection());
    }

    #[test]
    fn no_response_without_request_metadata() {
        let mut command = command();
        command.request = None;
        let mut result = ProcessingResultBuilder::for_command(&command);
        ResponseWriter::new(&mut result).write_event_on_command(
            1,
            Intent::Created,
            GroupRecord::default(),
            &command,
        );
        assert!(result.response().is_none());
    }
}
