use crate::protocol::{Intent, RecordType, RecordValue, Rejection, RequestMetadata, ValueType};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Answer to a client request, sent at most once per command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub request: RequestMetadata,
    pub partition_id: u32,
    pub key: i64,
    pub record_type: RecordType,
    pub value_type: ValueType,
    pub intent: Intent,
    pub value: RecordValue,
    pub rejection: Option<Rejection>,
}

impl CommandResponse {
    pub fn is_rejection(&self) -> bool {
        self.record_type == RecordType::CommandRejection
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection.as_ref().map(|rejection| rejection.reason.as_str())
    }
}

/// Outbound port towards the gateway that issued a command.
pub trait CommandResponseWriter: Send + Sync {
    fn send(&self, response: CommandResponse);
}

impl CommandResponseWriter for mpsc::UnboundedSender<CommandResponse> {
    fn send(&self, response: CommandResponse) {
        if mpsc::UnboundedSender::send(self, response).is_err() {
            tracing::debug!("response receiver dropped; discarding response");
        }
    }
}

/// Keeps every response in memory.
#[derive(Default)]
pub struct RecordingResponseWriter {
    responses: Mutex<Vec<CommandResponse>>,
}

impl RecordingResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> Vec<CommandResponse> {
        self.responses
            .lock()
            .map(|responses| responses.clone())
            .unwrap_or_default()
    }

    pub fn responses_for(&self, request: RequestMetadata) -> Vec<CommandResponse> {
        self.responses()
            .into_iter()
            .filter(|response| response.request == request)
            .collect()
    }
}

impl CommandResponseWriter for RecordingResponseWriter {
    fn send(&self, response: CommandResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push(response);
        }
    }
}
