use super::user_task::{TaskListenerEventType, Variables};
use serde::{Deserialize, Serialize};

pub const NO_RETRIES_LEFT_MESSAGE: &str = "No more retries left.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    #[default]
    BpmnElement,
    TaskListener,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_type: String,
    pub kind: JobKind,
    pub listener_event_type: Option<TaskListenerEventType>,
    pub retries: i32,
    pub error_message: String,
    pub user_task_key: i64,
    pub element_id: String,
    pub bpmn_process_id: String,
    pub process_instance_key: i64,
    pub tenant_id: String,
    pub variables: Variables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    #[default]
    Unknown,
    JobNoRetries,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub error_type: ErrorType,
    pub error_message: String,
    pub job_key: i64,
    pub user_task_key: i64,
    pub element_id: String,
    pub bpmn_process_id: String,
    pub tenant_id: String,
}
