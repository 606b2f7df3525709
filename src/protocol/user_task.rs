use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

pub type Variables = BTreeMap<String, JsonValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Creating,
    Created,
    Assigning,
    Updating,
    Completing,
    Canceling,
    Completed,
    Canceled,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Creating => "CREATING",
            LifecycleState::Created => "CREATED",
            LifecycleState::Assigning => "ASSIGNING",
            LifecycleState::Updating => "UPDATING",
            LifecycleState::Completing => "COMPLETING",
            LifecycleState::Canceling => "CANCELING",
            LifecycleState::Completed => "COMPLETED",
            LifecycleState::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Completed | LifecycleState::Canceled)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lifecycle transition a task listener chain is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskListenerEventType {
    Assigning,
    Updating,
    Completing,
    Canceling,
}

/// Which finalizer closes the pending transition once all listeners are done.
///
/// Claim and assign both lead to `ASSIGNING`; the tag keeps them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserTaskFinalizer {
    Claim,
    Assign,
    Update,
    Complete,
    Cancel,
}

impl UserTaskFinalizer {
    pub fn listener_event_type(&self) -> TaskListenerEventType {
        match self {
            UserTaskFinalizer::Claim | UserTaskFinalizer::Assign => TaskListenerEventType::Assigning,
            UserTaskFinalizer::Update => TaskListenerEventType::Updating,
            UserTaskFinalizer::Complete => TaskListenerEventType::Completing,
            UserTaskFinalizer::Cancel => TaskListenerEventType::Canceling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskListener {
    pub event_type: TaskListenerEventType,
    pub job_type: String,
    pub retries: i32,
}

impl TaskListener {
    pub fn new(event_type: TaskListenerEventType, job_type: impl Into<String>, retries: i32) -> Self {
        Self {
            event_type,
            job_type: job_type.into(),
            retries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserTaskRecord {
    pub user_task_key: i64,
    pub assignee: String,
    pub candidate_groups: Vec<String>,
    pub candidate_users: Vec<String>,
    pub due_date: String,
    pub follow_up_date: String,
    pub priority: i32,
    pub bpmn_process_id: String,
    pub element_id: String,
    pub process_instance_key: i64,
    pub tenant_id: String,
    pub action: String,
    pub changed_attributes: Vec<String>,
    pub variables: Variables,
    pub task_listeners: Vec<TaskListener>,
    pub pending_finalizer: Option<UserTaskFinalizer>,
}

impl UserTaskRecord {
    pub fn listeners_for(&self, event_type: TaskListenerEventType) -> impl Iterator<Item = &TaskListener> {
        self.task_listeners
            .iter()
            .filter(move |listener| listener.event_type == event_type)
    }
}
