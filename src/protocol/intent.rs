use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of entry stored in a partition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Command,
    Event,
    CommandRejection,
}

/// The entity family a record's value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    User,
    Group,
    Role,
    Tenant,
    Mapping,
    Authorization,
    IdentitySetup,
    UserTask,
    Job,
    Incident,
    CommandDistribution,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::User => "USER",
            ValueType::Group => "GROUP",
            ValueType::Role => "ROLE",
            ValueType::Tenant => "TENANT",
            ValueType::Mapping => "MAPPING",
            ValueType::Authorization => "AUTHORIZATION",
            ValueType::IdentitySetup => "IDENTITY_SETUP",
            ValueType::UserTask => "USER_TASK",
            ValueType::Job => "JOB",
            ValueType::Incident => "INCIDENT",
            ValueType::CommandDistribution => "COMMAND_DISTRIBUTION",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verb of a record. Commands use the imperative form, events the past tense.
///
/// Intents are shared between value types; a processor is always resolved by
/// the `(ValueType, Intent)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    // entity lifecycle
    Create,
    Created,
    Update,
    Updated,
    Delete,
    Deleted,
    AddEntity,
    EntityAdded,
    RemoveEntity,
    EntityRemoved,

    // authorization
    AddPermission,
    PermissionAdded,
    RemovePermission,
    PermissionRemoved,

    // identity setup
    Initialize,
    Initialized,

    // user task
    Creating,
    Assign,
    Claim,
    Assigning,
    Assigned,
    Updating,
    Complete,
    Completing,
    CompleteTaskListener,
    Completed,
    Cancel,
    Canceling,
    Canceled,

    // job
    Fail,
    Failed,
    UpdateRetries,
    RetriesUpdated,

    // incident
    Resolve,
    Resolved,

    // command distribution
    Started,
    Distributing,
    Enqueued,
    Acknowledge,
    Acknowledged,
    Received,
    Finished,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Create => "CREATE",
            Intent::Created => "CREATED",
            Intent::Update => "UPDATE",
            Intent::Updated => "UPDATED",
            Intent::Delete => "DELETE",
            Intent::Deleted => "DELETED",
            Intent::AddEntity => "ADD_ENTITY",
            Intent::EntityAdded => "ENTITY_ADDED",
            Intent::RemoveEntity => "REMOVE_ENTITY",
            Intent::EntityRemoved => "ENTITY_REMOVED",
            Intent::AddPermission => "ADD_PERMISSION",
            Intent::PermissionAdded => "PERMISSION_ADDED",
            Intent::RemovePermission => "REMOVE_PERMISSION",
            Intent::PermissionRemoved => "PERMISSION_REMOVED",
            Intent::Initialize => "INITIALIZE",
            Intent::Initialized => "INITIALIZED",
            Intent::Creating => "CREATING",
            Intent::Assign => "ASSIGN",
            Intent::Claim => "CLAIM",
            Intent::Assigning => "ASSIGNING",
            Intent::Assigned => "ASSIGNED",
            Intent::Updating => "UPDATING",
            Intent::Complete => "COMPLETE",
            Intent::Completing => "COMPLETING",
            Intent::CompleteTaskListener => "COMPLETE_TASK_LISTENER",
            Intent::Completed => "COMPLETED",
            Intent::Cancel => "CANCEL",
            Intent::Canceling => "CANCELING",
            Intent::Canceled => "CANCELED",
            Intent::Fail => "FAIL",
            Intent::Failed => "FAILED",
            Intent::UpdateRetries => "UPDATE_RETRIES",
            Intent::RetriesUpdated => "RETRIES_UPDATED",
            Intent::Resolve => "RESOLVE",
            Intent::Resolved => "RESOLVED",
            Intent::Started => "STARTED",
            Intent::Distributing => "DISTRIBUTING",
            Intent::Enqueued => "ENQUEUED",
            Intent::Acknowledge => "ACKNOWLEDGE",
            Intent::Acknowledged => "ACKNOWLEDGED",
            Intent::Received => "RECEIVED",
            Intent::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
