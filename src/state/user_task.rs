use crate::protocol::{
    LifecycleState, RequestMetadata, UserTaskFinalizer, UserTaskRecord, Variables,
};
use std::collections::BTreeMap;

/// A lifecycle transition waiting for its task listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransition {
    pub finalizer: UserTaskFinalizer,
    /// The task as it will look once the transition is finalized.
    pub record: UserTaskRecord,
    /// Request of the command that started the transition.
    pub request: Option<RequestMetadata>,
    pub next_listener: usize,
    /// Variables produced by completed listeners; only visible to later listeners.
    pub listener_variables: Variables,
    pub active_job_key: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserTaskEntry {
    pub record: UserTaskRecord,
    pub lifecycle: LifecycleState,
    pub pending: Option<PendingTransition>,
}

#[derive(Debug, Clone, Default)]
pub struct UserTaskState {
    tasks: BTreeMap<i64, UserTaskEntry>,
}

impl UserTaskState {
    pub fn get(&self, user_task_key: i64) -> Option<&UserTaskEntry> {
        self.tasks.get(&user_task_key)
    }

    pub(crate) fn get_mut(&mut self, user_task_key: i64) -> Option<&mut UserTaskEntry> {
        self.tasks.get_mut(&user_task_key)
    }

    pub fn lifecycle(&self, user_task_key: i64) -> Option<LifecycleState> {
        self.tasks.get(&user_task_key).map(|entry| entry.lifecycle)
    }

    pub(crate) fn insert(&mut self, user_task_key: i64, record: UserTaskRecord, lifecycle: LifecycleState) {
        self.tasks.insert(
            user_task_key,
            UserTaskEntry {
                record,
                lifecycle,
                pending: None,
            },
        );
    }

    pub(crate) fn remove(&mut self, user_task_key: i64) -> Option<UserTaskEntry> {
        self.tasks.remove(&user_task_key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
