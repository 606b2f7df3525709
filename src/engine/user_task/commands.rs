use super::preconditions::UserTaskCommandPreconditionChecker;
use crate::core::Result;
use crate::engine::context::ProcessingContext;
use crate::protocol::{
    Intent, LifecycleState, Record, Rejection, UserTaskFinalizer, UserTaskRecord,
};
use crate::state::PendingTransition;

pub const ATTRIBUTE_ASSIGNEE: &str = "assignee";
pub const ATTRIBUTE_CANDIDATE_GROUPS: &str = "candidateGroupsList";
pub const ATTRIBUTE_CANDIDATE_USERS: &str = "candidateUsersList";
pub const ATTRIBUTE_DUE_DATE: &str = "dueDate";
pub const ATTRIBUTE_FOLLOW_UP_DATE: &str = "followUpDate";
pub const ATTRIBUTE_PRIORITY: &str = "priority";

const CREATED_ONLY: &[LifecycleState] = &[LifecycleState::Created];
const CANCELABLE: &[LifecycleState] = &[
    LifecycleState::Creating,
    LifecycleState::Created,
    LifecycleState::Assigning,
    LifecycleState::Updating,
    LifecycleState::Completing,
];

/// One user task command: its checks, the intermediate event it writes and
/// the final event written once every listener completed.
pub trait UserTaskCommandProcessor: Send + Sync {
    fn check(&self, command: &Record, ctx: &ProcessingContext<'_>) -> std::result::Result<UserTaskRecord, Rejection>;

    fn on_command(
        &self,
        command: &Record,
        persisted: UserTaskRecord,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<()>;

    fn on_finalize(
        &self,
        user_task_key: i64,
        pending: &PendingTransition,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<()>;
}

fn command_value(command: &Record) -> UserTaskRecord {
    command.value.as_user_task().cloned().unwrap_or_default()
}

fn action_or(command: &UserTaskRecord, default: &str) -> String {
    if command.action.is_empty() {
        default.to_string()
    } else {
        command.action.clone()
    }
}

fn start_transition(
    ctx: &mut ProcessingContext<'_>,
    command: &Record,
    intent: Intent,
    record: UserTaskRecord,
) -> Result<()> {
    ctx.state_writer()
        .append_follow_up_event_with_request(command.key, intent, record, command.request)
}

/// Writes the final event and answers the command that started the transition.
fn finalize(
    ctx: &mut ProcessingContext<'_>,
    user_task_key: i64,
    intent: Intent,
    pending: &PendingTransition,
) -> Result<()> {
    let mut record = pending.record.clone();
    record.pending_finalizer = None;
    ctx.state_writer()
        .append_follow_up_event(user_task_key, intent, record.clone())?;
    if let Some(request) = pending.request {
        ctx.response_writer()
            .write_response(user_task_key, intent, record, request);
    }
    Ok(())
}

fn check_claim(command: &Record, persisted: &UserTaskRecord) -> std::result::Result<(), Rejection> {
    let assignee = command
        .value
        .as_user_task()
        .map(|task| task.assignee.as_str())
        .unwrap_or_default();
    if assignee.is_empty() {
        return Err(Rejection::invalid_state(format!(
            "Expected to claim user task with key '{}', but provided assignee is empty",
            command.key
        )));
    }
    if !persisted.assignee.is_empty() && persisted.assignee != assignee {
        return Err(Rejection::invalid_state(format!(
            "Expected to claim user task with key '{}', but it has already been assigned",
            command.key
        )));
    }
    Ok(())
}

pub struct ClaimProcessor {
    checker: UserTaskCommandPreconditionChecker,
}

impl Default for ClaimProcessor {
    fn default() -> Self {
        Self {
            checker: UserTaskCommandPreconditionChecker::new("claim", CREATED_ONLY)
                .with_additional_check(check_claim),
        }
    }
}

impl UserTaskCommandProcessor for ClaimProcessor {
    fn check(&self, command: &Record, ctx: &ProcessingContext<'_>) -> std::result::Result<UserTaskRecord, Rejection> {
        self.checker.check(command, ctx)
    }

    fn on_command(&self, command: &Record, persisted: UserTaskRecord, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let requested = command_value(command);
        let record = UserTaskRecord {
            assignee: requested.assignee.clone(),
            action: action_or(&requested, "claim"),
            changed_attributes: vec![ATTRIBUTE_ASSIGNEE.to_string()],
            pending_finalizer: Some(UserTaskFinalizer::Claim),
            ..persisted
        };
        start_transition(ctx, command, Intent::Assigning, record)
    }

    fn on_finalize(&self, user_task_key: i64, pending: &PendingTransition, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        finalize(ctx, user_task_key, Intent::Assigned, pending)
    }
}

pub struct AssignProcessor {
    checker: UserTaskCommandPreconditionChecker,
}

impl Default for AssignProcessor {
    fn default() -> Self {
        Self {
            checker: UserTaskCommandPreconditionChecker::new("assign", CREATED_ONLY),
        }
    }
}

impl UserTaskCommandProcessor for AssignProcessor {
    fn check(&self, command: &Record, ctx: &ProcessingContext<'_>) -> std::result::Result<UserTaskRecord, Rejection> {
        self.checker.check(command, ctx)
    }

    fn on_command(&self, command: &Record, persisted: UserTaskRecord, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let requested = command_value(command);
        let record = UserTaskRecord {
            assignee: requested.assignee.clone(),
            action: action_or(&requested, "assign"),
            changed_attributes: vec![ATTRIBUTE_ASSIGNEE.to_string()],
            pending_finalizer: Some(UserTaskFinalizer::Assign),
            ..persisted
        };
        start_transition(ctx, command, Intent::Assigning, record)
    }

    fn on_finalize(&self, user_task_key: i64, pending: &PendingTransition, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        finalize(ctx, user_task_key, Intent::Assigned, pending)
    }
}

pub struct UpdateProcessor {
    checker: UserTaskCommandPreconditionChecker,
}

impl Default for UpdateProcessor {
    fn default() -> Self {
        Self {
            checker: UserTaskCommandPreconditionChecker::new("update", CREATED_ONLY),
        }
    }
}

impl UserTaskCommandProcessor for UpdateProcessor {
    fn check(&self, command: &Record, ctx: &ProcessingContext<'_>) -> std::result::Result<UserTaskRecord, Rejection> {
        self.checker.check(command, ctx)
    }

    fn on_command(&self, command: &Record, persisted: UserTaskRecord, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let requested = command_value(command);
        let mut record = persisted;
        for attribute in &requested.changed_attributes {
            match attribute.as_str() {
                ATTRIBUTE_CANDIDATE_GROUPS => record.candidate_groups = requested.candidate_groups.clone(),
                ATTRIBUTE_CANDIDATE_USERS => record.candidate_users = requested.candidate_users.clone(),
                ATTRIBUTE_DUE_DATE => record.due_date = requested.due_date.clone(),
                ATTRIBUTE_FOLLOW_UP_DATE => record.follow_up_date = requested.follow_up_date.clone(),
                ATTRIBUTE_PRIORITY => record.priority = requested.priority,
                _ => {}
            }
        }
        record.action = action_or(&requested, "update");
        record.changed_attributes = requested.changed_attributes.clone();
        record.pending_finalizer = Some(UserTaskFinalizer::Update);
        start_transition(ctx, command, Intent::Updating, record)
    }

    fn on_finalize(&self, user_task_key: i64, pending: &PendingTransition, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        finalize(ctx, user_task_key, Intent::Updated, pending)
    }
}

pub struct CompleteProcessor {
    checker: UserTaskCommandPreconditionChecker,
}

impl Default for CompleteProcessor {
    fn default() -> Self {
        Self {
            checker: UserTaskCommandPreconditionChecker::new("complete", CREATED_ONLY),
        }
    }
}

impl UserTaskCommandProcessor for CompleteProcessor {
    fn check(&self, command: &Record, ctx: &ProcessingContext<'_>) -> std::result::Result<UserTaskRecord, Rejection> {
        self.checker.check(command, ctx)
    }

    fn on_command(&self, command: &Record, persisted: UserTaskRecord, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let requested = command_value(command);
        let record = UserTaskRecord {
            variables: requested.variables.clone(),
            action: action_or(&requested, "complete"),
            changed_attributes: Vec::new(),
            pending_finalizer: Some(UserTaskFinalizer::Complete),
            ..persisted
        };
        start_transition(ctx, command, Intent::Completing, record)
    }

    fn on_finalize(&self, user_task_key: i64, pending: &PendingTransition, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        finalize(ctx, user_task_key, Intent::Completed, pending)
    }
}

pub struct CancelProcessor {
    checker: UserTaskCommandPreconditionChecker,
}

impl Default for CancelProcessor {
    fn default() -> Self {
        Self {
            checker: UserTaskCommandPreconditionChecker::new("cancel", CANCELABLE),
        }
    }
}

impl UserTaskCommandProcessor for CancelProcessor {
    fn check(&self, command: &Record, ctx: &ProcessingContext<'_>) -> std::result::Result<UserTaskRecord, Rejection> {
        self.checker.check(command, ctx)
    }

    fn on_command(&self, command: &Record, persisted: UserTaskRecord, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        // listener jobs of an interrupted transition are dropped with it
        let jobs: Vec<(i64, Option<i64>)> = ctx
            .state()
            .jobs
            .jobs_of_user_task(command.key)
            .into_iter()
            .map(|job_key| (job_key, ctx.state().incidents.incident_of_job(job_key)))
            .collect();
        for (job_key, incident_key) in jobs {
            if let Some(incident_key) = incident_key {
                let incident = ctx.state().incidents.get(incident_key).cloned().unwrap_or_default();
                ctx.state_writer()
                    .append_follow_up_event(incident_key, Intent::Resolved, incident)?;
            }
            let job = ctx
                .state()
                .jobs
                .get(job_key)
                .map(|entry| entry.record.clone())
                .unwrap_or_default();
            ctx.state_writer()
                .append_follow_up_event(job_key, Intent::Canceled, job)?;
        }

        let requested = command_value(command);
        let record = UserTaskRecord {
            action: action_or(&requested, "cancel"),
            changed_attributes: Vec::new(),
            pending_finalizer: Some(UserTaskFinalizer::Cancel),
            ..persisted
        };
        start_transition(ctx, command, Intent::Canceling, record)
    }

    fn on_finalize(&self, user_task_key: i64, pending: &PendingTransition, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        finalize(ctx, user_task_key, Intent::Canceled, pending)
    }
}
