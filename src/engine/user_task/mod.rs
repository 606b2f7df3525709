//! User task lifecycle with task listeners.
//!
//! A lifecycle command first writes an intermediate event (`ASSIGNING`,
//! `UPDATING`, `COMPLETING`, `CANCELING`) and remembers which finalizer closes
//! the transition. Listener jobs then run one at a time; each completed job
//! leads to `COMPLETE_TASK_LISTENER`, which creates the next job or runs the
//! finalizer.

pub mod commands;
pub mod listeners;
pub mod preconditions;

pub use commands::{
    AssignProcessor, CancelProcessor, ClaimProcessor, CompleteProcessor, UpdateProcessor,
    UserTaskCommandProcessor,
};
pub use listeners::TaskListenerBehavior;
pub use preconditions::UserTaskCommandPreconditionChecker;

use super::context::ProcessingContext;
use super::processors::CommandProcessor;
use super::reject_unexpected_value;
use crate::core::{EngineError, Result};
use crate::protocol::{DEFAULT_TENANT_ID, Intent, Record, Rejection, UserTaskFinalizer, UserTaskRecord};

/// Dispatches the lifecycle commands of user tasks.
#[derive(Default)]
pub struct UserTaskProcessor {
    claim: ClaimProcessor,
    assign: AssignProcessor,
    update: UpdateProcessor,
    complete: CompleteProcessor,
    cancel: CancelProcessor,
}

impl UserTaskProcessor {
    fn for_intent(&self, intent: Intent) -> Option<&dyn UserTaskCommandProcessor> {
        match intent {
            Intent::Claim => Some(&self.claim),
            Intent::Assign => Some(&self.assign),
            Intent::Update => Some(&self.update),
            Intent::Complete => Some(&self.complete),
            Intent::Cancel => Some(&self.cancel),
            _ => None,
        }
    }

    fn for_finalizer(&self, finalizer: UserTaskFinalizer) -> &dyn UserTaskCommandProcessor {
        match finalizer {
            UserTaskFinalizer::Claim => &self.claim,
            UserTaskFinalizer::Assign => &self.assign,
            UserTaskFinalizer::Update => &self.update,
            UserTaskFinalizer::Complete => &self.complete,
            UserTaskFinalizer::Cancel => &self.cancel,
        }
    }

    /// Creates the next listener job, or finalizes when none is left.
    fn continue_transition(&self, user_task_key: i64, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        if TaskListenerBehavior::create_next_listener_job(ctx, user_task_key)? {
            return Ok(());
        }
        let pending = ctx
            .state()
            .user_tasks
            .get(user_task_key)
            .and_then(|entry| entry.pending.clone())
            .ok_or_else(|| {
                EngineError::StateInconsistency(format!(
                    "expected user task {} to have a pending transition",
                    user_task_key
                ))
            })?;
        self.for_finalizer(pending.finalizer)
            .on_finalize(user_task_key, &pending, ctx)
    }

    fn on_task_listener_completed(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let key = command.key;
        let waiting = ctx
            .state()
            .user_tasks
            .get(key)
            .and_then(|entry| entry.pending.as_ref())
            .map(|pending| pending.active_job_key.is_none())
            .unwrap_or(false);
        if !waiting {
            ctx.reject(
                command,
                Rejection::invalid_state(format!(
                    "Expected to complete task listener for user task with key '{}', but no listener of this task is waiting to continue",
                    key
                )),
            );
            return Ok(());
        }
        self.continue_transition(key, ctx)
    }
}

impl CommandProcessor for UserTaskProcessor {
    fn process(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        if command.intent == Intent::CompleteTaskListener {
            return self.on_task_listener_completed(command, ctx);
        }
        let Some(processor) = self.for_intent(command.intent) else {
            return reject_unexpected_value(command, ctx);
        };
        match processor.check(command, ctx) {
            Ok(persisted) => {
                processor.on_command(command, persisted, ctx)?;
                self.continue_transition(command.key, ctx)
            }
            Err(rejection) => {
                ctx.reject(command, rejection);
                Ok(())
            }
        }
    }
}

/// Handles `USER_TASK:CREATE`, written when a process reaches a user task.
pub struct UserTaskCreateProcessor;

impl CommandProcessor for UserTaskCreateProcessor {
    fn process(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(task) = command.value.as_user_task() else {
            return reject_unexpected_value(command, ctx);
        };
        let key = ctx.next_key();
        let tenant_id = if task.tenant_id.is_empty() {
            DEFAULT_TENANT_ID.to_string()
        } else {
            task.tenant_id.clone()
        };
        let record = UserTaskRecord {
            user_task_key: key,
            tenant_id,
            pending_finalizer: None,
            ..task.clone()
        };

        ctx.state_writer()
            .append_follow_up_event(key, Intent::Creating, record.clone())?;
        ctx.state_writer()
            .append_follow_up_event(key, Intent::Created, record.clone())?;
        ctx.response_writer()
            .write_event_on_command(key, Intent::Created, record, command);
        Ok(())
    }
}
