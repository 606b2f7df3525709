use crate::core::Result;
use crate::engine::context::ProcessingContext;
use crate::protocol::{Intent, JobKind, JobRecord};

/// Creates task listener jobs one at a time, in declaration order.
pub struct TaskListenerBehavior;

impl TaskListenerBehavior {
    /// Creates the job of the next listener of the pending transition.
    /// Returns false when no listener is left.
    pub fn create_next_listener_job(ctx: &mut ProcessingContext<'_>, user_task_key: i64) -> Result<bool> {
        let job = {
            let Some(entry) = ctx.state().user_tasks.get(user_task_key) else {
                return Ok(false);
            };
            let Some(pending) = &entry.pending else {
                return Ok(false);
            };
            let event_type = pending.finalizer.listener_event_type();
            let Some(listener) = entry.record.listeners_for(event_type).nth(pending.next_listener) else {
                return Ok(false);
            };

            // listener output stays local to the chain
            let mut variables = pending.record.variables.clone();
            variables.extend(
                pending
                    .listener_variables
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );

            JobRecord {
                job_type: listener.job_type.clone(),
                kind: JobKind::TaskListener,
                listener_event_type: Some(event_type),
                retries: listener.retries,
                error_message: String::new(),
                user_task_key,
                element_id: entry.record.element_id.clone(),
                bpmn_process_id: entry.record.bpmn_process_id.clone(),
                process_instance_key: entry.record.process_instance_key,
                tenant_id: entry.record.tenant_id.clone(),
                variables,
            }
        };

        let job_key = ctx.next_key();
        ctx.state_writer()
            .append_follow_up_event(job_key, Intent::Created, job)?;
        Ok(true)
    }
}
