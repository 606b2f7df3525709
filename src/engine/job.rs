use super::context::ProcessingContext;
use super::processors::SimpleProcessor;
use crate::core::Result;
use crate::protocol::{
    ErrorType, IncidentRecord, Intent, JobKind, JobRecord, NO_RETRIES_LEFT_MESSAGE, Record,
    Rejection, UserTaskRecord,
};
use crate::state::JobStatus;

fn requested(command: &Record) -> JobRecord {
    command.value.as_job().cloned().unwrap_or_default()
}

fn activatable_job(
    command: &Record,
    ctx: &ProcessingContext<'_>,
    action: &str,
) -> std::result::Result<JobRecord, Rejection> {
    let entry = ctx.state().jobs.get(command.key).ok_or_else(|| {
        Rejection::not_found(format!(
            "Expected to {} job with key '{}', but no such job was found",
            action, command.key
        ))
    })?;
    if entry.status == JobStatus::Failed {
        return Err(Rejection::invalid_state(format!(
            "Expected to {} job with key '{}', but it is in state 'FAILED'",
            action, command.key
        )));
    }
    Ok(entry.record.clone())
}

pub struct JobCompleteProcessor;

impl SimpleProcessor for JobCompleteProcessor {
    type Validated = JobRecord;

    fn validate(&self, command: &Record, ctx: &ProcessingContext<'_>) -> std::result::Result<JobRecord, Rejection> {
        activatable_job(command, ctx, "complete")
    }

    fn apply(&self, command: &Record, persisted: JobRecord, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let key = command.key;
        let completed = JobRecord {
            variables: requested(command).variables,
            ..persisted
        };
        ctx.state_writer()
            .append_follow_up_event(key, Intent::Completed, completed.clone())?;
        ctx.response_writer()
            .write_event_on_command(key, Intent::Completed, completed.clone(), command);

        if completed.kind == JobKind::TaskListener {
            ctx.command_writer().append_follow_up_command(
                completed.user_task_key,
                Intent::CompleteTaskListener,
                UserTaskRecord {
                    user_task_key: completed.user_task_key,
                    tenant_id: completed.tenant_id.clone(),
                    variables: completed.variables,
                    ..Default::default()
                },
            );
        }
        Ok(())
    }
}

pub struct JobFailProcessor;

impl SimpleProcessor for JobFailProcessor {
    type Validated = JobRecord;

    fn validate(&self, command: &Record, ctx: &ProcessingContext<'_>) -> std::result::Result<JobRecord, Rejection> {
        activatable_job(command, ctx, "fail")
    }

    fn apply(&self, command: &Record, persisted: JobRecord, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let key = command.key;
        let request = requested(command);
        let failed = JobRecord {
            retries: request.retries,
            error_message: request.error_message,
            ..persisted
        };
        ctx.state_writer()
            .append_follow_up_event(key, Intent::Failed, failed.clone())?;
        ctx.response_writer()
            .write_event_on_command(key, Intent::Failed, failed.clone(), command);

        if failed.retries <= 0 {
            let error_message = if failed.error_message.is_empty() {
                NO_RETRIES_LEFT_MESSAGE.to_string()
            } else {
                failed.error_message.clone()
            };
            let incident = IncidentRecord {
                error_type: ErrorType::JobNoRetries,
                error_message,
                job_key: key,
                user_task_key: failed.user_task_key,
                element_id: failed.element_id,
                bpmn_process_id: failed.bpmn_process_id,
                tenant_id: failed.tenant_id,
            };
            let incident_key = ctx.next_key();
            ctx.state_writer()
                .append_follow_up_event(incident_key, Intent::Created, incident)?;
        }
        Ok(())
    }
}

pub struct JobUpdateRetriesProcessor;

impl SimpleProcessor for JobUpdateRetriesProcessor {
    type Validated = (JobRecord, i32);

    fn validate(
        &self,
        command: &Record,
        ctx: &ProcessingContext<'_>,
    ) -> std::result::Result<(JobRecord, i32), Rejection> {
        let retries = requested(command).retries;
        let entry = ctx.state().jobs.get(command.key).ok_or_else(|| {
            Rejection::not_found(format!(
                "Expected to update retries for job with key '{}', but no such job was found",
                command.key
            ))
        })?;
        if retries < 1 {
            return Err(Rejection::invalid_argument(format!(
                "Expected to update retries for job with key '{}' with a positive amount of retries, but the amount given was '{}'",
                command.key, retries
            )));
        }
        Ok((entry.record.clone(), retries))
    }

    fn apply(&self, command: &Record, validated: (JobRecord, i32), ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let (persisted, retries) = validated;
        let updated = JobRecord { retries, ..persisted };
        ctx.state_writer()
            .append_follow_up_event(command.key, Intent::RetriesUpdated, updated.clone())?;
        ctx.response_writer()
            .write_event_on_command(command.key, Intent::RetriesUpdated, updated, command);
        Ok(())
    }
}
