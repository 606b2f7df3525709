use super::context::ProcessingContext;
use super::processors::SimpleProcessor;
use crate::core::Result;
use crate::protocol::{IncidentRecord, Intent, Record, Rejection};

/// Resolves an incident once the underlying job has retries again.
pub struct IncidentResolveProcessor;

impl SimpleProcessor for IncidentResolveProcessor {
    type Validated = IncidentRecord;

    fn validate(&self, command: &Record, ctx: &ProcessingContext<'_>) -> std::result::Result<IncidentRecord, Rejection> {
        let key = command.key;
        let incident = ctx.state().incidents.get(key).ok_or_else(|| {
            Rejection::not_found(format!(
                "Expected to resolve incident with key '{}', but no such incident was found",
                key
            ))
        })?;
        let retries = ctx
            .state()
            .jobs
            .get(incident.job_key)
            .map(|job| job.record.retries)
            .unwrap_or_default();
        if retries <= 0 {
            return Err(Rejection::invalid_state(format!(
                "Expected to resolve incident with key '{}', but job with key '{}' has no retries left",
                key, incident.job_key
            )));
        }
        Ok(incident.clone())
    }

    fn apply(&self, command: &Record, incident: IncidentRecord, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        ctx.state_writer()
            .append_follow_up_event(command.key, Intent::Resolved, incident.clone())?;
        ctx.response_writer()
            .write_event_on_command(command.key, Intent::Resolved, incident, command);
        Ok(())
    }
}
