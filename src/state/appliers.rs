use super::{JobStatus, PendingDistribution, PendingTransition, ProcessingState};
use crate::core::{EngineError, Result};
use crate::protocol::{
    CommandDistributionRecord, Intent, JobKind, JobRecord, LifecycleState, Record, RecordValue,
    UserTaskRecord,
};
use std::collections::BTreeSet;

/// Applies follow-up events to the partition state.
///
/// Used by the state writer while processing and by the stream processor on
/// replay, so both paths produce the same state.
pub struct EventAppliers;

impl EventAppliers {
    pub fn apply(state: &mut ProcessingState, event: &Record) -> Result<()> {
        state.key_generator.set_key_if_higher(event.key);

        match &event.value {
            RecordValue::User(user) => match event.intent {
                Intent::Created => state.users.insert(user.clone()),
                Intent::Deleted => {
                    state.users.remove(user.user_key);
                    state.groups.remove_member_everywhere(user.user_key);
                    state.roles.remove_member_everywhere(user.user_key);
                    state.tenants.remove_member_everywhere(user.user_key);
                    state.authorizations.remove_owner(user.user_key);
                }
                _ => return Err(no_applier(event)),
            },
            RecordValue::Group(group) => match event.intent {
                Intent::Created => state.groups.create(group.group_key, &group.name, ""),
                Intent::Updated => state.groups.rename(group.group_key, &group.name),
                Intent::Deleted => {
                    state.groups.delete(group.group_key);
                    state.authorizations.remove_owner(group.group_key);
                }
                Intent::EntityAdded => {
                    state
                        .groups
                        .add_member(group.group_key, group.entity_key, group.entity_type)
                }
                Intent::EntityRemoved => state.groups.remove_member(group.group_key, group.entity_key),
                _ => return Err(no_applier(event)),
            },
            RecordValue::Role(role) => match event.intent {
                Intent::Created => state.roles.create(role.role_key, &role.name, ""),
                Intent::EntityAdded => {
                    state
                        .roles
                        .add_member(role.role_key, role.entity_key, role.entity_type)
                }
                Intent::EntityRemoved => state.roles.remove_member(role.role_key, role.entity_key),
                _ => return Err(no_applier(event)),
            },
            RecordValue::Tenant(tenant) => match event.intent {
                Intent::Created => {
                    state
                        .tenants
                        .create(tenant.tenant_key, &tenant.tenant_id, &tenant.name)
                }
                Intent::EntityAdded => state.tenants.add_member(
                    tenant.tenant_key,
                    tenant.entity_key,
                    tenant.entity_type,
                ),
                _ => return Err(no_applier(event)),
            },
            RecordValue::Mapping(mapping) => match event.intent {
                Intent::Created => state.mappings.insert(mapping.clone()),
                _ => return Err(no_applier(event)),
            },
            RecordValue::Authorization(authorization) => match event.intent {
                Intent::PermissionAdded => state.authorizations.add(authorization),
                Intent::PermissionRemoved => state.authorizations.remove(authorization),
                _ => return Err(no_applier(event)),
            },
            RecordValue::IdentitySetup(_) => match event.intent {
                Intent::Initialized => state.identity_initialized = true,
                _ => return Err(no_applier(event)),
            },
            RecordValue::UserTask(task) => apply_user_task(state, event, task)?,
            RecordValue::Job(job) => apply_job(state, event, job)?,
            RecordValue::Incident(incident) => match event.intent {
                Intent::Created => state.incidents.insert(event.key, incident.clone()),
                Intent::Resolved => {
                    state.incidents.remove(event.key);
                    if let Some(job) = state.jobs.get_mut(incident.job_key) {
                        job.status = JobStatus::Activatable;
                    }
                }
                _ => return Err(no_applier(event)),
            },
            RecordValue::CommandDistribution(distribution) => {
                apply_distribution(state, event, distribution)?
            }
        }
        Ok(())
    }
}

fn apply_user_task(state: &mut ProcessingState, event: &Record, task: &UserTaskRecord) -> Result<()> {
    let key = event.key;
    match event.intent {
        Intent::Creating => state.user_tasks.insert(key, task.clone(), LifecycleState::Creating),
        Intent::Created => state.user_tasks.insert(key, task.clone(), LifecycleState::Created),
        Intent::Assigning => start_transition(state, event, task, LifecycleState::Assigning)?,
        Intent::Updating => start_transition(state, event, task, LifecycleState::Updating)?,
        Intent::Completing => start_transition(state, event, task, LifecycleState::Completing)?,
        Intent::Canceling => start_transition(state, event, task, LifecycleState::Canceling)?,
        Intent::Assigned | Intent::Updated => {
            let entry = state
                .user_tasks
                .get_mut(key)
                .ok_or_else(|| missing("user task", key))?;
            let mut record = task.clone();
            record.pending_finalizer = None;
            entry.record = record;
            entry.lifecycle = LifecycleState::Created;
            entry.pending = None;
        }
        Intent::Completed | Intent::Canceled => {
            state
                .user_tasks
                .remove(key)
                .ok_or_else(|| missing("user task", key))?;
        }
        _ => return Err(no_applier(event)),
    }
    Ok(())
}

fn start_transition(
    state: &mut ProcessingState,
    event: &Record,
    task: &UserTaskRecord,
    lifecycle: LifecycleState,
) -> Result<()> {
    let finalizer = task.pending_finalizer.ok_or_else(|| {
        EngineError::StateInconsistency(format!(
            "{} event for user task {} carries no pending finalizer",
            event.intent, event.key
        ))
    })?;
    let entry = state
        .user_tasks
        .get_mut(event.key)
        .ok_or_else(|| missing("user task", event.key))?;
    entry.lifecycle = lifecycle;
    entry.pending = Some(PendingTransition {
        finalizer,
        record: task.clone(),
        request: event.request,
        next_listener: 0,
        listener_variables: Default::default(),
        active_job_key: None,
    });
    Ok(())
}

fn apply_job(state: &mut ProcessingState, event: &Record, job: &JobRecord) -> Result<()> {
    let key = event.key;
    match event.intent {
        Intent::Created => {
            state.jobs.insert(key, job.clone());
            if job.kind == JobKind::TaskListener {
                if let Some(pending) = pending_of(state, job.user_task_key) {
                    pending.active_job_key = Some(key);
                }
            }
        }
        Intent::Completed => {
            state.jobs.remove(key).ok_or_else(|| missing("job", key))?;
            if job.kind == JobKind::TaskListener {
                if let Some(pending) = pending_of(state, job.user_task_key) {
                    pending.next_listener += 1;
                    pending
                        .listener_variables
                        .extend(job.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
                    pending.active_job_key = None;
                }
            }
        }
        Intent::Failed => {
            let entry = state.jobs.get_mut(key).ok_or_else(|| missing("job", key))?;
            entry.record.retries = job.retries;
            entry.record.error_message = job.error_message.clone();
            entry.status = if job.retries > 0 {
                JobStatus::Activatable
            } else {
                JobStatus::Failed
            };
        }
        Intent::RetriesUpdated => {
            let entry = state.jobs.get_mut(key).ok_or_else(|| missing("job", key))?;
            entry.record.retries = job.retries;
        }
        Intent::Canceled => {
            state.jobs.remove(key);
            if let Some(pending) = pending_of(state, job.user_task_key) {
                if pending.active_job_key == Some(key) {
                    pending.active_job_key = None;
                }
            }
        }
        _ => return Err(no_applier(event)),
    }
    Ok(())
}

fn pending_of(state: &mut ProcessingState, user_task_key: i64) -> Option<&mut PendingTransition> {
    state
        .user_tasks
        .get_mut(user_task_key)
        .and_then(|entry| entry.pending.as_mut())
}

fn apply_distribution(
    state: &mut ProcessingState,
    event: &Record,
    distribution: &CommandDistributionRecord,
) -> Result<()> {
    let key = event.key;
    match event.intent {
        Intent::Started => {
            let command_value = distribution.command_value.as_deref().cloned().ok_or_else(|| {
                EngineError::StateInconsistency(format!(
                    "distribution {} started without a command value",
                    key
                ))
            })?;
            state.distribution.add_distribution(PendingDistribution {
                distribution_key: key,
                queue: distribution.queue,
                value_type: distribution.value_type,
                intent: distribution.intent,
                command_value,
                tenant_id: event.tenant_id.clone(),
                pending_partitions: BTreeSet::new(),
            });
        }
        Intent::Distributing | Intent::Enqueued => state
            .distribution
            .add_pending_partition(key, distribution.partition_id),
        Intent::Acknowledged => state
            .distribution
            .remove_pending_partition(key, distribution.partition_id),
        Intent::Finished => state.distribution.remove_distribution(key),
        Intent::Received => state.distribution.mark_received(key),
        _ => return Err(no_applier(event)),
    }
    Ok(())
}

fn no_applier(event: &Record) -> EngineError {
    EngineError::StateInconsistency(format!(
        "no event applier registered for {}:{}",
        event.value_type(),
        event.intent
    ))
}

fn missing(kind: &str, key: i64) -> EngineError {
    EngineError::StateInconsistency(format!("expected {} with key {} to exist", kind, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GroupRecord, UserTaskFinalizer};

    #[test]
    fn replaying_events_restores_groups_and_keys() {
        let mut state = ProcessingState::new(1);
        let key = crate::protocol::encode_partition_id(1, 7);
        let created = Record::event(
            1,
            key,
            Intent::Created,
            GroupRecord {
                group_key: key,
                name: "ops".to_string(),
                ..Default::default()
            },
        );
        EventAppliers::apply(&mut state, &created).unwrap();

        assert_eq!(state.groups.get_by_name("ops").unwrap().key, key);
        assert!(state.key_generator.clone().next_key() > key);
    }

    #[test]
    fn transition_event_requires_a_finalizer() {
        let mut state = ProcessingState::new(1);
        let task = UserTaskRecord::default();
        EventAppliers::apply(&mut state, &Record::event(1, 5, Intent::Created, task.clone())).unwrap();

        let err = EventAppliers::apply(&mut state, &Record::event(1, 5, Intent::Assigning, task.clone()))
            .unwrap_err();
        assert!(matches!(err, EngineError::StateInconsistency(_)));

        let mut assigning = task;
        assigning.pending_finalizer = Some(UserTaskFinalizer::Claim);
        EventAppliers::apply(&mut state, &Record::event(1, 5, Intent::Assigning, assigning)).unwrap();
        assert_eq!(state.user_tasks.lifecycle(5), Some(LifecycleState::Assigning));
    }

    #[test]
    fn commands_have_no_applier() {
        let mut state = ProcessingState::new(1);
        let command = Record::command(1, 1, Intent::Create, GroupRecord::default());
        assert!(EventAppliers::apply(&mut state, &command).is_err());
    }
}
