use super::owner_type_of;
use crate::core::Result;
use crate::engine::authorization::{AuthorizationRequest, unauthorized};
use crate::engine::context::ProcessingContext;
use crate::engine::processors::DistributedProcessor;
use crate::engine::reject_unexpected_value;
use crate::protocol::{
    AuthorizationRecord, DistributionQueue, Intent, PermissionType, Record, Rejection,
    ResourceType,
};

fn join_ids(record: &AuthorizationRecord) -> String {
    record
        .resource_ids
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Shared checks of both permission commands. Returns the record with the
/// resolved owner type when the command may proceed.
fn check(command: &Record, ctx: &mut ProcessingContext<'_>) -> Option<AuthorizationRecord> {
    let authorization = command.value.as_authorization()?.clone();
    let Some(owner_type) = owner_type_of(ctx.state(), authorization.owner_key) else {
        ctx.reject(
            command,
            Rejection::not_found(format!(
                "Expected to find owner with key: '{}', but none was found",
                authorization.owner_key
            )),
        );
        return None;
    };
    let request = AuthorizationRequest::new(command, ResourceType::Authorization, PermissionType::Update);
    if !ctx.is_authorized(&request) {
        ctx.reject(command, unauthorized(&request, None));
        return None;
    }
    if authorization.resource_ids.is_empty() {
        ctx.reject(
            command,
            Rejection::invalid_argument("Expected at least one resource identifier, but none was given"),
        );
        return None;
    }
    Some(AuthorizationRecord {
        owner_type,
        ..authorization
    })
}

fn distribute(command: &Record, ctx: &mut ProcessingContext<'_>, record: AuthorizationRecord) -> Result<()> {
    let distribution_key = ctx.next_key();
    ctx.command_distribution()
        .with_key(distribution_key)
        .in_queue(DistributionQueue::Identity)
        .distribute(&command.with_value(record))
}

pub struct AddPermissionProcessor;

impl DistributedProcessor for AddPermissionProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        if command.value.as_authorization().is_none() {
            return reject_unexpected_value(command, ctx);
        }
        let Some(record) = check(command, ctx) else {
            return Ok(());
        };
        if !record
            .resource_type
            .supported_permissions()
            .contains(&record.permission_type)
        {
            ctx.reject(
                command,
                Rejection::invalid_argument(format!(
                    "Expected to add permission '{}' for resource type '{}', but this resource type does not support it",
                    record.permission_type, record.resource_type
                )),
            );
            return Ok(());
        }
        if ctx.state().authorizations.contains_all(&record) {
            ctx.reject(
                command,
                Rejection::already_exists(format!(
                    "Expected to add '{}' permission for resource '{}' and resource identifiers '{}' for owner '{}', but this permission for resource identifiers already exist.",
                    record.permission_type,
                    record.resource_type,
                    join_ids(&record),
                    record.owner_key
                )),
            );
            return Ok(());
        }

        let key = record.owner_key;
        ctx.state_writer()
            .append_follow_up_event(key, Intent::PermissionAdded, record.clone())?;
        ctx.response_writer()
            .write_event_on_command(key, Intent::PermissionAdded, record.clone(), command);
        distribute(command, ctx, record)
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(record) = command.value.as_authorization().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        ctx.state_writer()
            .append_follow_up_event(record.owner_key, Intent::PermissionAdded, record)?;
        ctx.command_distribution().acknowledge_command(command)
    }
}

pub struct RemovePermissionProcessor;

impl DistributedProcessor for RemovePermissionProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        if command.value.as_authorization().is_none() {
            return reject_unexpected_value(command, ctx);
        }
        let Some(record) = check(command, ctx) else {
            return Ok(());
        };
        if !ctx.state().authorizations.contains_all(&record) {
            ctx.reject(
                command,
                Rejection::not_found(format!(
                    "Expected to remove '{}' permission for resource '{}' and resource identifiers '{}' for owner '{}', but this permission does not exist.",
                    record.permission_type,
                    record.resource_type,
                    join_ids(&record),
                    record.owner_key
                )),
            );
            return Ok(());
        }

        let key = record.owner_key;
        ctx.state_writer()
            .append_follow_up_event(key, Intent::PermissionRemoved, record.clone())?;
        ctx.response_writer()
            .write_event_on_command(key, Intent::PermissionRemoved, record.clone(), command);
        distribute(command, ctx, record)
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(record) = command.value.as_authorization().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        ctx.state_writer()
            .append_follow_up_event(record.owner_key, Intent::PermissionRemoved, record)?;
        ctx.command_distribution().acknowledge_command(command)
    }
}
