use super::entity_exists;
use crate::core::Result;
use crate::engine::authorization::{AuthorizationRequest, unauthorized};
use crate::engine::context::ProcessingContext;
use crate::engine::processors::DistributedProcessor;
use crate::engine::reject_unexpected_value;
use crate::protocol::{
    DistributionQueue, GroupRecord, Intent, PermissionType, Record, Rejection, ResourceType,
};

fn authorize(
    command: &Record,
    ctx: &mut ProcessingContext<'_>,
    permission: PermissionType,
    group_name: Option<&str>,
) -> bool {
    let mut request = AuthorizationRequest::new(command, ResourceType::Group, permission);
    if let Some(name) = group_name {
        request = request.add_resource_id(name);
    }
    if ctx.is_authorized(&request) {
        return true;
    }
    let description = group_name.map(|name| format!("group name '{}'", name));
    ctx.reject(command, unauthorized(&request, description.as_deref()));
    false
}

fn group_not_found(action: &str, group_key: i64) -> Rejection {
    Rejection::not_found(format!(
        "Expected to {} group with key '{}', but a group with this key does not exist.",
        action, group_key
    ))
}

/// Writes the event, answers the client and distributes the command.
fn commit(
    command: &Record,
    ctx: &mut ProcessingContext<'_>,
    key: i64,
    intent: Intent,
    group: GroupRecord,
) -> Result<()> {
    ctx.state_writer()
        .append_follow_up_event(key, intent, group.clone())?;
    ctx.response_writer()
        .write_event_on_command(key, intent, group.clone(), command);
    let distribution_key = ctx.next_key();
    ctx.command_distribution()
        .with_key(distribution_key)
        .in_queue(DistributionQueue::Identity)
        .distribute(&command.with_value(group))
}

fn apply_distributed(command: &Record, ctx: &mut ProcessingContext<'_>, intent: Intent) -> Result<()> {
    let Some(group) = command.value.as_group().cloned() else {
        return reject_unexpected_value(command, ctx);
    };
    ctx.state_writer()
        .append_follow_up_event(group.group_key, intent, group)?;
    ctx.command_distribution().acknowledge_command(command)
}

pub struct GroupCreateProcessor;

impl DistributedProcessor for GroupCreateProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(group) = command.value.as_group() else {
            return reject_unexpected_value(command, ctx);
        };
        if !authorize(command, ctx, PermissionType::Create, None) {
            return Ok(());
        }
        if ctx.state().groups.get_by_name(&group.name).is_some() {
            ctx.reject(
                command,
                Rejection::already_exists(format!(
                    "Expected to create group with name '{}', but a group with this name already exists.",
                    group.name
                )),
            );
            return Ok(());
        }

        let key = ctx.next_key();
        let created = GroupRecord {
            group_key: key,
            ..group.clone()
        };
        ctx.state_writer()
            .append_follow_up_event(key, Intent::Created, created.clone())?;
        ctx.response_writer()
            .write_event_on_command(key, Intent::Created, created.clone(), command);
        ctx.command_distribution()
            .with_key(key)
            .in_queue(DistributionQueue::Identity)
            .distribute(&command.with_value(created))
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        apply_distributed(command, ctx, Intent::Created)
    }
}

pub struct GroupUpdateProcessor;

impl DistributedProcessor for GroupUpdateProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(group) = command.value.as_group() else {
            return reject_unexpected_value(command, ctx);
        };
        let Some(persisted) = ctx.state().groups.get(group.group_key).cloned() else {
            ctx.reject(command, group_not_found("update", group.group_key));
            return Ok(());
        };
        if !authorize(command, ctx, PermissionType::Update, Some(&persisted.name)) {
            return Ok(());
        }
        if ctx.state().groups.get_by_name(&group.name).is_some() {
            ctx.reject(
                command,
                Rejection::already_exists(format!(
                    "Expected to update group with name '{}', but a group with this name already exists.",
                    group.name
                )),
            );
            return Ok(());
        }

        let updated = GroupRecord {
            group_key: persisted.key,
            name: group.name.clone(),
            ..Default::default()
        };
        commit(command, ctx, persisted.key, Intent::Updated, updated)
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        apply_distributed(command, ctx, Intent::Updated)
    }
}

pub struct GroupDeleteProcessor;

impl DistributedProcessor for GroupDeleteProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(group) = command.value.as_group() else {
            return reject_unexpected_value(command, ctx);
        };
        let Some(persisted) = ctx.state().groups.get(group.group_key).cloned() else {
            ctx.reject(command, group_not_found("delete", group.group_key));
            return Ok(());
        };
        if !authorize(command, ctx, PermissionType::Delete, Some(&persisted.name)) {
            return Ok(());
        }

        let deleted = GroupRecord {
            group_key: persisted.key,
            name: persisted.name,
            ..Default::default()
        };
        commit(command, ctx, persisted.key, Intent::Deleted, deleted)
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        apply_distributed(command, ctx, Intent::Deleted)
    }
}

pub struct GroupAddEntityProcessor;

impl DistributedProcessor for GroupAddEntityProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(group) = command.value.as_group() else {
            return reject_unexpected_value(command, ctx);
        };
        let Some(persisted) = ctx.state().groups.get(group.group_key).cloned() else {
            ctx.reject(command, group_not_found("update", group.group_key));
            return Ok(());
        };
        if !authorize(command, ctx, PermissionType::Update, Some(&persisted.name)) {
            return Ok(());
        }
        if !entity_exists(ctx.state(), group.entity_key, group.entity_type) {
            ctx.reject(
                command,
                Rejection::not_found(format!(
                    "Expected to add an entity with key '{}' and type '{}' to group with key '{}', but the entity does not exist.",
                    group.entity_key, group.entity_type, group.group_key
                )),
            );
            return Ok(());
        }
        if ctx.state().groups.is_member(group.group_key, group.entity_key) {
            ctx.reject(
                command,
                Rejection::already_exists(format!(
                    "Expected to add entity with key '{}' to group with key '{}', but the entity is already assigned to this group.",
                    group.entity_key, group.group_key
                )),
            );
            return Ok(());
        }

        let added = GroupRecord {
            group_key: persisted.key,
            name: persisted.name,
            entity_key: group.entity_key,
            entity_type: group.entity_type,
        };
        commit(command, ctx, persisted.key, Intent::EntityAdded, added)
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        apply_distributed(command, ctx, Intent::EntityAdded)
    }
}

pub struct GroupRemoveEntityProcessor;

impl DistributedProcessor for GroupRemoveEntityProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(group) = command.value.as_group() else {
            return reject_unexpected_value(command, ctx);
        };
        let Some(persisted) = ctx.state().groups.get(group.group_key).cloned() else {
            ctx.reject(command, group_not_found("update", group.group_key));
            return Ok(());
        };
        if !authorize(command, ctx, PermissionType::Update, Some(&persisted.name)) {
            return Ok(());
        }
        if !ctx.state().groups.is_member(group.group_key, group.entity_key) {
            ctx.reject(
                command,
                Rejection::not_found(format!(
                    "Expected to remove an entity with key '{}' and type '{}' from group with key '{}', but the entity does not exist.",
                    group.entity_key, group.entity_type, group.group_key
                )),
            );
            return Ok(());
        }

        let removed = GroupRecord {
            group_key: persisted.key,
            name: persisted.name,
            entity_key: group.entity_key,
            entity_type: group.entity_type,
        };
        commit(command, ctx, persisted.key, Intent::EntityRemoved, removed)
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        apply_distributed(command, ctx, Intent::EntityRemoved)
    }
}
