use super::entity_exists;
use crate::core::Result;
use crate::engine::authorization::{AuthorizationRequest, unauthorized};
use crate::engine::context::ProcessingContext;
use crate::engine::processors::DistributedProcessor;
use crate::engine::reject_unexpected_value;
use crate::protocol::{
    DistributionQueue, Intent, PermissionType, Record, Rejection, ResourceType, RoleRecord,
};

pub struct RoleCreateProcessor;

impl DistributedProcessor for RoleCreateProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(role) = command.value.as_role() else {
            return reject_unexpected_value(command, ctx);
        };
        let request = AuthorizationRequest::new(command, ResourceType::Role, PermissionType::Create);
        if !ctx.is_authorized(&request) {
            ctx.reject(command, unauthorized(&request, None));
            return Ok(());
        }
        if ctx.state().roles.get_by_name(&role.name).is_some() {
            ctx.reject(
                command,
                Rejection::already_exists(format!(
                    "Expected to create role with name '{}', but a role with this name already exists.",
                    role.name
                )),
            );
            return Ok(());
        }

        let key = ctx.next_key();
        let created = RoleRecord {
            role_key: key,
            ..role.clone()
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
        let Some(role) = command.value.as_role().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        ctx.state_writer()
            .append_follow_up_event(role.role_key, Intent::Created, role)?;
        ctx.command_distribution().acknowledge_command(command)
    }
}

pub struct RoleAddEntityProcessor;

impl DistributedProcessor for RoleAddEntityProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(role) = command.value.as_role() else {
            return reject_unexpected_value(command, ctx);
        };
        let Some(persisted) = ctx.state().roles.get(role.role_key).cloned() else {
            ctx.reject(
                command,
                Rejection::not_found(format!(
                    "Expected to update role with key '{}', but a role with this key does not exist.",
                    role.role_key
                )),
            );
            return Ok(());
        };
        let request = AuthorizationRequest::new(command, ResourceType::Role, PermissionType::Update)
            .add_resource_id(persisted.name.clone());
        if !ctx.is_authorized(&request) {
            let description = format!("role name '{}'", persisted.name);
            ctx.reject(command, unauthorized(&request, Some(&description)));
            return Ok(());
        }
        if !entity_exists(ctx.state(), role.entity_key, role.entity_type) {
            ctx.reject(
                command,
                Rejection::not_found(format!(
                    "Expected to add an entity with key '{}' and type '{}' to role with key '{}', but the entity does not exist.",
                    role.entity_key, role.entity_type, role.role_key
                )),
            );
            return Ok(());
        }
        if ctx.state().roles.is_member(role.role_key, role.entity_key) {
            ctx.reject(
                command,
                Rejection::already_exists(format!(
                    "Expected to add entity with key '{}' to role with key '{}', but the entity is already assigned to this role.",
                    role.entity_key, role.role_key
                )),
            );
            return Ok(());
        }

        let added = RoleRecord {
            role_key: persisted.key,
            name: persisted.name,
            entity_key: role.entity_key,
            entity_type: role.entity_type,
        };
        ctx.state_writer()
            .append_follow_up_event(added.role_key, Intent::EntityAdded, added.clone())?;
        ctx.response_writer()
            .write_event_on_command(added.role_key, Intent::EntityAdded, added.clone(), command);
        let distribution_key = ctx.next_key();
        ctx.command_distribution()
            .with_key(distribution_key)
            .in_queue(DistributionQueue::Identity)
            .distribute(&command.with_value(added))
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(role) = command.value.as_role().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        ctx.state_writer()
            .append_follow_up_event(role.role_key, Intent::EntityAdded, role)?;
        ctx.command_distribution().acknowledge_command(command)
    }
}
