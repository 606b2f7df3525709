use super::entity_exists;
use crate::core::Result;
use crate::engine::authorization::{AuthorizationRequest, unauthorized};
use crate::engine::context::ProcessingContext;
use crate::engine::processors::DistributedProcessor;
use crate::engine::reject_unexpected_value;
use crate::protocol::{
    DistributionQueue, Intent, PermissionType, Record, Rejection, ResourceType, TenantRecord,
};

pub struct TenantCreateProcessor;

impl DistributedProcessor for TenantCreateProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(tenant) = command.value.as_tenant() else {
            return reject_unexpected_value(command, ctx);
        };
        let request = AuthorizationRequest::new(command, ResourceType::Tenant, PermissionType::Create);
        if !ctx.is_authorized(&request) {
            ctx.reject(command, unauthorized(&request, None));
            return Ok(());
        }
        if ctx.state().tenants.get_by_name(&tenant.tenant_id).is_some() {
            ctx.reject(
                command,
                Rejection::already_exists(format!(
                    "Expected to create tenant with ID '{}', but a tenant with this ID already exists.",
                    tenant.tenant_id
                )),
            );
            return Ok(());
        }

        let key = ctx.next_key();
        let created = TenantRecord {
            tenant_key: key,
            ..tenant.clone()
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
        let Some(tenant) = command.value.as_tenant().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        ctx.state_writer()
            .append_follow_up_event(tenant.tenant_key, Intent::Created, tenant)?;
        ctx.command_distribution().acknowledge_command(command)
    }
}

pub struct TenantAddEntityProcessor;

impl DistributedProcessor for TenantAddEntityProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(tenant) = command.value.as_tenant() else {
            return reject_unexpected_value(command, ctx);
        };
        let Some(persisted) = ctx.state().tenants.get(tenant.tenant_key).cloned() else {
            ctx.reject(
                command,
                Rejection::not_found(format!(
                    "Expected to add entity to tenant with key '{}', but no tenant with this key exists.",
                    tenant.tenant_key
                )),
            );
            return Ok(());
        };
        let request = AuthorizationRequest::new(command, ResourceType::Tenant, PermissionType::Update)
            .add_resource_id(persisted.name.clone());
        if !ctx.is_authorized(&request) {
            let description = format!("tenant id '{}'", persisted.name);
            ctx.reject(command, unauthorized(&request, Some(&description)));
            return Ok(());
        }
        if !entity_exists(ctx.state(), tenant.entity_key, tenant.entity_type) {
            ctx.reject(
                command,
                Rejection::not_found(format!(
                    "Expected to add {} with key '{}' to tenant with key '{}', but the entity doesn't exist.",
                    tenant.entity_type, tenant.entity_key, tenant.tenant_key
                )),
            );
            return Ok(());
        }
        if ctx.state().tenants.is_member(tenant.tenant_key, tenant.entity_key) {
            ctx.reject(
                command,
                Rejection::already_exists(format!(
                    "Expected to add {} with key '{}' to tenant with key '{}', but the {} is already assigned to the tenant.",
                    tenant.entity_type, tenant.entity_key, tenant.tenant_key, tenant.entity_type
                )),
            );
            return Ok(());
        }

        let added = TenantRecord {
            tenant_key: persisted.key,
            tenant_id: persisted.name,
            name: persisted.display_name,
            entity_key: tenant.entity_key,
            entity_type: tenant.entity_type,
        };
        ctx.state_writer()
            .append_follow_up_event(added.tenant_key, Intent::EntityAdded, added.clone())?;
        ctx.response_writer()
            .write_event_on_command(added.tenant_key, Intent::EntityAdded, added.clone(), command);
        let distribution_key = ctx.next_key();
        ctx.command_distribution()
            .with_key(distribution_key)
            .in_queue(DistributionQueue::Identity)
            .distribute(&command.with_value(added))
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(tenant) = command.value.as_tenant().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        ctx.state_writer()
            .append_follow_up_event(tenant.tenant_key, Intent::EntityAdded, tenant)?;
        ctx.command_distribution().acknowledge_command(command)
    }
}
