//! Bootstrap of roles, users, mappings and the default tenant.

use super::user::hash_password;
use crate::config::SecurityConfig;
use crate::core::Result;
use crate::engine::context::ProcessingContext;
use crate::engine::processors::DistributedProcessor;
use crate::engine::reject_unexpected_value;
use crate::protocol::{
    AuthorizationRecord, DEFAULT_TENANT_ID, DistributionQueue, EntityType, IdentitySetupRecord,
    Intent, MappingRecord, NO_KEY, PermissionGrant, PermissionType, Record, Rejection,
    ResourceType, RoleRecord, RoleSetup, TenantRecord, UserRecord, WILDCARD_RESOURCE_ID,
};
use crate::stream::{Task, TaskContext};
use tracing::{Level, event};

pub const ADMIN_ROLE_NAME: &str = "Admin";
pub const RPA_ROLE_NAME: &str = "RPA";
pub const CONNECTORS_ROLE_NAME: &str = "Connectors";
pub const DEFAULT_TENANT_NAME: &str = "Default";

fn role_setup(name: &str, permissions: Vec<PermissionGrant>) -> RoleSetup {
    RoleSetup {
        role: RoleRecord {
            role_key: NO_KEY,
            name: name.to_string(),
            ..Default::default()
        },
        permissions,
    }
}

/// The initialize record for the configured users and mappings.
pub fn identity_setup_record(config: &SecurityConfig) -> IdentitySetupRecord {
    let admin_permissions = ResourceType::ALL
        .iter()
        .flat_map(|resource_type| {
            resource_type
                .supported_permissions()
                .iter()
                .map(|permission| PermissionGrant::new(*resource_type, *permission, WILDCARD_RESOURCE_ID))
        })
        .collect();

    let roles = vec![
        role_setup(ADMIN_ROLE_NAME, admin_permissions),
        role_setup(
            RPA_ROLE_NAME,
            vec![
                PermissionGrant::new(ResourceType::Resource, PermissionType::Read, WILDCARD_RESOURCE_ID),
                PermissionGrant::new(
                    ResourceType::ProcessDefinition,
                    PermissionType::UpdateProcessInstance,
                    WILDCARD_RESOURCE_ID,
                ),
            ],
        ),
        role_setup(
            CONNECTORS_ROLE_NAME,
            vec![
                PermissionGrant::new(
                    ResourceType::ProcessDefinition,
                    PermissionType::ReadProcessDefinition,
                    WILDCARD_RESOURCE_ID,
                ),
                PermissionGrant::new(
                    ResourceType::ProcessDefinition,
                    PermissionType::UpdateProcessInstance,
                    WILDCARD_RESOURCE_ID,
                ),
                PermissionGrant::new(ResourceType::Message, PermissionType::Create, WILDCARD_RESOURCE_ID),
            ],
        ),
    ];

    let users = config
        .initialization
        .users
        .iter()
        .map(|user| UserRecord {
            user_key: NO_KEY,
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            password: user.password.clone(),
        })
        .collect();

    let mappings = config
        .initialization
        .mappings
        .iter()
        .map(|mapping| MappingRecord {
            mapping_key: NO_KEY,
            claim_name: mapping.claim_name.clone(),
            claim_value: mapping.claim_value.clone(),
            name: format!("{}={}", mapping.claim_name, mapping.claim_value),
        })
        .collect();

    IdentitySetupRecord {
        roles,
        admin_role_name: ADMIN_ROLE_NAME.to_string(),
        users,
        mappings,
        default_tenant: TenantRecord {
            tenant_key: NO_KEY,
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            name: DEFAULT_TENANT_NAME.to_string(),
            ..Default::default()
        },
    }
}

/// Writes the `IDENTITY_SETUP:INITIALIZE` command once. Runs on the async
/// actor of the deployment partition.
pub struct IdentitySetupInitializer {
    setup: Option<IdentitySetupRecord>,
}

impl IdentitySetupInitializer {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            setup: Some(identity_setup_record(config)),
        }
    }
}

impl Task for IdentitySetupInitializer {
    fn execute(&mut self, context: &mut TaskContext<'_>) -> Result<()> {
        if let Some(setup) = self.setup.take() {
            event!(Level::INFO, partition = context.partition_id(), "writing identity setup command");
            context.append_command(NO_KEY, Intent::Initialize, setup);
        }
        Ok(())
    }
}

/// Creates whatever part of the setup does not exist yet and returns the
/// record with every key resolved. Passwords are hashed only when
/// `hash_cost` is given.
fn initialize(
    ctx: &mut ProcessingContext<'_>,
    mut setup: IdentitySetupRecord,
    hash_cost: Option<u32>,
) -> Result<IdentitySetupRecord> {
    for role_setup in &mut setup.roles {
        let role = &mut role_setup.role;
        match ctx.state().roles.get_by_name(&role.name).map(|existing| existing.key) {
            Some(existing) => role.role_key = existing,
            None => {
                if role.role_key <= 0 {
                    role.role_key = ctx.next_key();
                }
                ctx.state_writer().append_follow_up_event(
                    role.role_key,
                    Intent::Created,
                    RoleRecord {
                        role_key: role.role_key,
                        name: role.name.clone(),
                        ..Default::default()
                    },
                )?;
            }
        }

        for grant in &role_setup.permissions {
            let authorization = AuthorizationRecord {
                owner_key: role.role_key,
                owner_type: EntityType::Role,
                resource_type: grant.resource_type,
                permission_type: grant.permission_type,
                resource_ids: grant.resource_ids.clone(),
            };
            if !ctx.state().authorizations.contains_all(&authorization) {
                ctx.state_writer().append_follow_up_event(
                    role.role_key,
                    Intent::PermissionAdded,
                    authorization,
                )?;
            }
        }
    }

    let admin_role_key = ctx
        .state()
        .roles
        .get_by_name(&setup.admin_role_name)
        .map(|role| role.key);

    for user in &mut setup.users {
        let existing = ctx
            .state()
            .users
            .get_by_username(&user.username)
            .map(|existing| (existing.user_key, existing.password.clone()));
        match existing {
            Some((key, password)) => {
                user.user_key = key;
                user.password = password;
            }
            None => {
                if user.user_key <= 0 {
                    user.user_key = ctx.next_key();
                }
                if let Some(cost) = hash_cost {
                    user.password = hash_password(&user.password, cost)?;
                }
                ctx.state_writer()
                    .append_follow_up_event(user.user_key, Intent::Created, user.clone())?;
            }
        }
        add_to_role(ctx, admin_role_key, &setup.admin_role_name, user.user_key, EntityType::User)?;
    }

    for mapping in &mut setup.mappings {
        let existing = ctx
            .state()
            .mappings
            .get_by_claim(&mapping.claim_name, &mapping.claim_value)
            .map(|existing| existing.mapping_key);
        match existing {
            Some(key) => mapping.mapping_key = key,
            None => {
                if mapping.mapping_key <= 0 {
                    mapping.mapping_key = ctx.next_key();
                }
                ctx.state_writer().append_follow_up_event(
                    mapping.mapping_key,
                    Intent::Created,
                    mapping.clone(),
                )?;
            }
        }
        add_to_role(
            ctx,
            admin_role_key,
            &setup.admin_role_name,
            mapping.mapping_key,
            EntityType::Mapping,
        )?;
    }

    let tenant = &mut setup.default_tenant;
    match ctx.state().tenants.get_by_name(&tenant.tenant_id).map(|existing| existing.key) {
        Some(key) => tenant.tenant_key = key,
        None => {
            if tenant.tenant_key <= 0 {
                tenant.tenant_key = ctx.next_key();
            }
            ctx.state_writer().append_follow_up_event(
                tenant.tenant_key,
                Intent::Created,
                TenantRecord {
                    entity_key: NO_KEY,
                    entity_type: EntityType::Unspecified,
                    ..tenant.clone()
                },
            )?;
        }
    }
    for role_setup in &setup.roles {
        let role_key = role_setup.role.role_key;
        if !ctx.state().tenants.is_member(tenant.tenant_key, role_key) {
            ctx.state_writer().append_follow_up_event(
                tenant.tenant_key,
                Intent::EntityAdded,
                TenantRecord {
                    entity_key: role_key,
                    entity_type: EntityType::Role,
                    ..tenant.clone()
                },
            )?;
        }
    }

    Ok(setup)
}

fn add_to_role(
    ctx: &mut ProcessingContext<'_>,
    role_key: Option<i64>,
    role_name: &str,
    entity_key: i64,
    entity_type: EntityType,
) -> Result<()> {
    let Some(role_key) = role_key else {
        return Ok(());
    };
    if ctx.state().roles.is_member(role_key, entity_key) {
        return Ok(());
    }
    ctx.state_writer().append_follow_up_event(
        role_key,
        Intent::EntityAdded,
        RoleRecord {
            role_key,
            name: role_name.to_string(),
            entity_key,
            entity_type,
        },
    )
}

pub struct IdentitySetupInitializeProcessor;

impl DistributedProcessor for IdentitySetupInitializeProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(setup) = command.value.as_identity_setup().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        // a restart may find an unprocessed INITIALIZE behind the one that won
        if ctx.state().identity_initialized {
            event!(Level::DEBUG, "identity setup already initialized");
            ctx.reject(
                command,
                Rejection::already_exists(
                    "Expected to initialize identity setup, but it was already initialized.",
                ),
            );
            return Ok(());
        }
        let cost = ctx.config().security.password_hash_cost;
        let resolved = initialize(ctx, setup, Some(cost))?;

        let key = ctx.next_key();
        ctx.state_writer()
            .append_follow_up_event(key, Intent::Initialized, resolved.clone())?;
        ctx.response_writer()
            .write_event_on_command(key, Intent::Initialized, resolved.clone(), command);
        event!(
            Level::INFO,
            roles = resolved.roles.len(),
            users = resolved.users.len(),
            mappings = resolved.mappings.len(),
            "identity setup initialized"
        );
        ctx.command_distribution()
            .with_key(key)
            .in_queue(DistributionQueue::Identity)
            .distribute(&command.with_value(resolved))
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(setup) = command.value.as_identity_setup().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        let resolved = initialize(ctx, setup, None)?;
        ctx.state_writer()
            .append_follow_up_event(command.key, Intent::Initialized, resolved)?;
        ctx.command_distribution().acknowledge_command(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_gets_every_supported_permission() {
        let setup = identity_setup_record(&SecurityConfig::default());
        let admin = &setup.roles[0];
        assert_eq!(admin.role.name, ADMIN_ROLE_NAME);

        let expected: usize = ResourceType::ALL
            .iter()
            .map(|resource_type| resource_type.supported_permissions().len())
            .sum();
        assert_eq!(admin.permissions.len(), expected);
        assert!(
            admin
                .permissions
                .iter()
                .all(|grant| grant.resource_ids.contains(WILDCARD_RESOURCE_ID))
        );
    }

    #[test]
    fn configured_users_and_default_tenant_are_included() {
        let setup = identity_setup_record(&SecurityConfig::default());
        assert_eq!(setup.users.len(), 1);
        assert_eq!(setup.users[0].username, "demo");
        assert_eq!(setup.users[0].user_key, NO_KEY);
        assert_eq!(setup.default_tenant.tenant_id, DEFAULT_TENANT_ID);
    }

    #[test]
    fn initializer_writes_the_command_once() {
        let mut initializer = IdentitySetupInitializer::new(&SecurityConfig::default());
        let mut result = crate::stream::ProcessingResultBuilder::for_task(1);
        {
            let mut context = TaskContext::new(1, None, &mut result);
            initializer.execute(&mut context).unwrap();
            initializer.execute(&mut context).unwrap();
        }
        assert_eq!(result.records().len(), 1);
        assert_eq!(result.records()[0].intent, Intent::Initialize);
    }
}
