use crate::config::SecurityConfig;
use crate::protocol::{
    Authentication, PermissionType, Record, Rejection, ResourceType, WILDCARD_RESOURCE_ID,
};
use crate::state::ProcessingState;
use std::collections::BTreeSet;
use tracing::{Level, event};

/// What a command needs permission for.
///
/// `resource_ids` lists every identifier the target resource is known by; a
/// grant on any of them, or on the wildcard, is sufficient.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'r> {
    command: &'r Record,
    resource_type: ResourceType,
    permission_type: PermissionType,
    resource_ids: BTreeSet<String>,
}

impl<'r> AuthorizationRequest<'r> {
    pub fn new(command: &'r Record, resource_type: ResourceType, permission_type: PermissionType) -> Self {
        Self {
            command,
            resource_type,
            permission_type,
            resource_ids: BTreeSet::new(),
        }
    }

    pub fn add_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_ids.insert(resource_id.into());
        self
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn permission_type(&self) -> PermissionType {
        self.permission_type
    }
}

/// Decides whether the caller of a command holds the required permission.
#[derive(Debug, Clone)]
pub struct AuthorizationCheckBehavior {
    authorizations_enabled: bool,
    multi_tenancy_enabled: bool,
}

impl AuthorizationCheckBehavior {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            authorizations_enabled: config.authorizations_enabled,
            multi_tenancy_enabled: config.multi_tenancy_enabled,
        }
    }

    pub fn is_authorized(&self, state: &ProcessingState, request: &AuthorizationRequest<'_>) -> bool {
        if !self.authorizations_enabled {
            return true;
        }
        let command = request.command;
        // distributed commands were authorized on their origin partition
        if command.is_distributed() {
            return true;
        }
        let Some(authentication) = &command.authentication else {
            // engine-internal command
            return true;
        };

        let owners = owner_keys(state, authentication);
        let authorized = owners.iter().any(|owner_key| {
            state
                .authorizations
                .resource_ids(*owner_key, request.resource_type, request.permission_type)
                .map(|granted| {
                    granted.contains(WILDCARD_RESOURCE_ID)
                        || request.resource_ids.iter().any(|id| granted.contains(id))
                })
                .unwrap_or(false)
        });

        if !authorized {
            event!(
                Level::DEBUG,
                username = %authentication.username,
                resource_type = %request.resource_type,
                permission_type = %request.permission_type,
                "permission denied"
            );
        }
        authorized
    }

    /// True when the caller may see data of `tenant_id`.
    pub fn is_authorized_for_tenant(&self, command: &Record, tenant_id: &str) -> bool {
        if !self.multi_tenancy_enabled || command.is_distributed() {
            return true;
        }
        match &command.authentication {
            Some(authentication) => authentication
                .authorized_tenant_ids
                .iter()
                .any(|id| id == tenant_id),
            None => true,
        }
    }
}

/// Builds the rejection for a failed permission check. `description` names
/// the concrete resource, e.g. `group name 'ops'`.
pub fn unauthorized(request: &AuthorizationRequest<'_>, description: Option<&str>) -> Rejection {
    let mut reason = format!(
        "Unauthorized to perform operation '{}' on resource '{}'",
        request.permission_type, request.resource_type
    );
    if let Some(description) = description {
        reason.push_str(" with ");
        reason.push_str(description);
    }
    Rejection::unauthorized(reason)
}

/// The user itself plus its roles, its groups and the roles of its groups.
fn owner_keys(state: &ProcessingState, authentication: &Authentication) -> BTreeSet<i64> {
    let mut owners = BTreeSet::new();
    let Some(user) = state.users.get_by_username(&authentication.username) else {
        return owners;
    };
    owners.insert(user.user_key);
    owners.extend(state.roles.memberships_of(user.user_key));
    for group_key in state.groups.memberships_of(user.user_key) {
        owners.insert(group_key);
        owners.extend(state.roles.memberships_of(group_key));
    }
    owners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AuthorizationRecord, EntityType, GroupRecord, Intent, UserRecord};

    fn state_with_user() -> ProcessingState {
        let mut state = ProcessingState::new(1);
        state.users.insert(UserRecord {
            user_key: 10,
            username: "alice".to_string(),
            ..Default::default()
        });
        state
    }

    fn command() -> Record {
        Record::command(1, -1, Intent::Create, GroupRecord::default())
            .with_authentication(Authentication::user("alice"))
    }

    fn checker() -> AuthorizationCheckBehavior {
        AuthorizationCheckBehavior::new(&SecurityConfig::default())
    }

    #[test]
    fn denies_without_grant() {
        let state = state_with_user();
        let command = command();
        let request = AuthorizationRequest::new(&command, ResourceType::Group, PermissionType::Create);
        assert!(!checker().is_authorized(&state, &request));
    }

    #[test]
    fn role_of_group_grants_access() {
        let mut state = state_with_user();
        state.groups.create(20, "ops", "");
        state.groups.add_member(20, 10, EntityType::User);
        state.roles.create(30, "ops-admin", "");
        state.roles.add_member(30, 20, EntityType::Group);
        state.authorizations.add(
            &AuthorizationRecord::new(30, EntityType::Role, ResourceType::Group, PermissionType::Create)
                .with_resource_id("ops"),
        );

        let command = command();
        let request = AuthorizationRequest::new(&command, ResourceType::Group, PermissionType::Create)
            .add_resource_id("ops");
        assert!(checker().is_authorized(&state, &request));

        let other = AuthorizationRequest::new(&command, ResourceType::Group, PermissionType::Create)
            .add_resource_id("dev");
        assert!(!checker().is_authorized(&state, &other));
    }

    #[test]
    fn wildcard_matches_any_resource() {
        let mut state = state_with_user();
        state.authorizations.add(
            &AuthorizationRecord::new(10, EntityType::User, ResourceType::User, PermissionType::Create)
                .with_resource_id(WILDCARD_RESOURCE_ID),
        );
        let command = command();
        let request = AuthorizationRequest::new(&command, ResourceType::User, PermissionType::Create);
        assert!(checker().is_authorized(&state, &request));
    }

    #[test]
    fn internal_commands_are_always_allowed() {
        let state = ProcessingState::new(1);
        let command = Record::command(1, -1, Intent::Create, GroupRecord::default());
        let request = AuthorizationRequest::new(&command, ResourceType::Group, PermissionType::Create);
        assert!(checker().is_authorized(&state, &request));
    }

    #[test]
    fn rejection_names_operation_and_resource() {
        let command = command();
        let request = AuthorizationRequest::new(&command, ResourceType::User, PermissionType::Create);
        assert_eq!(
            unauthorized(&request, None).reason,
            "Unauthorized to perform operation 'CREATE' on resource 'USER'"
        );
        assert_eq!(
            unauthorized(&request, Some("username 'bob'")).reason,
            "Unauthorized to perform operation 'CREATE' on resource 'USER' with username 'bob'"
        );
    }
}
