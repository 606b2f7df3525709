use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_TENANT_ID: &str = "<default>";
pub const WILDCARD_RESOURCE_ID: &str = "*";

/// Kind of entity that can be a member of a group, role or tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    #[default]
    Unspecified,
    User,
    Group,
    Role,
    Mapping,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityType::Unspecified => "UNSPECIFIED",
            EntityType::User => "USER",
            EntityType::Group => "GROUP",
            EntityType::Role => "ROLE",
            EntityType::Mapping => "MAPPING",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Authorization,
    Group,
    Mapping,
    Message,
    ProcessDefinition,
    Resource,
    Role,
    System,
    Tenant,
    User,
}

impl ResourceType {
    pub const ALL: [ResourceType; 10] = [
        ResourceType::Authorization,
        ResourceType::Group,
        ResourceType::Mapping,
        ResourceType::Message,
        ResourceType::ProcessDefinition,
        ResourceType::Resource,
        ResourceType::Role,
        ResourceType::System,
        ResourceType::Tenant,
        ResourceType::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Authorization => "AUTHORIZATION",
            ResourceType::Group => "GROUP",
            ResourceType::Mapping => "MAPPING",
            ResourceType::Message => "MESSAGE",
            ResourceType::ProcessDefinition => "PROCESS_DEFINITION",
            ResourceType::Resource => "RESOURCE",
            ResourceType::Role => "ROLE",
            ResourceType::System => "SYSTEM",
            ResourceType::Tenant => "TENANT",
            ResourceType::User => "USER",
        }
    }

    /// Permissions that can be granted on this resource type.
    pub fn supported_permissions(&self) -> &'static [PermissionType] {
        use PermissionType::*;
        match self {
            ResourceType::ProcessDefinition => &[
                Create,
                Read,
                Update,
                Delete,
                ReadProcessDefinition,
                CreateProcessInstance,
                UpdateProcessInstance,
            ],
            ResourceType::Message => &[Create, Read],
            ResourceType::Resource => &[Create, Read, Delete],
            ResourceType::System => &[Read, Update],
            _ => &[Create, Read, Update, Delete],
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionType {
    Create,
    Read,
    Update,
    Delete,
    ReadProcessDefinition,
    CreateProcessInstance,
    UpdateProcessInstance,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Create => "CREATE",
            PermissionType::Read => "READ",
            PermissionType::Update => "UPDATE",
            PermissionType::Delete => "DELETE",
            PermissionType::ReadProcessDefinition => "READ_PROCESS_DEFINITION",
            PermissionType::CreateProcessInstance => "CREATE_PROCESS_INSTANCE",
            PermissionType::UpdateProcessInstance => "UPDATE_PROCESS_INSTANCE",
        }
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_key: i64,
    pub username: String,
    pub name: String,
    pub email: String,
    /// Plain text on commands, a bcrypt hash on events.
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group_key: i64,
    pub name: String,
    pub entity_key: i64,
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleRecord {
    pub role_key: i64,
    pub name: String,
    pub entity_key: i64,
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TenantRecord {
    pub tenant_key: i64,
    pub tenant_id: String,
    pub name: String,
    pub entity_key: i64,
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingRecord {
    pub mapping_key: i64,
    pub claim_name: String,
    pub claim_value: String,
    pub name: String,
}

/// A single permission grant (or revocation) for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub owner_key: i64,
    pub owner_type: EntityType,
    pub resource_type: ResourceType,
    pub permission_type: PermissionType,
    pub resource_ids: BTreeSet<String>,
}

impl AuthorizationRecord {
    pub fn new(
        owner_key: i64,
        owner_type: EntityType,
        resource_type: ResourceType,
        permission_type: PermissionType,
    ) -> Self {
        Self {
            owner_key,
            owner_type,
            resource_type,
            permission_type,
            resource_ids: BTreeSet::new(),
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_ids.insert(resource_id.into());
        self
    }
}

/// Permission a bootstrap role receives, before its owner key is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub resource_type: ResourceType,
    pub permission_type: PermissionType,
    pub resource_ids: BTreeSet<String>,
}

impl PermissionGrant {
    pub fn new(resource_type: ResourceType, permission_type: PermissionType, resource_id: &str) -> Self {
        Self {
            resource_type,
            permission_type,
            resource_ids: BTreeSet::from([resource_id.to_string()]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleSetup {
    pub role: RoleRecord,
    pub permissions: Vec<PermissionGrant>,
}

/// Bootstrap content written once after the deployment partition recovers.
///
/// Keys are `-1` on the initialize command; the processing partition resolves
/// them before distributing the record to the other partitions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentitySetupRecord {
    pub roles: Vec<RoleSetup>,
    /// Name of the role every configured user is added to.
    pub admin_role_name: String,
    pub users: Vec<UserRecord>,
    pub mappings: Vec<MappingRecord>,
    pub default_tenant: TenantRecord,
}
