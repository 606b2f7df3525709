//! Processors of users, groups, roles, tenants, mappings and permissions.
//!
//! Every identity command is validated on the partition that received it and
//! then distributed through the `IDENTITY` queue, so all partitions apply the
//! changes in the same order.

pub mod authorization;
pub mod group;
pub mod role;
pub mod setup;
pub mod tenant;
pub mod user;

pub use authorization::{AddPermissionProcessor, RemovePermissionProcessor};
pub use group::{
    GroupAddEntityProcessor, GroupCreateProcessor, GroupDeleteProcessor,
    GroupRemoveEntityProcessor, GroupUpdateProcessor,
};
pub use role::{RoleAddEntityProcessor, RoleCreateProcessor};
pub use setup::{IdentitySetupInitializeProcessor, IdentitySetupInitializer, identity_setup_record};
pub use tenant::{TenantAddEntityProcessor, TenantCreateProcessor};
pub use user::{UserCreateProcessor, UserDeleteProcessor};

use crate::protocol::EntityType;
use crate::state::ProcessingState;

pub(crate) fn entity_exists(state: &ProcessingState, entity_key: i64, entity_type: EntityType) -> bool {
    match entity_type {
        EntityType::User => state.users.get(entity_key).is_some(),
        EntityType::Group => state.groups.get(entity_key).is_some(),
        EntityType::Role => state.roles.get(entity_key).is_some(),
        EntityType::Mapping => state.mappings.get(entity_key).is_some(),
        EntityType::Unspecified => false,
    }
}

/// Kind of entity a permission owner key refers to.
pub(crate) fn owner_type_of(state: &ProcessingState, owner_key: i64) -> Option<EntityType> {
    [
        EntityType::User,
        EntityType::Group,
        EntityType::Role,
        EntityType::Mapping,
    ]
    .into_iter()
    .find(|entity_type| entity_exists(state, owner_key, *entity_type))
}
