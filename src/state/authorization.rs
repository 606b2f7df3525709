use crate::protocol::{AuthorizationRecord, PermissionType, ResourceType};
use std::collections::{BTreeSet, HashMap};

type PermissionKey = (i64, ResourceType, PermissionType);

/// Resource ids granted per owner, resource type and permission.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationState {
    permissions: HashMap<PermissionKey, BTreeSet<String>>,
}

impl AuthorizationState {
    pub fn add(&mut self, record: &AuthorizationRecord) {
        self.permissions
            .entry((record.owner_key, record.resource_type, record.permission_type))
            .or_default()
            .extend(record.resource_ids.iter().cloned());
    }

    pub fn remove(&mut self, record: &AuthorizationRecord) {
        let key = (record.owner_key, record.resource_type, record.permission_type);
        if let Some(resource_ids) = self.permissions.get_mut(&key) {
            for resource_id in &record.resource_ids {
                resource_ids.remove(resource_id);
            }
            if resource_ids.is_empty() {
                self.permissions.remove(&key);
            }
        }
    }

    pub fn remove_owner(&mut self, owner_key: i64) {
        self.permissions.retain(|(owner, _, _), _| *owner != owner_key);
    }

    pub fn resource_ids(
        &self,
        owner_key: i64,
        resource_type: ResourceType,
        permission_type: PermissionType,
    ) -> Option<&BTreeSet<String>> {
        self.permissions
            .get(&(owner_key, resource_type, permission_type))
    }

    /// True when every id of `record` is currently granted.
    pub fn contains_all(&self, record: &AuthorizationRecord) -> bool {
        self.resource_ids(record.owner_key, record.resource_type, record.permission_type)
            .map(|granted| record.resource_ids.is_subset(granted))
            .unwrap_or(false)
    }
}
