use crate::protocol::{EntityType, MappingRecord, UserRecord};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct UserState {
    by_key: BTreeMap<i64, UserRecord>,
    by_username: HashMap<String, i64>,
}

impl UserState {
    pub fn get(&self, user_key: i64) -> Option<&UserRecord> {
        self.by_key.get(&user_key)
    }

    pub fn get_by_username(&self, username: &str) -> Option<&UserRecord> {
        self.by_username
            .get(username)
            .and_then(|key| self.by_key.get(key))
    }

    pub fn insert(&mut self, user: UserRecord) {
        self.by_username.insert(user.username.clone(), user.user_key);
        self.by_key.insert(user.user_key, user);
    }

    pub fn remove(&mut self, user_key: i64) -> Option<UserRecord> {
        let user = self.by_key.remove(&user_key)?;
        self.by_username.remove(&user.username);
        Some(user)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// A group, role or tenant: a uniquely named entity with members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipEntity {
    pub key: i64,
    /// Group name, role name or tenant id.
    pub name: String,
    pub display_name: String,
    pub members: BTreeMap<i64, EntityType>,
}

#[derive(Debug, Clone, Default)]
pub struct MembershipState {
    by_key: BTreeMap<i64, MembershipEntity>,
    by_name: HashMap<String, i64>,
}

impl MembershipState {
    pub fn get(&self, key: i64) -> Option<&MembershipEntity> {
        self.by_key.get(&key)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&MembershipEntity> {
        self.by_name.get(name).and_then(|key| self.by_key.get(key))
    }

    pub fn create(&mut self, key: i64, name: &str, display_name: &str) {
        self.by_name.insert(name.to_string(), key);
        self.by_key.insert(
            key,
            MembershipEntity {
                key,
                name: name.to_string(),
                display_name: display_name.to_string(),
                members: BTreeMap::new(),
            },
        );
    }

    pub fn rename(&mut self, key: i64, new_name: &str) {
        if let Some(entity) = self.by_key.get_mut(&key) {
            self.by_name.remove(&entity.name);
            entity.name = new_name.to_string();
            self.by_name.insert(new_name.to_string(), key);
        }
    }

    pub fn delete(&mut self, key: i64) -> Option<MembershipEntity> {
        let entity = self.by_key.remove(&key)?;
        self.by_name.remove(&entity.name);
        Some(entity)
    }

    pub fn add_member(&mut self, key: i64, entity_key: i64, entity_type: EntityType) {
        if let Some(entity) = self.by_key.get_mut(&key) {
            entity.members.insert(entity_key, entity_type);
        }
    }

    pub fn remove_member(&mut self, key: i64, entity_key: i64) {
        if let Some(entity) = self.by_key.get_mut(&key) {
            entity.members.remove(&entity_key);
        }
    }

    /// Drops the entity from every membership it holds.
    pub fn remove_member_everywhere(&mut self, entity_key: i64) {
        for entity in self.by_key.values_mut() {
            entity.members.remove(&entity_key);
        }
    }

    pub fn is_member(&self, key: i64, entity_key: i64) -> bool {
        self.by_key
            .get(&key)
            .map(|entity| entity.members.contains_key(&entity_key))
            .unwrap_or(false)
    }

    /// Keys of all entities the given member belongs to.
    pub fn memberships_of(&self, entity_key: i64) -> Vec<i64> {
        self.by_key
            .values()
            .filter(|entity| entity.members.contains_key(&entity_key))
            .map(|entity| entity.key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MappingState {
    by_key: BTreeMap<i64, MappingRecord>,
    by_claim: HashMap<(String, String), i64>,
}

impl MappingState {
    pub fn get(&self, mapping_key: i64) -> Option<&MappingRecord> {
        self.by_key.get(&mapping_key)
    }

    pub fn get_by_claim(&self, claim_name: &str, claim_value: &str) -> Option<&MappingRecord> {
        self.by_claim
            .get(&(claim_name.to_string(), claim_value.to_string()))
            .and_then(|key| self.by_key.get(key))
    }

    pub fn insert(&mut self, mapping: MappingRecord) {
        self.by_claim.insert(
            (mapping.claim_name.clone(), mapping.claim_value.clone()),
            mapping.mapping_key,
        );
        self.by_key.insert(mapping.mapping_key, mapping);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_updates_the_name_index() {
        let mut groups = MembershipState::default();
        groups.create(1, "ops", "");
        groups.rename(1, "sre");

        assert!(groups.get_by_name("ops").is_none());
        assert_eq!(groups.get_by_name("sre").unwrap().key, 1);
    }

    #[test]
    fn memberships_are_tracked_per_entity() {
        let mut roles = MembershipState::default();
        roles.create(10, "admin", "");
        roles.create(11, "viewer", "");
        roles.add_member(10, 5, EntityType::User);
        roles.add_member(11, 5, EntityType::User);

        assert_eq!(roles.memberships_of(5), vec![10, 11]);
        roles.remove_member_everywhere(5);
        assert!(roles.memberships_of(5).is_empty());
    }
}
