//! Records, intents and typed values moving through a partition.

pub mod distribution;
pub mod identity;
pub mod intent;
pub mod job;
pub mod record;
pub mod rejection;
pub mod user_task;
pub mod value;

pub use distribution::{CommandDistributionRecord, DistributionQueue};
pub use identity::{
    AuthorizationRecord, DEFAULT_TENANT_ID, EntityType, GroupRecord, IdentitySetupRecord,
    MappingRecord, PermissionGrant, PermissionType, ResourceType, RoleRecord, RoleSetup,
    TenantRecord, UserRecord, WILDCARD_RESOURCE_ID,
};
pub use intent::{Intent, RecordType, ValueType};
pub use job::{ErrorType, IncidentRecord, JobKind, JobRecord, NO_RETRIES_LEFT_MESSAGE};
pub use record::{Authentication, DistributionMetadata, NO_KEY, Record, RequestMetadata};
pub use rejection::{Rejection, RejectionType};
pub use user_task::{
    LifecycleState, TaskListener, TaskListenerEventType, UserTaskFinalizer, UserTaskRecord,
    Variables,
};
pub use value::RecordValue;

/// Partition that owns deployments and bootstrap work.
pub const DEPLOYMENT_PARTITION: u32 = 1;

const PARTITION_ID_SHIFT: u32 = 51;
const KEY_MASK: i64 = (1 << PARTITION_ID_SHIFT) - 1;

/// Encodes the partition id into the high bits of a key.
pub fn encode_partition_id(partition_id: u32, key: i64) -> i64 {
    ((partition_id as i64) << PARTITION_ID_SHIFT) + key
}

pub fn decode_partition_id(key: i64) -> u32 {
    (key >> PARTITION_ID_SHIFT) as u32
}

pub fn decode_key_in_partition(key: i64) -> i64 {
    key & KEY_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_their_partition() {
        let key = encode_partition_id(3, 42);
        assert_eq!(decode_partition_id(key), 3);
        assert_eq!(decode_key_in_partition(key), 42);
    }

    #[test]
    fn record_value_serializes_with_type_tag() {
        let value = RecordValue::Group(GroupRecord {
            group_key: 7,
            name: "ops".to_string(),
            ..Default::default()
        });
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["type"], "GROUP");
        assert_eq!(json["data"]["name"], "ops");

        let back: RecordValue = serde_json::from_value(json).unwrap();
        assert_eq!(back.value_type(), ValueType::Group);
    }

    #[test]
    fn distributed_flag_depends_on_origin() {
        let mut command = Record::command(2, 1, Intent::Create, GroupRecord::default());
        assert!(!command.is_distributed());

        command.distribution = Some(DistributionMetadata {
            distribution_key: 1,
            origin_partition_id: 1,
            queue: None,
        });
        assert!(command.is_distributed());
    }
}
