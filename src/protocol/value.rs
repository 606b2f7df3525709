use super::distribution::CommandDistributionRecord;
use super::identity::{
    AuthorizationRecord, GroupRecord, IdentitySetupRecord, MappingRecord, RoleRecord, TenantRecord,
    UserRecord,
};
use super::intent::ValueType;
use super::job::{IncidentRecord, JobRecord};
use super::user_task::UserTaskRecord;
use serde::{Deserialize, Serialize};

/// Typed payload of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordValue {
    User(UserRecord),
    Group(GroupRecord),
    Role(RoleRecord),
    Tenant(TenantRecord),
    Mapping(MappingRecord),
    Authorization(AuthorizationRecord),
    IdentitySetup(IdentitySetupRecord),
    UserTask(UserTaskRecord),
    Job(JobRecord),
    Incident(IncidentRecord),
    CommandDistribution(CommandDistributionRecord),
}

macro_rules! value_accessors {
    ($($variant:ident => $as_fn:ident, $ty:ty;)*) => {
        impl RecordValue {
            pub fn value_type(&self) -> ValueType {
                match self {
                    $(RecordValue::$variant(_) => ValueType::$variant,)*
                }
            }

            $(
                pub fn $as_fn(&self) -> Option<&$ty> {
                    match self {
                        RecordValue::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<$ty> for RecordValue {
                fn from(value: $ty) -> Self {
                    RecordValue::$variant(value)
                }
            }
        )*
    };
}

value_accessors! {
    User => as_user, UserRecord;
    Group => as_group, GroupRecord;
    Role => as_role, RoleRecord;
    Tenant => as_tenant, TenantRecord;
    Mapping => as_mapping, MappingRecord;
    Authorization => as_authorization, AuthorizationRecord;
    IdentitySetup => as_identity_setup, IdentitySetupRecord;
    UserTask => as_user_task, UserTaskRecord;
    Job => as_job, JobRecord;
    Incident => as_incident, IncidentRecord;
    CommandDistribution => as_command_distribution, CommandDistributionRecord;
}
