//! Business state of one partition.
//!
//! The state is owned by the partition's stream processor and only changes
//! through [`appliers::EventAppliers`], both while processing and on replay.

pub mod appliers;
pub mod authorization;
pub mod distribution;
pub mod identity;
pub mod job;
pub mod key_generator;
pub mod user_task;

pub use appliers::EventAppliers;
pub use authorization::AuthorizationState;
pub use distribution::{DistributionState, PendingDistribution};
pub use identity::{MappingState, MembershipEntity, MembershipState, UserState};
pub use job::{IncidentState, JobEntry, JobState, JobStatus};
pub use key_generator::KeyGenerator;
pub use user_task::{PendingTransition, UserTaskEntry, UserTaskState};

#[derive(Debug, Clone)]
pub struct ProcessingState {
    partition_id: u32,
    pub(crate) key_generator: KeyGenerator,
    pub users: UserState,
    pub groups: MembershipState,
    pub roles: MembershipState,
    pub tenants: MembershipState,
    pub mappings: MappingState,
    pub authorizations: AuthorizationState,
    pub user_tasks: UserTaskState,
    pub jobs: JobState,
    pub incidents: IncidentState,
    pub distribution: DistributionState,
    pub identity_initialized: bool,
}

impl ProcessingState {
    pub fn new(partition_id: u32) -> Self {
        Self {
            partition_id,
            key_generator: KeyGenerator::new(partition_id),
            users: UserState::default(),
            groups: MembershipState::default(),
            roles: MembershipState::default(),
            tenants: MembershipState::default(),
            mappings: MappingState::default(),
            authorizations: AuthorizationState::default(),
            user_tasks: UserTaskState::default(),
            jobs: JobState::default(),
            incidents: IncidentState::default(),
            distribution: DistributionState::default(),
            identity_initialized: false,
        }
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn key_generator(&self) -> &KeyGenerator {
        &self.key_generator
    }
}
