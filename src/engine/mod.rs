// ============================================================================
// Engine: command processors of one partition
// ============================================================================

pub mod authorization;
pub mod context;
pub mod distribution;
pub mod identity;
pub mod incident;
pub mod job;
pub mod processors;
pub mod user_task;

pub use authorization::{AuthorizationCheckBehavior, AuthorizationRequest};
pub use context::{EngineContext, ProcessingContext};
pub use distribution::{
    CommandDistributionAcknowledgeProcessor, CommandDistributionBehavior, CommandRedistributor,
};
pub use processors::{CommandProcessor, DistributedProcessor, RecordProcessors, SimpleProcessor};

use crate::config::EngineConfig;
use crate::core::Result;
use crate::protocol::{DEPLOYMENT_PARTITION, Intent, Record, Rejection, ValueType};
use crate::state::ProcessingState;
use crate::stream::{ProcessingResultBuilder, RecordProcessor, RecoveredContext};
use identity::{
    AddPermissionProcessor, GroupAddEntityProcessor, GroupCreateProcessor, GroupDeleteProcessor,
    GroupRemoveEntityProcessor, GroupUpdateProcessor, IdentitySetupInitializeProcessor,
    IdentitySetupInitializer, RemovePermissionProcessor, RoleAddEntityProcessor,
    RoleCreateProcessor, TenantAddEntityProcessor, TenantCreateProcessor, UserCreateProcessor,
    UserDeleteProcessor,
};
use incident::IncidentResolveProcessor;
use job::{JobCompleteProcessor, JobFailProcessor, JobUpdateRetriesProcessor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, event};
use user_task::{UserTaskCreateProcessor, UserTaskProcessor};

/// Rejects a command whose value does not match its value type.
pub(crate) fn reject_unexpected_value(command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
    ctx.reject(
        command,
        Rejection::invalid_argument(format!(
            "Expected to process command {}:{}, but its value is not supported by this processor",
            command.value_type(),
            command.intent
        )),
    );
    Ok(())
}

/// The dispatch table of every command the engine understands.
pub fn default_processors() -> RecordProcessors {
    let user_tasks: Arc<dyn CommandProcessor> = Arc::new(UserTaskProcessor::default());

    let mut processors = RecordProcessors::new()
        .with_distributed(ValueType::User, Intent::Create, UserCreateProcessor)
        .with_distributed(ValueType::User, Intent::Delete, UserDeleteProcessor)
        .with_distributed(ValueType::Group, Intent::Create, GroupCreateProcessor)
        .with_distributed(ValueType::Group, Intent::Update, GroupUpdateProcessor)
        .with_distributed(ValueType::Group, Intent::Delete, GroupDeleteProcessor)
        .with_distributed(ValueType::Group, Intent::AddEntity, GroupAddEntityProcessor)
        .with_distributed(ValueType::Group, Intent::RemoveEntity, GroupRemoveEntityProcessor)
        .with_distributed(ValueType::Role, Intent::Create, RoleCreateProcessor)
        .with_distributed(ValueType::Role, Intent::AddEntity, RoleAddEntityProcessor)
        .with_distributed(ValueType::Tenant, Intent::Create, TenantCreateProcessor)
        .with_distributed(ValueType::Tenant, Intent::AddEntity, TenantAddEntityProcessor)
        .with_distributed(ValueType::Authorization, Intent::AddPermission, AddPermissionProcessor)
        .with_distributed(
            ValueType::Authorization,
            Intent::RemovePermission,
            RemovePermissionProcessor,
        )
        .with_distributed(
            ValueType::IdentitySetup,
            Intent::Initialize,
            IdentitySetupInitializeProcessor,
        )
        .with_processor(ValueType::UserTask, Intent::Create, Arc::new(UserTaskCreateProcessor))
        .with_simple(ValueType::Job, Intent::Complete, JobCompleteProcessor)
        .with_simple(ValueType::Job, Intent::Fail, JobFailProcessor)
        .with_simple(ValueType::Job, Intent::UpdateRetries, JobUpdateRetriesProcessor)
        .with_simple(ValueType::Incident, Intent::Resolve, IncidentResolveProcessor)
        .with_processor(
            ValueType::CommandDistribution,
            Intent::Acknowledge,
            Arc::new(CommandDistributionAcknowledgeProcessor),
        );

    for intent in [
        Intent::Claim,
        Intent::Assign,
        Intent::Update,
        Intent::Complete,
        Intent::Cancel,
        Intent::CompleteTaskListener,
    ] {
        processors = processors.with_processor(ValueType::UserTask, intent, user_tasks.clone());
    }
    processors
}

/// Processes the commands of one partition.
pub struct Engine {
    context: EngineContext,
    processors: RecordProcessors,
}

impl Engine {
    pub fn new(partition_id: u32, partition_count: u32, config: Arc<EngineConfig>) -> Self {
        Self {
            context: EngineContext::new(partition_id, partition_count, config),
            processors: default_processors(),
        }
    }

    pub fn partition_id(&self) -> u32 {
        self.context.partition_id
    }

    pub fn processors(&self) -> &RecordProcessors {
        &self.processors
    }
}

impl RecordProcessor for Engine {
    fn process(
        &self,
        command: &Record,
        state: &mut ProcessingState,
        result: &mut ProcessingResultBuilder,
    ) -> Result<()> {
        let mut ctx = ProcessingContext::new(state, result, &self.context);
        match self.processors.get(command.value_type(), command.intent) {
            Some(processor) => processor.process(command, &mut ctx),
            None => {
                event!(
                    Level::WARN,
                    value_type = %command.value_type(),
                    intent = %command.intent,
                    "no processor registered"
                );
                ctx.reject(
                    command,
                    Rejection::invalid_argument(format!(
                        "Expected to process command {}:{}, but no processor is registered for it",
                        command.value_type(),
                        command.intent
                    )),
                );
                Ok(())
            }
        }
    }

    fn on_recovered(&self, context: &RecoveredContext<'_>) {
        let config = &self.context.config;
        context.schedule.run_at_fixed_rate(
            config.distribution.redistribution_interval(),
            CommandRedistributor::new(&config.distribution),
        );

        if !config.feature_flags.enable_identity_setup {
            return;
        }
        if context.partition_id != DEPLOYMENT_PARTITION {
            event!(
                Level::DEBUG,
                partition = context.partition_id,
                "identity setup only runs on the deployment partition"
            );
            return;
        }
        if context.state.identity_initialized {
            return;
        }
        context
            .schedule
            .run_delayed_async(Duration::ZERO, IdentitySetupInitializer::new(&config.security));
    }
}
