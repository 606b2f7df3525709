use super::authorization::{AuthorizationCheckBehavior, AuthorizationRequest};
use super::distribution::CommandDistributionBehavior;
use crate::config::EngineConfig;
use crate::protocol::{Record, Rejection};
use crate::state::ProcessingState;
use crate::stream::{
    CommandWriter, ProcessingResultBuilder, RejectionWriter, ResponseWriter, SideEffectWriter,
    StateWriter,
};
use std::sync::Arc;

/// Per-partition collaborators shared by all processors.
pub struct EngineContext {
    pub partition_id: u32,
    pub partition_count: u32,
    pub config: Arc<EngineConfig>,
    pub authorization: AuthorizationCheckBehavior,
}

impl EngineContext {
    pub fn new(partition_id: u32, partition_count: u32, config: Arc<EngineConfig>) -> Self {
        let authorization = AuthorizationCheckBehavior::new(&config.security);
        Self {
            partition_id,
            partition_count,
            config,
            authorization,
        }
    }
}

/// Everything a processor may touch while handling one command.
///
/// The state is read directly; it is only changed through the state writer.
pub struct ProcessingContext<'a> {
    state: &'a mut ProcessingState,
    result: &'a mut ProcessingResultBuilder,
    engine: &'a EngineContext,
}

impl<'a> ProcessingContext<'a> {
    pub fn new(
        state: &'a mut ProcessingState,
        result: &'a mut ProcessingResultBuilder,
        engine: &'a EngineContext,
    ) -> Self {
        Self {
            state,
            result,
            engine,
        }
    }

    pub fn state(&self) -> &ProcessingState {
        self.state
    }

    pub fn partition_id(&self) -> u32 {
        self.engine.partition_id
    }

    pub fn partition_count(&self) -> u32 {
        self.engine.partition_count
    }

    pub fn config(&self) -> &EngineConfig {
        &self.engine.config
    }

    pub fn next_key(&mut self) -> i64 {
        self.state.key_generator.next_key()
    }

    pub fn state_writer(&mut self) -> StateWriter<'_> {
        StateWriter::new(self.state, self.result)
    }

    pub fn command_writer(&mut self) -> CommandWriter<'_> {
        CommandWriter::new(self.result)
    }

    pub fn response_writer(&mut self) -> ResponseWriter<'_> {
        ResponseWriter::new(self.result)
    }

    pub fn rejection_writer(&mut self) -> RejectionWriter<'_> {
        RejectionWriter::new(self.result)
    }

    pub fn side_effect_writer(&mut self) -> SideEffectWriter<'_> {
        SideEffectWriter::new(self.result)
    }

    pub fn command_distribution(&mut self) -> CommandDistributionBehavior<'_, 'a> {
        CommandDistributionBehavior::new(self)
    }

    pub fn is_authorized(&self, request: &AuthorizationRequest<'_>) -> bool {
        self.engine.authorization.is_authorized(self.state, request)
    }

    pub fn is_authorized_for_tenant(&self, command: &Record, tenant_id: &str) -> bool {
        self.engine
            .authorization
            .is_authorized_for_tenant(command, tenant_id)
    }

    /// Writes the rejection record and, if requested, the rejection response.
    pub fn reject(&mut self, command: &Record, rejection: Rejection) {
        self.rejection_writer().append_rejection(command, rejection);
    }

    #[cfg(test)]
    pub(crate) fn result(&self) -> &ProcessingResultBuilder {
        self.result
    }
}
