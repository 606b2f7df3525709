//! Processor shapes and the `(ValueType, Intent)` dispatch table.

use super::context::ProcessingContext;
use crate::core::Result;
use crate::protocol::{Intent, Record, Rejection, ValueType};
use std::collections::HashMap;
use std::sync::Arc;

/// A processor that writes its whole output itself.
pub trait CommandProcessor: Send + Sync {
    fn process(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()>;
}

/// Validate-then-apply processor.
///
/// `validate` must not mutate anything; a rejection it returns is written by
/// the dispatcher. `apply` performs the mutation and must not fail for
/// business reasons.
pub trait SimpleProcessor: Send + Sync {
    type Validated;

    fn validate(
        &self,
        command: &Record,
        ctx: &ProcessingContext<'_>,
    ) -> std::result::Result<Self::Validated, Rejection>;

    fn apply(
        &self,
        command: &Record,
        validated: Self::Validated,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<()>;
}

/// Processor of a command with cluster-wide effect.
pub trait DistributedProcessor: Send + Sync {
    /// Runs on the partition that received the command from a client.
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()>;

    /// Runs on every partition the command was distributed to. Must apply
    /// the mutation without business validation and acknowledge the command.
    fn process_distributed_command(
        &self,
        command: &Record,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<()>;
}

struct SimpleAdapter<P>(P);

impl<P: SimpleProcessor> CommandProcessor for SimpleAdapter<P> {
    fn process(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        match self.0.validate(command, ctx) {
            Ok(validated) => self.0.apply(command, validated, ctx),
            Err(rejection) => {
                ctx.reject(command, rejection);
                Ok(())
            }
        }
    }
}

struct DistributedAdapter<P>(P);

impl<P: DistributedProcessor> CommandProcessor for DistributedAdapter<P> {
    fn process(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        if !command.is_distributed() {
            return self.0.process_new_command(command, ctx);
        }
        let already_received = command
            .distribution
            .map(|metadata| ctx.state().distribution.was_received(metadata.distribution_key))
            .unwrap_or(false);
        if already_received {
            // redelivery: only the acknowledgement may have been lost
            return ctx.command_distribution().acknowledge_command(command);
        }
        self.0.process_distributed_command(command, ctx)
    }
}

/// Dispatch table built once when the engine starts.
#[derive(Default)]
pub struct RecordProcessors {
    processors: HashMap<(ValueType, Intent), Arc<dyn CommandProcessor>>,
}

impl RecordProcessors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_processor(
        mut self,
        value_type: ValueType,
        intent: Intent,
        processor: Arc<dyn CommandProcessor>,
    ) -> Self {
        self.processors.insert((value_type, intent), processor);
        self
    }

    pub fn with_simple<P: SimpleProcessor + 'static>(
        self,
        value_type: ValueType,
        intent: Intent,
        processor: P,
    ) -> Self {
        self.with_processor(value_type, intent, Arc::new(SimpleAdapter(processor)))
    }

    pub fn with_distributed<P: DistributedProcessor + 'static>(
        self,
        value_type: ValueType,
        intent: Intent,
        processor: P,
    ) -> Self {
        self.with_processor(value_type, intent, Arc::new(DistributedAdapter(processor)))
    }

    pub fn get(&self, value_type: ValueType, intent: Intent) -> Option<&Arc<dyn CommandProcessor>> {
        self.processors.get(&(value_type, intent))
    }

    pub fn contains(&self, value_type: ValueType, intent: Intent) -> bool {
        self.processors.contains_key(&(value_type, intent))
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
