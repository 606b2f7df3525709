//! Cluster-wide replication of commands.
//!
//! The origin partition records every distribution as events so it survives
//! restarts; receivers answer with an `ACKNOWLEDGE` command. Distributions in
//! the same queue reach each partition strictly one after the other.

use super::context::ProcessingContext;
use super::processors::CommandProcessor;
use crate::config::DistributionConfig;
use crate::core::{EngineError, Result};
use crate::protocol::{
    CommandDistributionRecord, DistributionMetadata, DistributionQueue, Intent, NO_KEY, Record,
    Rejection,
};
use crate::state::PendingDistribution;
use crate::stream::{Task, TaskContext};
use std::collections::{BTreeSet, HashMap};
use tracing::{Level, event};

pub struct CommandDistributionBehavior<'c, 'a> {
    ctx: &'c mut ProcessingContext<'a>,
    distribution_key: i64,
    queue: Option<DistributionQueue>,
    partitions: Option<BTreeSet<u32>>,
}

impl<'c, 'a> CommandDistributionBehavior<'c, 'a> {
    pub fn new(ctx: &'c mut ProcessingContext<'a>) -> Self {
        Self {
            ctx,
            distribution_key: NO_KEY,
            queue: None,
            partitions: None,
        }
    }

    /// Uses `key` instead of a freshly generated distribution key.
    pub fn with_key(mut self, key: i64) -> Self {
        self.distribution_key = key;
        self
    }

    pub fn in_queue(mut self, queue: DistributionQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Restricts the targets; all other partitions by default.
    pub fn for_partitions(mut self, partitions: impl IntoIterator<Item = u32>) -> Self {
        self.partitions = Some(partitions.into_iter().collect());
        self
    }

    /// Starts distributing `command` to the target partitions.
    pub fn distribute(self, command: &Record) -> Result<()> {
        let local = self.ctx.partition_id();
        let targets: Vec<u32> = match self.partitions {
            Some(partitions) => partitions.into_iter().filter(|p| *p != local).collect(),
            None => (1..=self.ctx.partition_count()).filter(|p| *p != local).collect(),
        };
        if targets.is_empty() {
            return Ok(());
        }

        let ctx = self.ctx;
        let distribution_key = if self.distribution_key == NO_KEY {
            ctx.next_key()
        } else {
            self.distribution_key
        };
        let queue = self.queue;

        ctx.state_writer().append_follow_up_event(
            distribution_key,
            Intent::Started,
            CommandDistributionRecord {
                partition_id: local,
                queue,
                value_type: command.value_type(),
                intent: command.intent,
                command_value: Some(Box::new(command.value.clone())),
            },
        )?;

        for target in targets {
            let in_flight = queue.and_then(|queue| ctx.state().distribution.queue_head(queue, target));
            let value = CommandDistributionRecord {
                partition_id: target,
                queue,
                value_type: command.value_type(),
                intent: command.intent,
                command_value: None,
            };
            if in_flight.is_some() {
                ctx.state_writer()
                    .append_follow_up_event(distribution_key, Intent::Enqueued, value)?;
                continue;
            }
            ctx.state_writer()
                .append_follow_up_event(distribution_key, Intent::Distributing, value)?;
            let pending = ctx
                .state()
                .distribution
                .get(distribution_key)
                .cloned()
                .ok_or_else(|| missing_distribution(distribution_key))?;
            ctx.side_effect_writer()
                .send_command(target, distributed_command(&pending, local, target));
        }

        event!(
            Level::DEBUG,
            distribution_key,
            value_type = %command.value_type(),
            intent = %command.intent,
            "distribution started"
        );
        Ok(())
    }

    /// Confirms a distributed command to its origin partition.
    pub fn acknowledge_command(self, command: &Record) -> Result<()> {
        let metadata = command.distribution.ok_or_else(|| {
            EngineError::ProcessingError(format!(
                "cannot acknowledge {}:{} without distribution metadata",
                command.value_type(),
                command.intent
            ))
        })?;
        let ctx = self.ctx;
        let local = ctx.partition_id();
        let value = CommandDistributionRecord {
            partition_id: local,
            queue: metadata.queue,
            value_type: command.value_type(),
            intent: command.intent,
            command_value: None,
        };

        if !ctx.state().distribution.was_received(metadata.distribution_key) {
            ctx.state_writer().append_follow_up_event(
                metadata.distribution_key,
                Intent::Received,
                value.clone(),
            )?;
        }

        let acknowledge = Record::command(
            metadata.origin_partition_id,
            metadata.distribution_key,
            Intent::Acknowledge,
            value,
        );
        ctx.side_effect_writer()
            .send_command(metadata.origin_partition_id, acknowledge);
        Ok(())
    }
}

/// The command a target partition receives for a pending distribution.
pub fn distributed_command(distribution: &PendingDistribution, origin_partition_id: u32, target: u32) -> Record {
    let mut command = Record::command(
        target,
        distribution.distribution_key,
        distribution.intent,
        distribution.command_value.clone(),
    )
    .with_tenant(distribution.tenant_id.clone());
    command.distribution = Some(DistributionMetadata {
        distribution_key: distribution.distribution_key,
        origin_partition_id,
        queue: distribution.queue,
    });
    command
}

fn missing_distribution(distribution_key: i64) -> EngineError {
    EngineError::StateInconsistency(format!(
        "expected distribution {} to be pending",
        distribution_key
    ))
}

/// Handles `COMMAND_DISTRIBUTION:ACKNOWLEDGE` on the origin partition.
pub struct CommandDistributionAcknowledgeProcessor;

impl CommandProcessor for CommandDistributionAcknowledgeProcessor {
    fn process(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(acknowledgement) = command.value.as_command_distribution() else {
            ctx.reject(command, Rejection::invalid_argument("Expected a command distribution value"));
            return Ok(());
        };
        let distribution_key = command.key;
        let partition_id = acknowledgement.partition_id;

        if !ctx.state().distribution.is_pending(distribution_key, partition_id) {
            ctx.reject(
                command,
                Rejection::not_found(format!(
                    "Expected to find pending distribution with key {} for partition {}, but none was found",
                    distribution_key, partition_id
                )),
            );
            return Ok(());
        }

        let pending = ctx
            .state()
            .distribution
            .get(distribution_key)
            .cloned()
            .ok_or_else(|| missing_distribution(distribution_key))?;

        ctx.state_writer().append_follow_up_event(
            distribution_key,
            Intent::Acknowledged,
            acknowledgement.clone(),
        )?;

        if let Some(queue) = pending.queue {
            let next = ctx.state().distribution.queue_head(queue, partition_id);
            if let Some(next_key) = next {
                let next = ctx
                    .state()
                    .distribution
                    .get(next_key)
                    .cloned()
                    .ok_or_else(|| missing_distribution(next_key))?;
                ctx.state_writer().append_follow_up_event(
                    next_key,
                    Intent::Distributing,
                    CommandDistributionRecord {
                        partition_id,
                        queue: Some(queue),
                        value_type: next.value_type,
                        intent: next.intent,
                        command_value: None,
                    },
                )?;
                let origin = ctx.partition_id();
                ctx.side_effect_writer()
                    .send_command(partition_id, distributed_command(&next, origin, partition_id));
            }
        }

        let finished = ctx
            .state()
            .distribution
            .get(distribution_key)
            .map(|distribution| distribution.pending_partitions.is_empty())
            .unwrap_or(false);
        if finished {
            let origin = ctx.partition_id();
            ctx.state_writer().append_follow_up_event(
                distribution_key,
                Intent::Finished,
                CommandDistributionRecord {
                    partition_id: origin,
                    queue: pending.queue,
                    value_type: pending.value_type,
                    intent: pending.intent,
                    command_value: None,
                },
            )?;
            event!(Level::DEBUG, distribution_key, "distribution finished");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryState {
    waited_ms: u64,
    backoff_ms: u64,
}

/// Periodically resends distributions that were not acknowledged yet.
///
/// Each `(distribution, partition)` pair backs off on its own: the wait
/// between two retries doubles up to the configured maximum.
pub struct CommandRedistributor {
    interval_ms: u64,
    max_backoff_ms: u64,
    retries: HashMap<(i64, u32), RetryState>,
}

impl CommandRedistributor {
    pub fn new(config: &DistributionConfig) -> Self {
        Self {
            interval_ms: config.redistribution_interval_ms.max(1),
            max_backoff_ms: config.max_backoff_ms.max(config.redistribution_interval_ms),
            retries: HashMap::new(),
        }
    }

    /// Resends every due pending distribution; returns the commands sent.
    pub fn run_retry_cycle(&mut self, ctx: &mut TaskContext<'_>) -> usize {
        let origin = ctx.partition_id();
        let due: Vec<(u32, Record)> = {
            let Some(state) = ctx.state() else {
                return 0;
            };
            let sendable: Vec<(&PendingDistribution, u32)> = state
                .distribution
                .pending_distributions()
                .flat_map(|distribution| {
                    distribution
                        .pending_partitions
                        .iter()
                        .map(move |partition| (distribution, *partition))
                })
                .filter(|(distribution, partition)| {
                    state
                        .distribution
                        .is_sendable(distribution.distribution_key, *partition)
                })
                .collect();

            let still_pending: BTreeSet<(i64, u32)> = sendable
                .iter()
                .map(|(distribution, partition)| (distribution.distribution_key, *partition))
                .collect();
            self.retries.retain(|pair, _| still_pending.contains(pair));

            let mut due = Vec::new();
            for (distribution, partition) in sendable {
                let retry = self
                    .retries
                    .entry((distribution.distribution_key, partition))
                    .or_insert(RetryState {
                        waited_ms: 0,
                        backoff_ms: self.interval_ms,
                    });
                retry.waited_ms += self.interval_ms;
                if retry.waited_ms < retry.backoff_ms {
                    continue;
                }
                retry.waited_ms = 0;
                retry.backoff_ms = (retry.backoff_ms * 2).min(self.max_backoff_ms);
                due.push((partition, distributed_command(distribution, origin, partition)));
            }
            due
        };

        let resent = due.len();
        for (partition, command) in due {
            event!(
                Level::DEBUG,
                distribution_key = command.key,
                partition,
                "retrying command distribution"
            );
            ctx.send_command(partition, command);
        }
        resent
    }
}

impl Task for CommandRedistributor {
    fn execute(&mut self, context: &mut TaskContext<'_>) -> Result<()> {
        self.run_retry_cycle(context);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GroupRecord, RecordValue, ValueType};
    use crate::state::ProcessingState;
    use crate::stream::ProcessingResultBuilder;

    fn state_with_pending(partitions: &[u32]) -> ProcessingState {
        let mut state = ProcessingState::new(1);
        state.distribution.add_distribution(PendingDistribution {
            distribution_key: 7,
            queue: Some(DistributionQueue::Identity),
            value_type: ValueType::Group,
            intent: Intent::Create,
            command_value: RecordValue::Group(GroupRecord::default()),
            tenant_id: String::new(),
            pending_partitions: BTreeSet::new(),
        });
        for partition in partitions {
            state.distribution.add_pending_partition(7, *partition);
        }
        state
    }

    fn cycle(redistributor: &mut CommandRedistributor, state: &ProcessingState) -> usize {
        let mut result = ProcessingResultBuilder::for_task(1);
        let mut context = TaskContext::new(1, Some(state), &mut result);
        redistributor.run_retry_cycle(&mut context)
    }

    #[test]
    fn retries_back_off_exponentially() {
        let state = state_with_pending(&[2]);
        let mut redistributor = CommandRedistributor::new(&DistributionConfig {
            redistribution_interval_ms: 10,
            max_backoff_ms: 40,
        });

        let sent: Vec<usize> = (0..8).map(|_| cycle(&mut redistributor, &state)).collect();
        // sends after 1, 2, 4, 4, ... intervals
        assert_eq!(sent, vec![1, 0, 1, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn distributed_command_carries_metadata() {
        let state = state_with_pending(&[2]);
        let pending = state.distribution.get(7).unwrap();
        let command = distributed_command(pending, 1, 2);

        assert_eq!(command.key, 7);
        assert_eq!(command.partition_id, 2);
        assert!(command.is_distributed());
        assert_eq!(command.distribution.unwrap().queue, Some(DistributionQueue::Identity));
    }
}
