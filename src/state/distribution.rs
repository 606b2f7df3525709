use crate::protocol::{DistributionQueue, Intent, RecordValue, ValueType};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// A distribution that still waits for acknowledgements.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDistribution {
    pub distribution_key: i64,
    pub queue: Option<DistributionQueue>,
    pub value_type: ValueType,
    pub intent: Intent,
    pub command_value: RecordValue,
    pub tenant_id: String,
    pub pending_partitions: BTreeSet<u32>,
}

/// Distribution bookkeeping of one partition.
///
/// The origin side tracks pending distributions and per-queue FIFO order; the
/// receiving side remembers which distributions it already applied.
#[derive(Debug, Clone, Default)]
pub struct DistributionState {
    pending: BTreeMap<i64, PendingDistribution>,
    queues: HashMap<(DistributionQueue, u32), VecDeque<i64>>,
    /// Distribution keys applied on this receiving partition. Never pruned:
    /// the receiver does not learn when the origin retires a distribution.
    received: HashSet<i64>,
}

impl DistributionState {
    pub fn get(&self, distribution_key: i64) -> Option<&PendingDistribution> {
        self.pending.get(&distribution_key)
    }

    pub fn pending_distributions(&self) -> impl Iterator<Item = &PendingDistribution> {
        self.pending.values()
    }

    pub fn is_pending(&self, distribution_key: i64, partition_id: u32) -> bool {
        self.pending
            .get(&distribution_key)
            .map(|distribution| distribution.pending_partitions.contains(&partition_id))
            .unwrap_or(false)
    }

    pub(crate) fn add_distribution(&mut self, distribution: PendingDistribution) {
        self.pending.insert(distribution.distribution_key, distribution);
    }

    pub(crate) fn add_pending_partition(&mut self, distribution_key: i64, partition_id: u32) {
        let Some(distribution) = self.pending.get_mut(&distribution_key) else {
            return;
        };
        distribution.pending_partitions.insert(partition_id);
        if let Some(queue) = distribution.queue {
            let entries = self.queues.entry((queue, partition_id)).or_default();
            if !entries.contains(&distribution_key) {
                entries.push_back(distribution_key);
            }
        }
    }

    pub(crate) fn remove_pending_partition(&mut self, distribution_key: i64, partition_id: u32) {
        let Some(distribution) = self.pending.get_mut(&distribution_key) else {
            return;
        };
        distribution.pending_partitions.remove(&partition_id);
        if let Some(queue) = distribution.queue {
            if let Some(entries) = self.queues.get_mut(&(queue, partition_id)) {
                entries.retain(|key| *key != distribution_key);
                if entries.is_empty() {
                    self.queues.remove(&(queue, partition_id));
                }
            }
        }
    }

    pub(crate) fn remove_distribution(&mut self, distribution_key: i64) {
        self.pending.remove(&distribution_key);
    }

    /// The distribution currently in flight for a queue and target partition.
    pub fn queue_head(&self, queue: DistributionQueue, partition_id: u32) -> Option<i64> {
        self.queues
            .get(&(queue, partition_id))
            .and_then(|entries| entries.front().copied())
    }

    /// True when the distribution may be sent to the partition right now.
    pub fn is_sendable(&self, distribution_key: i64, partition_id: u32) -> bool {
        match self.pending.get(&distribution_key) {
            Some(distribution) => match distribution.queue {
                Some(queue) => self.queue_head(queue, partition_id) == Some(distribution_key),
                None => distribution.pending_partitions.contains(&partition_id),
            },
            None => false,
        }
    }

    pub(crate) fn mark_received(&mut self, distribution_key: i64) {
        self.received.insert(distribution_key);
    }

    pub fn was_received(&self, distribution_key: i64) -> bool {
        self.received.contains(&distribution_key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::GroupRecord;

    fn distribution(key: i64) -> PendingDistribution {
        PendingDistribution {
            distribution_key: key,
            queue: Some(DistributionQueue::Identity),
            value_type: ValueType::Group,
            intent: Intent::Create,
            command_value: RecordValue::Group(GroupRecord::default()),
            tenant_id: String::new(),
            pending_partitions: BTreeSet::new(),
        }
    }

    #[test]
    fn queue_keeps_fifo_order_per_partition() {
        let mut state = DistributionState::default();
        state.add_distribution(distribution(1));
        state.add_distribution(distribution(2));
        state.add_pending_partition(1, 2);
        state.add_pending_partition(2, 2);

        assert!(state.is_sendable(1, 2));
        assert!(!state.is_sendable(2, 2));

        state.remove_pending_partition(1, 2);
        assert_eq!(state.queue_head(DistributionQueue::Identity, 2), Some(2));
    }

    #[test]
    fn adding_a_partition_twice_does_not_duplicate_queue_entries() {
        let mut state = DistributionState::default();
        state.add_distribution(distribution(1));
        state.add_pending_partition(1, 3);
        state.add_pending_partition(1, 3);
        state.remove_pending_partition(1, 3);

        assert_eq!(state.queue_head(DistributionQueue::Identity, 3), None);
    }

    #[test]
    fn received_keys_outlive_the_distribution() {
        let mut state = DistributionState::default();
        state.mark_received(7);
        state.add_distribution(distribution(7));
        state.remove_distribution(7);

        assert!(state.get(7).is_none());
        assert!(state.was_received(7));
    }
}
