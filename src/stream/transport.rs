use super::log::LogStorage;
use crate::protocol::Record;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{Level, event};

/// Sends commands to the log of another partition.
///
/// Delivery is fire-and-forget; lost commands are resent by the
/// redistribution sweep.
pub trait InterPartitionCommandSender: Send + Sync {
    fn send_command(&self, receiver_partition_id: u32, command: Record);
}

/// Delivers commands by appending them to the receiver's in-memory log.
#[derive(Default)]
pub struct InMemoryCommandSender {
    logs: RwLock<HashMap<u32, Arc<dyn LogStorage>>>,
    unreachable: RwLock<HashSet<u32>>,
}

impl InMemoryCommandSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_partition(&self, partition_id: u32, log: Arc<dyn LogStorage>) {
        if let Ok(mut logs) = self.logs.write() {
            logs.insert(partition_id, log);
        }
    }

    /// Drops every command sent to the partition until it is reconnected.
    pub fn disconnect(&self, partition_id: u32) {
        if let Ok(mut unreachable) = self.unreachable.write() {
            unreachable.insert(partition_id);
        }
    }

    pub fn reconnect(&self, partition_id: u32) {
        if let Ok(mut unreachable) = self.unreachable.write() {
            unreachable.remove(&partition_id);
        }
    }

    fn is_reachable(&self, partition_id: u32) -> bool {
        self.unreachable
            .read()
            .map(|unreachable| !unreachable.contains(&partition_id))
            .unwrap_or(true)
    }
}

impl InterPartitionCommandSender for InMemoryCommandSender {
    fn send_command(&self, receiver_partition_id: u32, mut command: Record) {
        if !self.is_reachable(receiver_partition_id) {
            event!(
                Level::DEBUG,
                partition = receiver_partition_id,
                intent = %command.intent,
                "partition unreachable; dropping command"
            );
            return;
        }
        let log = match self.logs.read() {
            Ok(logs) => logs.get(&receiver_partition_id).cloned(),
            Err(_) => None,
        };
        let Some(log) = log else {
            event!(Level::WARN, partition = receiver_partition_id, "no log registered for partition");
            return;
        };

        command.partition_id = receiver_partition_id;
        command.source_record_position = -1;
        if let Err(err) = log.append(vec![command]) {
            event!(Level::WARN, error = %err, partition = receiver_partition_id, "failed to deliver command");
        }
    }
}
