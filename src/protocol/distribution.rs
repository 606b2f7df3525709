use super::intent::{Intent, ValueType};
use super::value::RecordValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// FIFO domains for distributed commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionQueue {
    Identity,
    Deployment,
}

impl fmt::Display for DistributionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionQueue::Identity => f.write_str("IDENTITY"),
            DistributionQueue::Deployment => f.write_str("DEPLOYMENT"),
        }
    }
}

/// Bookkeeping value of `COMMAND_DISTRIBUTION` records.
///
/// `partition_id` is the origin partition on `STARTED`/`FINISHED` and the
/// target partition on every per-partition intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDistributionRecord {
    pub partition_id: u32,
    pub queue: Option<DistributionQueue>,
    pub value_type: ValueType,
    pub intent: Intent,
    pub command_value: Option<Box<RecordValue>>,
}
