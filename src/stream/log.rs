use crate::core::{EngineError, Result};
use crate::protocol::Record;
use std::sync::Mutex;
use tokio::sync::watch;

/// Ordered, position-addressed record log of one partition.
///
/// Positions start at 1 and are assigned on append. A batch is appended
/// atomically: no other append interleaves with it.
pub trait LogStorage: Send + Sync {
    /// Appends the batch and returns the position of its last record.
    fn append(&self, records: Vec<Record>) -> Result<i64>;

    fn read(&self, position: i64) -> Result<Option<Record>>;

    /// Position of the newest record, 0 for an empty log.
    fn last_position(&self) -> i64;

    /// Notifies about the newest position after every append.
    fn subscribe(&self) -> watch::Receiver<i64>;
}

/// Log kept in memory; survives partition restarts but not the process.
pub struct InMemoryLogStorage {
    records: Mutex<Vec<Record>>,
    positions: watch::Sender<i64>,
}

impl InMemoryLogStorage {
    pub fn new() -> Self {
        let (positions, _) = watch::channel(0);
        Self {
            records: Mutex::new(Vec::new()),
            positions,
        }
    }

    /// Snapshot of every record appended so far.
    pub fn records(&self) -> Result<Vec<Record>> {
        Ok(self.records.lock()?.clone())
    }
}

impl Default for InMemoryLogStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStorage for InMemoryLogStorage {
    fn append(&self, records: Vec<Record>) -> Result<i64> {
        if records.is_empty() {
            return Err(EngineError::LogError("cannot append an empty batch".to_string()));
        }
        let mut log = self.records.lock()?;
        for mut record in records {
            record.position = log.len() as i64 + 1;
            log.push(record);
        }
        let last_position = log.len() as i64;
        // published under the lock so concurrent appenders never move it back
        self.positions.send_replace(last_position);
        Ok(last_position)
    }

    fn read(&self, position: i64) -> Result<Option<Record>> {
        if position < 1 {
            return Ok(None);
        }
        let log = self.records.lock()?;
        Ok(log.get((position - 1) as usize).cloned())
    }

    fn last_position(&self) -> i64 {
        *self.positions.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<i64> {
        self.positions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GroupRecord, Intent};

    #[test]
    fn positions_are_assigned_on_append() {
        let log = InMemoryLogStorage::new();
        let command = Record::command(1, -1, Intent::Create, GroupRecord::default());

        assert_eq!(log.append(vec![command.clone(), command.clone()]).unwrap(), 2);
        assert_eq!(log.append(vec![command]).unwrap(), 3);
        assert_eq!(log.read(2).unwrap().unwrap().position, 2);
        assert!(log.read(4).unwrap().is_none());
        assert_eq!(log.last_position(), 3);
    }

    #[test]
    fn subscribers_see_the_latest_position() {
        let log = InMemoryLogStorage::new();
        let mut positions = log.subscribe();
        log.append(vec![Record::command(1, -1, Intent::Create, GroupRecord::default())])
            .unwrap();

        assert!(positions.has_changed().unwrap());
        assert_eq!(*positions.borrow_and_update(), 1);
    }

    #[test]
    fn concurrent_appends_publish_the_newest_position() {
        let log = InMemoryLogStorage::new();
        let command = Record::command(1, -1, Intent::Create, GroupRecord::default());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        log.append(vec![command.clone()]).unwrap();
                    }
                });
            }
        });

        let records = log.records().unwrap();
        assert_eq!(records.len(), 1_600);
        assert_eq!(log.last_position(), records.len() as i64);
        assert!(
            records
                .iter()
                .enumerate()
                .all(|(index, record)| record.position == index as i64 + 1)
        );
    }
}
