use crate::protocol::{decode_key_in_partition, decode_partition_id, encode_partition_id};

const INITIAL_LOCAL_KEY: i64 = 1;

/// Allocates keys that are unique across the cluster.
///
/// The partition id lives in the high bits, so two partitions never hand out
/// the same key. On replay the generator is moved past every key seen in the
/// log.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    partition_id: u32,
    next_local_key: i64,
}

impl KeyGenerator {
    pub fn new(partition_id: u32) -> Self {
        Self {
            partition_id,
            next_local_key: INITIAL_LOCAL_KEY,
        }
    }

    pub fn next_key(&mut self) -> i64 {
        let key = encode_partition_id(self.partition_id, self.next_local_key);
        self.next_local_key += 1;
        key
    }

    /// Ensures a key replayed from the log is never handed out again.
    pub fn set_key_if_higher(&mut self, key: i64) {
        if key < 0 || decode_partition_id(key) != self.partition_id {
            return;
        }
        let local_key = decode_key_in_partition(key);
        if local_key >= self.next_local_key {
            self.next_local_key = local_key + 1;
        }
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_monotonic() {
        let mut generator = KeyGenerator::new(2);
        let first = generator.next_key();
        let second = generator.next_key();
        assert!(second > first);
        assert_eq!(decode_partition_id(first), 2);
    }

    #[test]
    fn replayed_keys_move_the_generator_forward() {
        let mut generator = KeyGenerator::new(1);
        generator.set_key_if_higher(encode_partition_id(1, 10));
        assert_eq!(generator.next_key(), encode_partition_id(1, 11));
    }

    #[test]
    fn foreign_keys_are_ignored() {
        let mut generator = KeyGenerator::new(1);
        generator.set_key_if_higher(encode_partition_id(2, 500));
        generator.set_key_if_higher(-1);
        assert_eq!(generator.next_key(), encode_partition_id(1, 1));
    }
}
