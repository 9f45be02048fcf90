//! Topic management
//!
//! A `Topic` holds the partition count, the consumer groups reading it and
//! the notifier used to wake members waiting for new records. The records
//! themselves live in `Persistence`.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the broker
//! keeps every topic behind its state lock).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Notify;

use super::group::ConsumerGroup;

#[derive(Debug)]
pub struct Topic {
    pub partitions: u32,
    pub groups: HashMap<String, ConsumerGroup>,
    notify: Arc<Notify>,
}

impl Topic {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions,
            groups: HashMap::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Partition for a record key: CRC-32 of the key modulo the partition
    /// count, so the same key always lands on the same partition.
    pub fn partition_for(&self, key: &str) -> u32 {
        crc32fast::hash(key.as_bytes()) % self.partitions.max(1)
    }

    /// Get a consumer group, creating it on first use.
    pub fn group_mut(&mut self, group_id: &str) -> &mut ConsumerGroup {
        self.groups.entry(group_id.to_string()).or_default()
    }

    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
