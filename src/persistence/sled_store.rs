//! Log storage backed by `sled`
//!
//! Layout:
//! - `log/{topic}/{partition}`: one tree per partition, key = offset (u64 BE),
//!   value = JSON-encoded [`LogEntry`] (append timestamp, key, value)
//! - `__topics`: topic name -> partition count (u32 BE)
//! - `__watermarks`: `{topic}/{partition}` -> next offset (u64 BE)
//! - `__offsets`: `{topic}/{group}/{partition}` -> committed offset (u64 BE)
//!
//! The watermark is kept apart from the log so offsets never go backwards,
//! even after retention has removed every record of a partition.
//!
//! Retention options:
//! - `ttl_seconds`: records older than the TTL are removed after each append
//! - `max_records_per_partition`: when exceeded, oldest records are removed

use std::path::Path;

use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use thiserror::Error;

const TOPICS_TREE: &str = "__topics";
const WATERMARKS_TREE: &str = "__watermarks";
const OFFSETS_TREE: &str = "__offsets";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt record in {tree} at offset {offset}: {source}")]
    CorruptRecord {
        tree: String,
        offset: u64,
        source: serde_json::Error,
    },

    #[error("corrupt offset key in {0}")]
    CorruptKey(String),

    #[error("corrupt counter under key {0}")]
    CorruptCounter(String),
}

/// A record as read back from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub offset: u64,
    /// Append time, milliseconds since the UNIX epoch.
    pub timestamp: i64,
    pub key: String,
    pub value: Vec<u8>,
}

/// What a partition tree stores under each offset.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LogEntry {
    pub timestamp: i64,
    pub key: String,
    pub value: Vec<u8>,
}

/// Just the append time, for retention sweeps.
#[derive(Deserialize)]
struct EntryTimestamp {
    timestamp: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Retention {
    pub ttl_seconds: Option<i64>,
    pub max_records_per_partition: Option<usize>,
}

#[derive(Clone)]
pub struct Persistence {
    db: Db,
    topics: Tree,
    watermarks: Tree,
    offsets: Tree,
    retention: Retention,
}

impl Persistence {
    /// Open or create a sled database at `path` with the given retention.
    pub fn open(path: impl AsRef<Path>, retention: Retention) -> Result<Self, PersistenceError> {
        Self::from_db(sled::open(path)?, retention)
    }

    /// A database that lives only as long as this handle.
    pub fn temporary(retention: Retention) -> Result<Self, PersistenceError> {
        Self::from_db(sled::Config::new().temporary(true).open()?, retention)
    }

    fn from_db(db: Db, retention: Retention) -> Result<Self, PersistenceError> {
        Ok(Self {
            topics: db.open_tree(TOPICS_TREE)?,
            watermarks: db.open_tree(WATERMARKS_TREE)?,
            offsets: db.open_tree(OFFSETS_TREE)?,
            db,
            retention,
        })
    }

    /// Record a topic's partition count. A topic that already exists keeps
    /// its original count, which is returned.
    pub fn register_topic(&self, topic: &str, partitions: u32) -> Result<u32, PersistenceError> {
        if let Some(existing) = self.topic_partitions(topic)? {
            return Ok(existing);
        }
        self.topics.insert(topic, partitions.to_be_bytes().to_vec())?;
        Ok(partitions)
    }

    pub fn topic_partitions(&self, topic: &str) -> Result<Option<u32>, PersistenceError> {
        match self.topics.get(topic)? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| PersistenceError::CorruptCounter(topic.to_string()))?;
                Ok(Some(u32::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Append a record at the partition's next offset.
    ///
    /// Callers must serialize appends to the same partition; the offset and
    /// the record are written in one transaction.
    pub fn append(
        &self,
        topic: &str,
        partition: u32,
        key: &str,
        value: &[u8],
        timestamp: i64,
    ) -> Result<StoredRecord, PersistenceError> {
        let log = self.log_tree(topic, partition)?;
        let mark_key = partition_key(topic, partition);
        let encoded = encode_record(timestamp, key, value)?;

        let offset = (&log, &self.watermarks)
            .transaction(|(log, marks)| {
                let offset = match marks.get(mark_key.as_bytes())? {
                    Some(bytes) => decode_u64(&bytes).ok_or_else(|| {
                        ConflictableTransactionError::Abort(PersistenceError::CorruptCounter(
                            mark_key.clone(),
                        ))
                    })?,
                    None => 0,
                };
                log.insert(offset.to_be_bytes().to_vec(), encoded.as_slice())?;
                marks.insert(mark_key.as_bytes(), (offset + 1).to_be_bytes().to_vec())?;
                Ok(offset)
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => PersistenceError::Storage(e),
            })?;

        self.apply_retention(topic, partition, &log, offset + 1, timestamp)?;

        Ok(StoredRecord {
            offset,
            timestamp,
            key: key.to_string(),
            value: value.to_vec(),
        })
    }

    /// First retained record at or after `from`.
    pub fn read_from(
        &self,
        topic: &str,
        partition: u32,
        from: u64,
    ) -> Result<Option<StoredRecord>, PersistenceError> {
        let log = self.log_tree(topic, partition)?;
        match log.range(from.to_be_bytes()..).next() {
            Some(entry) => {
                let (key, value) = entry?;
                let offset = decode_u64(&key)
                    .ok_or_else(|| PersistenceError::CorruptKey(log_tree_name(topic, partition)))?;
                decode_record(offset, &value)
                    .map(Some)
                    .map_err(|source| PersistenceError::CorruptRecord {
                        tree: log_tree_name(topic, partition),
                        offset,
                        source,
                    })
            }
            None => Ok(None),
        }
    }

    /// The offset the next append to this partition will receive.
    pub fn end_offset(&self, topic: &str, partition: u32) -> Result<u64, PersistenceError> {
        let mark_key = partition_key(topic, partition);
        match self.watermarks.get(mark_key.as_bytes())? {
            Some(bytes) => decode_u64(&bytes).ok_or(PersistenceError::CorruptCounter(mark_key)),
            None => Ok(0),
        }
    }

    /// Offset of the oldest retained record, or the end offset when the
    /// partition is empty.
    pub fn earliest_offset(&self, topic: &str, partition: u32) -> Result<u64, PersistenceError> {
        let log = self.log_tree(topic, partition)?;
        match log.first()? {
            Some((key, _)) => decode_u64(&key)
                .ok_or_else(|| PersistenceError::CorruptKey(log_tree_name(topic, partition))),
            None => self.end_offset(topic, partition),
        }
    }

    pub fn committed(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
    ) -> Result<Option<u64>, PersistenceError> {
        let key = group_key(topic, group, partition);
        match self.offsets.get(key.as_bytes())? {
            Some(bytes) => decode_u64(&bytes)
                .map(Some)
                .ok_or(PersistenceError::CorruptCounter(key)),
            None => Ok(None),
        }
    }

    pub fn commit(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
        offset: u64,
    ) -> Result<(), PersistenceError> {
        let key = group_key(topic, group, partition);
        self.offsets
            .insert(key.as_bytes(), offset.to_be_bytes().to_vec())?;
        Ok(())
    }

    /// Wait until everything written so far is on disk.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush_async().await?;
        Ok(())
    }

    pub(crate) fn log_tree(&self, topic: &str, partition: u32) -> Result<Tree, PersistenceError> {
        Ok(self.db.open_tree(log_tree_name(topic, partition))?)
    }

    /// Records are only ever removed from the front of a partition, so the
    /// retained offsets are the contiguous range `earliest..end`.
    fn apply_retention(
        &self,
        topic: &str,
        partition: u32,
        log: &Tree,
        end: u64,
        now_ms: i64,
    ) -> Result<(), PersistenceError> {
        if let Some(max) = self.retention.max_records_per_partition {
            let earliest = self.earliest_offset(topic, partition)?;
            let retained = end.saturating_sub(earliest);
            let max = u64::try_from(max).unwrap_or(u64::MAX);
            if retained > max {
                let cutoff = end - max;
                let keys: Vec<_> = log
                    .range(..cutoff.to_be_bytes())
                    .keys()
                    .collect::<Result<_, _>>()?;
                for key in keys {
                    log.remove(key)?;
                }
            }
        }

        if let Some(ttl) = self.retention.ttl_seconds {
            let expiry = now_ms.saturating_sub(ttl.saturating_mul(1000));
            let mut expired = Vec::new();
            for entry in log.iter() {
                let (key, value) = entry?;
                match serde_json::from_slice::<EntryTimestamp>(&value) {
                    Ok(entry) if entry.timestamp < expiry => expired.push(key),
                    _ => break,
                }
            }
            for key in expired {
                log.remove(key)?;
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("db", &"sled::Db")
            .field("retention", &self.retention)
            .finish()
    }
}

fn log_tree_name(topic: &str, partition: u32) -> String {
    format!("log/{topic}/{partition}")
}

fn partition_key(topic: &str, partition: u32) -> String {
    format!("{topic}/{partition}")
}

fn group_key(topic: &str, group: &str, partition: u32) -> String {
    format!("{topic}/{group}/{partition}")
}

fn decode_u64(bytes: &[u8]) -> Option<u64> {
    bytes.try_into().ok().map(u64::from_be_bytes)
}

pub(crate) fn encode_record(
    timestamp: i64,
    key: &str,
    value: &[u8],
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&LogEntry {
        timestamp,
        key: key.to_string(),
        value: value.to_vec(),
    })
}

pub(crate) fn decode_record(offset: u64, bytes: &[u8]) -> Result<StoredRecord, serde_json::Error> {
    let entry: LogEntry = serde_json::from_slice(bytes)?;
    Ok(StoredRecord {
        offset,
        timestamp: entry.timestamp,
        key: entry.key,
        value: entry.value,
    })
}
