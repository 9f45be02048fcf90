//! Broker engine
//!
//! `LogBroker` is the embedded broker behind the [`Broker`] trait. It is
//! responsible for:
//! - creating topics on first use and remembering their partition count
//! - appending records to the partition chosen by the record key
//! - tracking consumer-group membership and partition assignment
//! - handing out records from each member's partitions and committing the
//!   group offset once the next record is requested
//!
//! Concurrency and usage notes:
//! - Coordination state lives behind a `std::sync::Mutex` that is never held
//!   across an `.await`. Appends run under that lock so a partition's offsets
//!   become visible strictly in order.
//! - Members waiting for records park on the topic's `Notify`; publishes and
//!   membership changes wake them.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::error::BrokerError;
use super::group::MemberId;
use super::record::{DeliveryRecord, RecordMetadata};
use super::topic::Topic;
use super::{Broker, Subscription};
use crate::persistence::{Persistence, Retention};

/// Where a group without a committed offset starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// From the oldest retained record.
    #[default]
    Earliest,
    /// Only records appended after the group first joined.
    Latest,
}

#[derive(Debug, Clone)]
pub struct LogBroker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    store: Persistence,
    state: Mutex<BrokerState>,
    default_partitions: u32,
    offset_reset: OffsetReset,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Topic>,
    next_member: MemberId,
}

impl LogBroker {
    pub fn new(store: Persistence, default_partitions: u32, offset_reset: OffsetReset) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                state: Mutex::new(BrokerState::default()),
                default_partitions,
                offset_reset,
            }),
        }
    }

    /// A broker over a throwaway database, mostly useful for tests.
    pub fn in_memory(default_partitions: u32) -> Result<Self, BrokerError> {
        let store = Persistence::temporary(Retention::default())?;
        Ok(Self::new(store, default_partitions, OffsetReset::Earliest))
    }

    /// Create a topic explicitly. An existing topic keeps its partition
    /// count; the effective count is returned.
    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<u32, BrokerError> {
        let mut state = self.inner.lock();
        let topic = self.inner.ensure_topic(&mut state, name, partitions)?;
        Ok(topic.partitions)
    }

    pub fn partitions(&self, topic: &str) -> Result<Option<u32>, BrokerError> {
        Ok(self.inner.store.topic_partitions(topic)?)
    }

    pub fn committed(
        &self,
        topic: &str,
        group_id: &str,
        partition: u32,
    ) -> Result<Option<u64>, BrokerError> {
        Ok(self.inner.store.committed(topic, group_id, partition)?)
    }

    /// Number of live members in a group.
    pub fn group_size(&self, topic: &str, group_id: &str) -> usize {
        let state = self.inner.lock();
        state
            .topics
            .get(topic)
            .and_then(|t| t.groups.get(group_id))
            .map(|g| g.members().len())
            .unwrap_or(0)
    }

    /// Flush the underlying store.
    pub async fn flush(&self) -> Result<(), BrokerError> {
        Ok(self.inner.store.flush().await?)
    }
}

#[async_trait]
impl Broker for LogBroker {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<RecordMetadata, BrokerError> {
        let (record, partition, notify) = {
            let mut state = self.inner.lock();
            let t = self
                .inner
                .ensure_topic(&mut state, topic, self.inner.default_partitions)?;
            let partition = t.partition_for(key);
            let record = self.inner.store.append(
                topic,
                partition,
                key,
                &value,
                chrono::Utc::now().timestamp_millis(),
            )?;
            (record, partition, t.notifier())
        };

        self.inner.store.flush().await?;
        notify.notify_waiters();

        debug!(topic, partition, offset = record.offset, key, "record appended");

        Ok(RecordMetadata {
            topic: topic.to_string(),
            partition,
            offset: record.offset,
            timestamp: record.timestamp,
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn Subscription>, BrokerError> {
        validate_name("group", group_id)?;

        let (member, notify) = {
            let mut state = self.inner.lock();
            let member = state.next_member;
            state.next_member += 1;

            let t = self
                .inner
                .ensure_topic(&mut state, topic, self.inner.default_partitions)?;

            if self.inner.offset_reset == OffsetReset::Latest {
                for partition in 0..t.partitions {
                    if self.inner.store.committed(topic, group_id, partition)?.is_none() {
                        let end = self.inner.store.end_offset(topic, partition)?;
                        self.inner.store.commit(topic, group_id, partition, end)?;
                    }
                }
            }

            let generation = t.group_mut(group_id).join(member);
            info!(topic, group = group_id, member, generation, "member joined consumer group");
            (member, t.notifier())
        };

        // Existing members pick up the new assignment on their next poll.
        notify.notify_waiters();

        Ok(Box::new(LogSubscription {
            inner: self.inner.clone(),
            topic: topic.to_string(),
            group: group_id.to_string(),
            member,
            notify,
            in_flight: None,
            cursor: 0,
        }))
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_topic<'a>(
        &self,
        state: &'a mut BrokerState,
        name: &str,
        partitions: u32,
    ) -> Result<&'a mut Topic, BrokerError> {
        match state.topics.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                validate_name("topic", name)?;
                if partitions == 0 {
                    return Err(BrokerError::NoPartitions(name.to_string()));
                }
                let partitions = self.store.register_topic(name, partitions)?;
                info!(topic = name, partitions, "topic ready");
                Ok(entry.insert(Topic::new(partitions)))
            }
        }
    }

    fn leave(&self, topic: &str, group_id: &str, member: MemberId) {
        let notify = {
            let mut state = self.lock();
            let Some(t) = state.topics.get_mut(topic) else {
                return;
            };
            if let Some(group) = t.groups.get_mut(group_id) {
                if group.leave(member) {
                    info!(
                        topic,
                        group = group_id,
                        member,
                        generation = group.generation(),
                        "member left consumer group"
                    );
                }
            }
            t.notifier()
        };
        notify.notify_waiters();
    }

    fn assignment(&self, topic: &str, group_id: &str, member: MemberId) -> Vec<u32> {
        let state = self.lock();
        state
            .topics
            .get(topic)
            .and_then(|t| {
                t.groups
                    .get(group_id)
                    .map(|g| g.assignment(member, t.partitions))
            })
            .unwrap_or_default()
    }

    fn owns(&self, topic: &str, group_id: &str, member: MemberId, partition: u32) -> bool {
        let state = self.lock();
        state
            .topics
            .get(topic)
            .and_then(|t| t.groups.get(group_id))
            .and_then(|g| g.owner_of(partition))
            == Some(member)
    }
}

/// Topic and group names: non-empty ASCII letters, digits, `.`, `_`, `-`.
fn validate_name(kind: &'static str, name: &str) -> Result<(), BrokerError> {
    let valid = !name.is_empty()
        && name.len() <= 249
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(BrokerError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

struct LogSubscription {
    inner: Arc<Inner>,
    topic: String,
    group: String,
    member: MemberId,
    notify: Arc<Notify>,
    /// Delivered but not yet committed: (partition, offset).
    in_flight: Option<(u32, u64)>,
    cursor: usize,
}

impl LogSubscription {
    fn commit_in_flight(&mut self) -> Result<(), BrokerError> {
        let Some((partition, offset)) = self.in_flight.take() else {
            return Ok(());
        };

        if !self
            .inner
            .owns(&self.topic, &self.group, self.member, partition)
        {
            debug!(
                topic = %self.topic,
                group = %self.group,
                partition,
                offset,
                "partition revoked before commit; record will be redelivered"
            );
            return Ok(());
        }

        self.inner
            .store
            .commit(&self.topic, &self.group, partition, offset + 1)?;
        Ok(())
    }

    /// Next record from the assigned partitions, starting after the
    /// partition served last so a busy partition cannot starve the others.
    fn poll_assigned(&mut self) -> Result<Option<DeliveryRecord>, BrokerError> {
        let assigned = self.inner.assignment(&self.topic, &self.group, self.member);
        let count = assigned.len();

        for step in 0..count {
            let slot = (self.cursor + step) % count;
            let partition = assigned[slot];
            let from = self
                .inner
                .store
                .committed(&self.topic, &self.group, partition)?
                .unwrap_or(0);

            if let Some(stored) = self.inner.store.read_from(&self.topic, partition, from)? {
                self.cursor = (slot + 1) % count;
                self.in_flight = Some((partition, stored.offset));
                return Ok(Some(DeliveryRecord {
                    topic: self.topic.clone(),
                    partition,
                    offset: stored.offset,
                    key: stored.key,
                    value: stored.value,
                    timestamp: stored.timestamp,
                }));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl Subscription for LogSubscription {
    async fn next(&mut self) -> Result<DeliveryRecord, BrokerError> {
        self.commit_in_flight()?;

        loop {
            let notify = self.notify.clone();
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(record) = self.poll_assigned()? {
                return Ok(record);
            }

            notified.await;
        }
    }

    fn close(mut self: Box<Self>) {
        if let Err(e) = self.commit_in_flight() {
            warn!(topic = %self.topic, group = %self.group, "failed to commit on close: {e}");
        }
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.inner.leave(&self.topic, &self.group, self.member);
    }
}
