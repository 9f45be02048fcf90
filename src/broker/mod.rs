//! Broker seam and the embedded log broker.
//!
//! The publisher and the listeners only talk to a broker through the
//! [`Broker`] and [`Subscription`] traits:
//! - `publish(topic, key, value)` appends a record and resolves to its
//!   [`RecordMetadata`] once the broker acknowledges it
//! - `subscribe(topic, group_id)` joins a consumer group and yields
//!   [`DeliveryRecord`]s for the partitions assigned to this member
//!
//! [`LogBroker`] is the implementation shipped with the crate: a partitioned,
//! append-only log persisted in `sled`, with per-group committed offsets.

pub mod engine;
pub mod error;
pub mod group;
pub mod record;
pub mod topic;

pub use engine::{LogBroker, OffsetReset};
pub use error::BrokerError;
pub use record::{DeliveryRecord, RecordMetadata};

use async_trait::async_trait;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Append `value` to `topic`, choosing the partition from `key`.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<RecordMetadata, BrokerError>;

    /// Join `group_id` on `topic` as a new member.
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn Subscription>, BrokerError>;
}

/// One member's view of a consumer group.
///
/// Offsets are committed implicitly: the record returned by `next` is
/// committed when `next` is called again or when the subscription is
/// closed. Dropping a subscription without `close` leaves the last record
/// uncommitted, so the group sees it again.
#[async_trait]
pub trait Subscription: Send {
    async fn next(&mut self) -> Result<DeliveryRecord, BrokerError>;

    /// Commit the last delivered record and leave the group.
    fn close(self: Box<Self>);
}

#[cfg(test)]
mod tests;
