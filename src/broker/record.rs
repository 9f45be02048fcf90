//! Record types exchanged with a broker.
//!
//! `RecordMetadata` is the acknowledgment of a publish. `DeliveryRecord` is
//! what a subscription hands to a consumer: the opaque value plus the
//! position it was appended at. Both are produced by the broker only.

/// Where a published record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    /// Append time, milliseconds since the UNIX epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub value: Vec<u8>,
    pub timestamp: i64,
}
