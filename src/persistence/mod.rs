//! The `persistence` module stores the partitioned log and the committed
//! consumer-group offsets.
//!
//! It uses `sled` as an embedded key-value store. Every partition of every
//! topic lives in its own tree keyed by big-endian offset, so a range scan
//! yields records in append order.

pub mod sled_store;

pub use sled_store::{Persistence, PersistenceError, Retention, StoredRecord};
