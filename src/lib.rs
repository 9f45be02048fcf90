//! # logpipe
//!
//! `logpipe` is a small producer → broker → consumer-group pipeline. A
//! producer endpoint accepts messages over WebSocket and publishes them to a
//! partitioned, persistent log; listeners in independent consumer groups
//! each receive every message and process it.
//!
//! ## Core Modules
//!
//! - `message`: the `Message` model, its JSON wire encoding and the decoding
//!   of delivered payloads.
//! - `publisher`: builds messages and submits them without waiting for the
//!   broker's acknowledgment.
//! - `consumer`: listeners that join a consumer group and run a processor
//!   for every delivery.
//! - `broker`: the broker seam (`Broker`, `Subscription`) and the embedded
//!   `LogBroker` with consumer groups and committed offsets.
//! - `persistence`: the `sled`-backed log and offset store.
//! - `transport`: the WebSocket request surface of the producer.
//! - `client`: a WebSocket client for the request surface.
//! - `config`: layered configuration (defaults, file, environment).
//! - `utils`: the top-level error type and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod consumer;
pub mod message;
pub mod persistence;
pub mod publisher;
pub mod transport;
pub mod utils;
