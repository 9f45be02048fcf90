//! The `client` module talks to a running producer over WebSocket.
//!
//! It is what the `publish` and `health` CLI commands use, and it doubles as
//! a small library for other tools that want to submit messages.

pub mod producer_client;

pub use producer_client::{ClientError, ProducerClient};

#[cfg(test)]
mod tests;
