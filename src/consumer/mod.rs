//! Consumer side of the pipeline.
//!
//! A [`Listener`] joins a consumer group on a topic and hands each delivered
//! message to a [`Processor`], one at a time. Committing is left to the
//! subscription: a delivery counts as consumed once the listener asks for the
//! next one or stops gracefully.

pub mod listener;
pub mod processor;

pub use listener::{Listener, ListenerHandle, ListenerState, ListenerStats};
pub use processor::{DelayProcessor, Delivery, ProcessError, Processor};
