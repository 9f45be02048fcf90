use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::message::Message;

/// A decoded message together with where it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: Message,
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("processing failed: {0}")]
    Failed(String),

    #[error("processor panicked: {0}")]
    Panicked(String),
}

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, delivery: &Delivery) -> Result<(), ProcessError>;
}

/// Logs the message and then waits a fixed time, standing in for real work.
#[derive(Debug, Clone)]
pub struct DelayProcessor {
    label: String,
    delay: Duration,
}

impl DelayProcessor {
    pub fn new(label: impl Into<String>, delay: Duration) -> Self {
        Self {
            label: label.into(),
            delay,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl Processor for DelayProcessor {
    async fn process(&self, delivery: &Delivery) -> Result<(), ProcessError> {
        let message = &delivery.message;
        info!(
            consumer = %self.label,
            id = message.id(),
            content = message.content(),
            sender = message.sender(),
            priority = message.priority(),
            timestamp = %message.timestamp(),
            partition = delivery.partition,
            offset = delivery.offset,
            "message received"
        );

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        info!(consumer = %self.label, id = message.id(), "message processed");
        Ok(())
    }
}
