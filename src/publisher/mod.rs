//! Publisher
//!
//! Builds a [`Message`] from the caller's input and hands it to the broker
//! without waiting for the acknowledgment. The send runs on its own tokio
//! task; when the broker answers, the task logs the partition and offset (or
//! the failure) and reports the outcome on the [`Submission`] returned to the
//! caller. Nobody has to await that outcome, and a failed send is never
//! retried. Send tasks are tracked so shutdown can wait for them with
//! [`Publisher::drain`].

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::broker::{Broker, BrokerError, RecordMetadata};
use crate::message::codec;
use crate::message::{DateFormat, Message};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("publish task ended without reporting an outcome")]
    Abandoned,
}

#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn Broker>,
    topic: String,
    date_format: DateFormat,
    tasks: TaskTracker,
}

/// A publish that has been handed to the broker but not necessarily stored.
#[derive(Debug)]
pub struct Submission {
    message: Message,
    outcome: oneshot::Receiver<Result<RecordMetadata, PublishError>>,
}

impl Submission {
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Wait for the broker's answer.
    pub async fn outcome(self) -> Result<RecordMetadata, PublishError> {
        self.outcome.await.unwrap_or(Err(PublishError::Abandoned))
    }
}

impl Publisher {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            date_format: DateFormat::default(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Sends that have been scheduled but have not reported yet.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every send scheduled so far, including those of clones, to
    /// report its outcome.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Build a message and submit it, keyed by its id.
    ///
    /// Returns as soon as the send is scheduled. Must be called from within
    /// a tokio runtime.
    pub fn publish(&self, content: &str, sender: &str, priority: Option<&str>) -> Submission {
        let message = Message::new(content, sender, priority);
        info!(
            id = message.id(),
            sender = message.sender(),
            priority = message.priority(),
            topic = %self.topic,
            "sending message"
        );

        let (tx, rx) = oneshot::channel();
        let broker = self.broker.clone();
        let topic = self.topic.clone();
        let date_format = self.date_format;
        let outgoing = message.clone();

        self.tasks.spawn(async move {
            let outcome = send(broker.as_ref(), &topic, &outgoing, date_format).await;
            match &outcome {
                Ok(meta) => info!(
                    id = outgoing.id(),
                    partition = meta.partition,
                    offset = meta.offset,
                    "message sent"
                ),
                Err(e) => error!(id = outgoing.id(), topic = %topic, "failed to send message: {e}"),
            }
            // The caller may have dropped the submission.
            let _ = tx.send(outcome);
        });

        Submission {
            message,
            outcome: rx,
        }
    }
}

async fn send(
    broker: &dyn Broker,
    topic: &str,
    message: &Message,
    date_format: DateFormat,
) -> Result<RecordMetadata, PublishError> {
    let value = codec::encode(message, date_format)?;
    Ok(broker.publish(topic, message.id(), value).await?)
}
