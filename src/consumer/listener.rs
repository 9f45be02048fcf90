//! Listener loop
//!
//! One tokio task per listener. The task alternates between waiting on the
//! subscription and running the processor, publishing its state on a
//! `watch` channel so callers can observe it without locking.
//!
//! Failures never stop the loop:
//! - undecodable payloads, processor errors and processor panics are logged
//!   and counted, then the next delivery is requested
//! - subscription errors are logged and polling resumes after a short pause

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::processor::{Delivery, ProcessError, Processor};
use crate::broker::{Broker, BrokerError, DeliveryRecord, Subscription};
use crate::message::Payload;

const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    AwaitingDelivery,
    Processing,
}

#[derive(Debug, Default)]
pub struct ListenerStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl ListenerStats {
    /// Deliveries the processor handled successfully.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Deliveries that could not be decoded or whose processing failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct Listener {
    topic: String,
    group_id: String,
    processor: Arc<dyn Processor>,
    error_backoff: Duration,
}

impl Listener {
    pub fn new(
        topic: impl Into<String>,
        group_id: impl Into<String>,
        processor: Arc<dyn Processor>,
    ) -> Self {
        Self {
            topic: topic.into(),
            group_id: group_id.into(),
            processor,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Pause between polls after the subscription reports an error.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Join the group and start the delivery loop on its own task.
    pub async fn start(self, broker: Arc<dyn Broker>) -> Result<ListenerHandle, BrokerError> {
        let subscription = broker.subscribe(&self.topic, &self.group_id).await?;
        info!(topic = %self.topic, group = %self.group_id, "listener started");

        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ListenerState::Idle);
        let stats = Arc::new(ListenerStats::default());

        let task = tokio::spawn(run(
            self,
            subscription,
            cancel.clone(),
            state_tx,
            stats.clone(),
        ));

        Ok(ListenerHandle {
            cancel,
            task,
            state: state_rx,
            stats,
        })
    }
}

pub struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    state: watch::Receiver<ListenerState>,
    stats: Arc<ListenerStats>,
}

impl ListenerHandle {
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.clone()
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Stop waiting for deliveries, let any in-progress processing finish,
    /// then leave the group.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("listener task failed: {e}");
        }
    }
}

async fn run(
    listener: Listener,
    mut subscription: Box<dyn Subscription>,
    cancel: CancellationToken,
    state: watch::Sender<ListenerState>,
    stats: Arc<ListenerStats>,
) {
    loop {
        state.send_replace(ListenerState::AwaitingDelivery);

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = subscription.next() => next,
        };

        let record = match next {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    topic = %listener.topic,
                    group = %listener.group_id,
                    "failed to poll subscription: {e}"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(listener.error_backoff) => continue,
                }
            }
        };

        state.send_replace(ListenerState::Processing);
        match handle(listener.processor.as_ref(), record).await {
            Ok(()) => {
                stats.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    topic = %listener.topic,
                    group = %listener.group_id,
                    "delivery not processed: {e}"
                );
            }
        }
    }

    subscription.close();
    state.send_replace(ListenerState::Idle);
    info!(topic = %listener.topic, group = %listener.group_id, "listener stopped");
}

#[derive(Debug, thiserror::Error)]
enum HandleError {
    #[error("partition {partition} offset {offset}: {source}")]
    Decode {
        partition: u32,
        offset: u64,
        source: crate::message::DecodeError,
    },

    #[error("partition {partition} offset {offset}: {source}")]
    Process {
        partition: u32,
        offset: u64,
        source: ProcessError,
    },
}

async fn handle(processor: &dyn Processor, record: DeliveryRecord) -> Result<(), HandleError> {
    let DeliveryRecord {
        topic,
        partition,
        offset,
        value,
        ..
    } = record;

    let message = Payload::decode(&value)
        .and_then(Payload::into_message)
        .map_err(|source| HandleError::Decode {
            partition,
            offset,
            source,
        })?;

    debug!(id = message.id(), partition, offset, "delivery decoded");

    let delivery = Delivery {
        message,
        topic,
        partition,
        offset,
    };

    let outcome = AssertUnwindSafe(processor.process(&delivery))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(ProcessError::Panicked(panic_message(panic.as_ref()))));

    outcome.map_err(|source| HandleError::Process {
        partition,
        offset,
        source,
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
