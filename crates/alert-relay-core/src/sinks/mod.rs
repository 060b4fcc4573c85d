//! # Delivery Sinks
//!
//! A [`Sink`] turns an [`AlertEvent`] into one outbound side effect. Each sink
//! is driven by its own [`SinkWorker`] draining that sink's queue, so delivery
//! failures stay inside the sink.
//!
//! Failure policy: a failed or timed-out delivery is logged and counted, never
//! retried, and the worker moves on to the next event.

pub mod automation_bridge;
pub mod chat_announcer;

pub use automation_bridge::{AutomationBridge, BridgeCommand};
pub use chat_announcer::{format_alert, ChatAnnouncer};

use crate::chat::ChatError;
use crate::queue::SinkReceiver;
use crate::AlertEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

/// Default upper bound for a single delivery.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while delivering a single alert
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Chat send failed: {0}")]
    Chat(#[from] ChatError),

    #[error("Connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A delivery destination for alert events
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stable name, used as the queue name and in logs and metrics.
    fn name(&self) -> &str;

    async fn deliver(&self, event: &AlertEvent) -> Result<(), DeliveryError>;
}

/// Drains one sink's queue into the sink.
pub struct SinkWorker {
    sink: Arc<dyn Sink>,
    delivery_timeout: Duration,
}

impl SinkWorker {
    pub fn new(sink: Arc<dyn Sink>, delivery_timeout: Duration) -> Self {
        Self {
            sink,
            delivery_timeout,
        }
    }

    /// Deliver events until the queue is closed and drained.
    pub async fn run(self, mut receiver: SinkReceiver) {
        let sink = self.sink.name().to_string();
        info!(sink = %sink, "Sink worker started");

        while let Some(event) = receiver.consume().await {
            match self.deliver_one(&event).await {
                Ok(()) => {
                    receiver.record_delivered();
                    debug!(sink = %sink, event_kind = %event.kind(), subject = %event.subject(), "Alert delivered");
                }
                Err(e) => {
                    receiver.record_failed();
                    warn!(
                        sink = %sink,
                        event_kind = %event.kind(),
                        subject = %event.subject(),
                        error = %e,
                        "Alert delivery failed; continuing"
                    );
                }
            }
        }

        info!(sink = %sink, "Sink worker stopped; queue closed and drained");
    }

    async fn deliver_one(&self, event: &AlertEvent) -> Result<(), DeliveryError> {
        tokio::time::timeout(self.delivery_timeout, self.sink.deliver(event))
            .await
            .map_err(|_| DeliveryError::Timeout {
                timeout: self.delivery_timeout,
            })?
    }
}

/// Spawn a worker task for `sink` on the current runtime.
pub fn spawn_sink_worker(
    sink: Arc<dyn Sink>,
    receiver: SinkReceiver,
    delivery_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(SinkWorker::new(sink, delivery_timeout).run(receiver))
}
