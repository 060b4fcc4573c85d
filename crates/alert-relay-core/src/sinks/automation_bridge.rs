//! Pushes alerts to an automation host over a short-lived WebSocket.
//!
//! The host is optional local software and is often not running; every
//! delivery opens a fresh connection, sends one JSON text frame and closes.

use super::{DeliveryError, Sink};
use crate::AlertEvent;
use async_trait::async_trait;
use futures_util::SinkExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "automation_bridge_tests.rs"]
mod tests;

pub const DEFAULT_ACTION: &str = "TwitchAlert";

/// Command frame understood by the automation host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeCommand {
    pub request: String,
    pub action: String,
    pub args: BridgeArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeArgs {
    /// `follow`, `sub`, `gift` or `bits`
    #[serde(rename = "type")]
    pub kind: String,
    pub user: String,
}

impl BridgeCommand {
    pub fn from_event(event: &AlertEvent, action: &str) -> Self {
        Self {
            request: "DoAction".to_string(),
            action: action.to_string(),
            args: BridgeArgs {
                kind: event.kind().automation_type().to_string(),
                user: event.subject().to_string(),
            },
        }
    }
}

/// Sink forwarding alerts to the automation host
#[derive(Debug, Clone)]
pub struct AutomationBridge {
    url: String,
    action: String,
    connect_timeout: Duration,
}

impl AutomationBridge {
    pub const NAME: &'static str = "automation";

    pub fn new(url: impl Into<String>, action: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            action: action.into(),
            connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn connection_error(&self, message: impl Into<String>) -> DeliveryError {
        DeliveryError::Connection {
            endpoint: self.url.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Sink for AutomationBridge {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip(self, event), fields(endpoint = %self.url, event_kind = %event.kind()))]
    async fn deliver(&self, event: &AlertEvent) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(&BridgeCommand::from_event(event, &self.action))?;

        let (mut socket, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| DeliveryError::Timeout {
                    timeout: self.connect_timeout,
                })?
                .map_err(|e| self.connection_error(e.to_string()))?;

        socket
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| DeliveryError::Send(e.to_string()))?;

        if let Err(e) = socket.close(None).await {
            debug!(error = %e, "Automation socket close failed after send");
        }

        Ok(())
    }
}
