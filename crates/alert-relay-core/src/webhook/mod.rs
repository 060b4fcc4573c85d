//! # Webhook Processing Module
//!
//! Parses EventSub callback headers, verifies signatures, dispatches on the
//! declared message type and publishes normalized alerts to the [`EventQueue`].
//!
//! Per-request flow: `Received → SignatureChecked → {Rejected | TypeDispatched}`.
//! Nothing is published unless the signature verified.

pub mod normalizer;

pub use normalizer::{normalize, NormalizationError};

use crate::queue::EventQueue;
use crate::signature::SignatureVerifier;
use crate::{AlertEvent, ValidationError};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

// Header names, lowercase as produced by the HTTP layer.
pub const HEADER_MESSAGE_ID: &str = "twitch-eventsub-message-id";
pub const HEADER_MESSAGE_TIMESTAMP: &str = "twitch-eventsub-message-timestamp";
pub const HEADER_MESSAGE_TYPE: &str = "twitch-eventsub-message-type";
pub const HEADER_MESSAGE_SIGNATURE: &str = "twitch-eventsub-message-signature";

// ============================================================================
// Core Types
// ============================================================================

/// Declared EventSub message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Notification,
    HandshakeChallenge,
    Revocation,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::HandshakeChallenge => "webhook_callback_verification",
            Self::Revocation => "revocation",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notification" => Ok(Self::Notification),
            "webhook_callback_verification" => Ok(Self::HandshakeChallenge),
            "revocation" => Ok(Self::Revocation),
            other => Err(ValidationError::InvalidFormat {
                field: HEADER_MESSAGE_TYPE.to_string(),
                message: format!("unknown message type '{}'", other),
            }),
        }
    }
}

/// EventSub headers required to verify and dispatch a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub message_id: String,
    pub timestamp: String,
    pub message_type: MessageType,
    pub signature: String,
}

impl WebhookHeaders {
    /// Parse headers from a map keyed by lowercase header name.
    ///
    /// # Errors
    ///
    /// [`ValidationError::Required`] for a missing or empty header,
    /// [`ValidationError::InvalidFormat`] for an unknown message type.
    pub fn from_http_headers(headers: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let required = |name: &str| -> Result<String, ValidationError> {
            headers
                .get(name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ValidationError::Required {
                    field: name.to_string(),
                })
        };

        Ok(Self {
            message_id: required(HEADER_MESSAGE_ID)?,
            timestamp: required(HEADER_MESSAGE_TIMESTAMP)?,
            message_type: required(HEADER_MESSAGE_TYPE)?.parse()?,
            signature: required(HEADER_MESSAGE_SIGNATURE)?,
        })
    }
}

/// A callback request: parsed headers plus the raw, unmodified body.
///
/// The body must stay byte-for-byte as received; the signature covers it.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub headers: WebhookHeaders,
    pub body: Bytes,
}

impl WebhookEnvelope {
    pub fn new(headers: WebhookHeaders, body: Bytes) -> Self {
        Self { headers, body }
    }

    pub fn message_id(&self) -> &str {
        &self.headers.message_id
    }

    pub fn message_type(&self) -> MessageType {
        self.headers.message_type
    }
}

/// Result of a successfully handled callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Echo this challenge back to complete subscription setup
    Challenge(String),

    /// A notification was accepted; `event` is set when it was published
    Accepted {
        event_type: String,
        event: Option<AlertEvent>,
    },

    /// A subscription was revoked by the platform
    Revoked {
        subscription_type: String,
        status: String,
    },
}

// ============================================================================
// Error Types
// ============================================================================

/// Webhook processing failures
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Missing headers or required fields; rejected with a 4xx
    #[error("Malformed request: {0}")]
    MalformedRequest(#[from] ValidationError),

    /// Signature mismatch
    #[error("Unauthorized")]
    Unauthorized,

    /// Body is not valid JSON
    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Recognized event type whose payload lacks required fields
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] NormalizationError),
}

impl WebhookError {
    /// Whether the platform should still receive a success acknowledgement.
    ///
    /// Retrying a malformed payload cannot succeed, so it is acknowledged and dropped.
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::MalformedPayload(_))
    }
}

// ============================================================================
// Core Operations (Traits)
// ============================================================================

/// Interface for the callback processing pipeline
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    /// Verify, dispatch and (for notifications) publish a callback.
    async fn process(&self, envelope: WebhookEnvelope) -> Result<ProcessingOutcome, WebhookError>;
}

// ============================================================================
// Default Implementation
// ============================================================================

/// EventSub processor publishing normalized alerts to an [`EventQueue`]
pub struct EventSubProcessor {
    verifier: SignatureVerifier,
    queue: Arc<EventQueue>,
}

impl EventSubProcessor {
    pub fn new(verifier: SignatureVerifier, queue: Arc<EventQueue>) -> Self {
        Self { verifier, queue }
    }

    fn handle_challenge(&self, body: &Value) -> Result<ProcessingOutcome, WebhookError> {
        let challenge = body
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::Required {
                field: "challenge".to_string(),
            })?;

        let subscription_type = body
            .pointer("/subscription/type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(
            subscription_type = %subscription_type,
            "Answering subscription handshake challenge"
        );

        Ok(ProcessingOutcome::Challenge(challenge.to_string()))
    }

    fn handle_revocation(&self, body: &Value) -> ProcessingOutcome {
        let field = |pointer: &str| {
            body.pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };
        let subscription_type = field("/subscription/type");
        let status = field("/subscription/status");

        warn!(
            subscription_type = %subscription_type,
            status = %status,
            "EventSub subscription revoked by platform"
        );

        ProcessingOutcome::Revoked {
            subscription_type,
            status,
        }
    }

    fn handle_notification(&self, body: &Value) -> Result<ProcessingOutcome, WebhookError> {
        let event_type = body
            .pointer("/subscription/type")
            .and_then(Value::as_str)
            .ok_or_else(|| NormalizationError::MissingField {
                field: "subscription.type".to_string(),
            })?
            .to_string();

        let payload = body
            .get("event")
            .filter(|event| event.is_object())
            .ok_or_else(|| NormalizationError::MissingField {
                field: "event".to_string(),
            })?;

        let Some(event) = normalize(&event_type, payload)? else {
            debug!(event_type = %event_type, "Ignoring unannounced event type");
            return Ok(ProcessingOutcome::Accepted {
                event_type,
                event: None,
            });
        };

        let report = self.queue.publish(event.clone());
        info!(
            event_type = %event_type,
            event_kind = ?event.kind(),
            subject = %event.subject(),
            sinks = report.delivered_to,
            "Published alert event"
        );

        Ok(ProcessingOutcome::Accepted {
            event_type,
            event: Some(event),
        })
    }
}

#[async_trait]
impl WebhookProcessor for EventSubProcessor {
    #[instrument(skip(self, envelope), fields(
        message_id = %envelope.message_id(),
        message_type = %envelope.message_type()
    ))]
    async fn process(&self, envelope: WebhookEnvelope) -> Result<ProcessingOutcome, WebhookError> {
        let headers = &envelope.headers;
        if !self.verifier.verify(
            &headers.message_id,
            &headers.timestamp,
            &envelope.body,
            &headers.signature,
        ) {
            warn!("Rejecting callback with invalid signature");
            return Err(WebhookError::Unauthorized);
        }

        let body: Value = serde_json::from_slice(&envelope.body)?;

        match headers.message_type {
            MessageType::HandshakeChallenge => self.handle_challenge(&body),
            MessageType::Revocation => Ok(self.handle_revocation(&body)),
            MessageType::Notification => self.handle_notification(&body),
        }
    }
}

impl fmt::Debug for EventSubProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubProcessor")
            .field("verifier", &self.verifier)
            .field("sinks", &self.queue.sink_count())
            .finish()
    }
}
