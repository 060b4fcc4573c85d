//! # Alert Relay Core
//!
//! Core logic for relaying live-stream platform events (follows, subscriptions,
//! gifted subs, cheers) from EventSub webhook callbacks into independent
//! delivery sinks.
//!
//! ## Architecture
//!
//! ```text
//! webhook ─▶ signature ─▶ normalizer ─▶ EventQueue ─┬─▶ ChatAnnouncer
//!                                                    └─▶ AutomationBridge
//! ```
//!
//! - The HTTP layer (in `alert-relay-api`) only verifies, normalizes and publishes.
//! - Every sink owns an independent bounded queue and a worker task, so a
//!   broken sink never blocks the producer or the other sinks.
//! - External collaborators (chat transport, text generation) sit behind traits.
//!
//! ## Usage
//!
//! ```rust
//! use alert_relay_core::{AlertEvent, AlertKind};
//! use alert_relay_core::queue::EventQueue;
//!
//! let queue = EventQueue::new(1000);
//! let chat = queue.register_sink("chat");
//!
//! queue.publish(AlertEvent::new(AlertKind::Follow, "Ada", None).unwrap());
//! assert_eq!(chat.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod bootstrap;
pub mod chat;
pub mod generation;
pub mod queue;
pub mod responder;
pub mod retry;
pub mod signature;
pub mod sinks;
pub mod webhook;

pub use webhook::{WebhookError, WebhookProcessor};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// Alert Events
// ============================================================================

/// The closed set of platform events the relay announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Follow,
    Subscribe,
    GiftSub,
    Cheer,
}

impl AlertKind {
    /// All kinds, in subscription order.
    pub const ALL: [AlertKind; 4] = [
        AlertKind::Follow,
        AlertKind::Subscribe,
        AlertKind::GiftSub,
        AlertKind::Cheer,
    ];

    /// EventSub subscription type carrying this kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Follow => "channel.follow",
            Self::Subscribe => "channel.subscribe",
            Self::GiftSub => "channel.subscription.gift",
            Self::Cheer => "channel.cheer",
        }
    }

    /// Short identifier used by the automation host (`follow`, `sub`, `gift`, `bits`).
    pub fn automation_type(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Subscribe => "sub",
            Self::GiftSub => "gift",
            Self::Cheer => "bits",
        }
    }

    /// Map an EventSub subscription type to a kind.
    ///
    /// Returns `None` for any type the relay does not announce.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "channel.follow" => Some(Self::Follow),
            "channel.subscribe" => Some(Self::Subscribe),
            "channel.subscription.gift" => Some(Self::GiftSub),
            "channel.cheer" => Some(Self::Cheer),
            _ => None,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

impl FromStr for AlertKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_event_type(s).ok_or_else(|| ValidationError::InvalidFormat {
            field: "event_type".to_string(),
            message: format!("unsupported event type '{}'", s),
        })
    }
}

/// A normalized alert, immutable once created.
///
/// `magnitude` is present only for [`AlertKind::Cheer`] and holds the bit count.
/// Deserialization goes through [`AlertEvent::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAlertEvent")]
pub struct AlertEvent {
    kind: AlertKind,
    subject: String,
    magnitude: Option<u64>,
}

impl AlertEvent {
    /// Create a new alert event.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::Required`] if `subject` is empty or whitespace.
    /// - [`ValidationError::InvalidFormat`] if `magnitude` is given for a kind other
    ///   than cheer, or missing for a cheer.
    pub fn new(
        kind: AlertKind,
        subject: impl Into<String>,
        magnitude: Option<u64>,
    ) -> Result<Self, ValidationError> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "subject".to_string(),
            });
        }

        match (kind, magnitude) {
            (AlertKind::Cheer, None) => {
                return Err(ValidationError::InvalidFormat {
                    field: "magnitude".to_string(),
                    message: "cheer events require a bit count".to_string(),
                })
            }
            (AlertKind::Cheer, Some(_)) | (_, None) => {}
            (_, Some(_)) => {
                return Err(ValidationError::InvalidFormat {
                    field: "magnitude".to_string(),
                    message: format!("{} events do not carry a magnitude", kind),
                })
            }
        }

        Ok(Self {
            kind,
            subject,
            magnitude,
        })
    }

    pub fn kind(&self) -> AlertKind {
        self.kind
    }

    /// Display name of the acting user.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Bit count for cheers.
    pub fn magnitude(&self) -> Option<u64> {
        self.magnitude
    }
}

#[derive(Deserialize)]
struct RawAlertEvent {
    kind: AlertKind,
    subject: String,
    #[serde(default)]
    magnitude: Option<u64>,
}

impl TryFrom<RawAlertEvent> for AlertEvent {
    type Error = ValidationError;

    fn try_from(raw: RawAlertEvent) -> Result<Self, Self::Error> {
        AlertEvent::new(raw.kind, raw.subject, raw.magnitude)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },
}
