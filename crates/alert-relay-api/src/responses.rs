//! Response types for the HTTP service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body returned from the callback route
///
/// Serialises as `{"challenge": "..."}` for a handshake and `{"status": "ok"}`
/// for everything acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallbackResponse {
    Challenge { challenge: String },
    Status { status: String },
}

impl CallbackResponse {
    pub fn ok() -> Self {
        Self::Status {
            status: "ok".to_string(),
        }
    }
}

/// Liveness response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Readiness response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub sinks: Vec<String>,
    pub queue_open: bool,
    pub timestamp: DateTime<Utc>,
}
