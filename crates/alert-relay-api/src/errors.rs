//! Error types for the HTTP service

use alert_relay_core::{ValidationError, WebhookError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::warn;

/// Callback handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: missing headers, undecodable JSON
/// - `401 Unauthorized`: signature mismatch
///
/// Payload problems on a recognised event type never surface here; the
/// handler acknowledges those so the platform does not redeliver them.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Maps to: `400 Bad Request`
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Maps to: `401 Unauthorized` with body `{"error":"Unauthorized"}`
    #[error("Unauthorized")]
    Unauthorized,
}

impl From<ValidationError> for WebhookHandlerError {
    fn from(e: ValidationError) -> Self {
        Self::MalformedRequest(e.to_string())
    }
}

impl From<WebhookError> for WebhookHandlerError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::Unauthorized => Self::Unauthorized,
            other => Self::MalformedRequest(other.to_string()),
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MalformedRequest(ref message) => {
                warn!(error = %message, "Rejected malformed callback");
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}
