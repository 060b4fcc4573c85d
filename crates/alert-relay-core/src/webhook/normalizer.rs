//! Maps EventSub `event` payloads onto [`AlertEvent`]s.

use crate::{AlertEvent, AlertKind};
use serde_json::Value;

#[cfg(test)]
#[path = "normalizer_tests.rs"]
mod tests;

/// Errors for recognized event types whose payload is missing required data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field format: {field} - {message}")]
    InvalidField { field: String, message: String },
}

/// Normalize an EventSub event payload.
///
/// Returns `Ok(None)` for event types the relay does not announce; those are
/// acknowledged but otherwise ignored.
///
/// The subject is `user_name`, falling back to `broadcaster_user_name` when the
/// former is absent, null or empty (anonymous gifts and cheers carry no user).
///
/// # Errors
///
/// - [`NormalizationError::MissingField`] when neither name is present, or a
///   cheer has no `bits`.
/// - [`NormalizationError::InvalidField`] when `bits` is not a non-negative integer.
pub fn normalize(event_type: &str, payload: &Value) -> Result<Option<AlertEvent>, NormalizationError> {
    let Some(kind) = AlertKind::from_event_type(event_type) else {
        return Ok(None);
    };

    let subject = extract_subject(payload)?;
    let magnitude = match kind {
        AlertKind::Cheer => Some(extract_bits(payload)?),
        AlertKind::Follow | AlertKind::Subscribe | AlertKind::GiftSub => None,
    };

    AlertEvent::new(kind, subject, magnitude)
        .map(Some)
        .map_err(|e| NormalizationError::InvalidField {
            field: "event".to_string(),
            message: e.to_string(),
        })
}

fn non_empty_str<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn extract_subject(payload: &Value) -> Result<String, NormalizationError> {
    non_empty_str(payload, "user_name")
        .or_else(|| non_empty_str(payload, "broadcaster_user_name"))
        .map(str::to_string)
        .ok_or_else(|| NormalizationError::MissingField {
            field: "user_name".to_string(),
        })
}

/// Bits arrive as a JSON number from the platform; string digits are accepted too.
fn extract_bits(payload: &Value) -> Result<u64, NormalizationError> {
    let invalid = |message: &str| NormalizationError::InvalidField {
        field: "bits".to_string(),
        message: message.to_string(),
    };

    match payload.get("bits") {
        None | Some(Value::Null) => Err(NormalizationError::MissingField {
            field: "bits".to_string(),
        }),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| invalid("must be a non-negative integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid("must be a non-negative integer")),
        Some(_) => Err(invalid("must be a number")),
    }
}
