//! Tests for header parsing and the EventSub processor.

use super::*;
use crate::AlertKind;
use serde_json::json;

const SECRET: &str = "processor-test-secret";

fn header_map(message_type: &str, signature: &str) -> HashMap<String, String> {
    HashMap::from([
        (HEADER_MESSAGE_ID.to_string(), "msg-1".to_string()),
        (HEADER_MESSAGE_TIMESTAMP.to_string(), "2024-01-01T00:00:00Z".to_string()),
        (HEADER_MESSAGE_TYPE.to_string(), message_type.to_string()),
        (HEADER_MESSAGE_SIGNATURE.to_string(), signature.to_string()),
    ])
}

/// Build a correctly signed envelope for `body`.
fn signed_envelope(message_type: MessageType, body: &serde_json::Value) -> WebhookEnvelope {
    let body = Bytes::from(serde_json::to_vec(body).unwrap());
    let verifier = SignatureVerifier::new(SECRET);
    let signature = verifier.sign("msg-1", "2024-01-01T00:00:00Z", &body);
    WebhookEnvelope::new(
        WebhookHeaders {
            message_id: "msg-1".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            message_type,
            signature,
        },
        body,
    )
}

fn processor() -> (EventSubProcessor, Arc<EventQueue>) {
    let queue = Arc::new(EventQueue::new(10));
    (
        EventSubProcessor::new(SignatureVerifier::new(SECRET), queue.clone()),
        queue,
    )
}

mod header_tests {
    use super::*;

    /// All four headers parse into the typed struct.
    #[test]
    fn test_parse_complete_headers() {
        let headers =
            WebhookHeaders::from_http_headers(&header_map("notification", "sha256=abc")).unwrap();
        assert_eq!(headers.message_id, "msg-1");
        assert_eq!(headers.message_type, MessageType::Notification);
        assert_eq!(headers.signature, "sha256=abc");
    }

    /// Each missing header is reported by name.
    #[test]
    fn test_missing_header_is_required_error() {
        for name in [
            HEADER_MESSAGE_ID,
            HEADER_MESSAGE_TIMESTAMP,
            HEADER_MESSAGE_TYPE,
            HEADER_MESSAGE_SIGNATURE,
        ] {
            let mut map = header_map("notification", "sha256=abc");
            map.remove(name);
            let result = WebhookHeaders::from_http_headers(&map);
            assert_eq!(
                result,
                Err(ValidationError::Required {
                    field: name.to_string()
                })
            );
        }
    }

    /// Empty header values count as missing.
    #[test]
    fn test_empty_header_is_required_error() {
        let map = header_map("notification", "");
        assert!(matches!(
            WebhookHeaders::from_http_headers(&map),
            Err(ValidationError::Required { .. })
        ));
    }

    /// Unknown message types are malformed.
    #[test]
    fn test_unknown_message_type() {
        let map = header_map("something_else", "sha256=abc");
        assert!(matches!(
            WebhookHeaders::from_http_headers(&map),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    /// The handshake type string maps to HandshakeChallenge.
    #[test]
    fn test_handshake_message_type() {
        assert_eq!(
            "webhook_callback_verification".parse::<MessageType>(),
            Ok(MessageType::HandshakeChallenge)
        );
        assert_eq!("revocation".parse::<MessageType>(), Ok(MessageType::Revocation));
    }
}

mod processor_tests {
    use super::*;

    /// A handshake echoes the challenge and enqueues nothing.
    #[tokio::test]
    async fn test_handshake_echoes_challenge() {
        let (processor, queue) = processor();
        let chat = queue.register_sink("chat");

        let envelope = signed_envelope(
            MessageType::HandshakeChallenge,
            &json!({"challenge": "abc123", "subscription": {"type": "channel.follow"}}),
        );
        let outcome = processor.process(envelope).await.unwrap();

        assert_eq!(outcome, ProcessingOutcome::Challenge("abc123".to_string()));
        assert!(chat.is_empty());
    }

    /// A handshake without a challenge field is a malformed request.
    #[tokio::test]
    async fn test_handshake_without_challenge() {
        let (processor, _queue) = processor();
        let envelope = signed_envelope(MessageType::HandshakeChallenge, &json!({}));
        let result = processor.process(envelope).await;
        assert!(matches!(result, Err(WebhookError::MalformedRequest(_))));
    }

    /// A valid subscribe notification publishes exactly one event.
    #[tokio::test]
    async fn test_notification_publishes_event() {
        let (processor, queue) = processor();
        let mut chat = queue.register_sink("chat");

        let envelope = signed_envelope(
            MessageType::Notification,
            &json!({
                "subscription": {"type": "channel.subscribe", "version": "1"},
                "event": {"user_name": "Zoe", "tier": "1000"}
            }),
        );
        let outcome = processor.process(envelope).await.unwrap();

        let expected = AlertEvent::new(AlertKind::Subscribe, "Zoe", None).unwrap();
        assert_eq!(
            outcome,
            ProcessingOutcome::Accepted {
                event_type: "channel.subscribe".to_string(),
                event: Some(expected.clone()),
            }
        );
        assert_eq!(chat.try_consume(), Some(expected));
        assert!(chat.is_empty());
    }

    /// A bad signature is unauthorized and publishes nothing.
    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let (processor, queue) = processor();
        let chat = queue.register_sink("chat");

        let mut envelope = signed_envelope(
            MessageType::Notification,
            &json!({"subscription": {"type": "channel.follow"}, "event": {"user_name": "Eve"}}),
        );
        envelope.headers.signature = format!("sha256={}", "0".repeat(64));

        let result = processor.process(envelope).await;
        assert!(matches!(result, Err(WebhookError::Unauthorized)));
        assert!(chat.is_empty());
    }

    /// The signature is checked before the body is parsed.
    #[tokio::test]
    async fn test_signature_checked_before_json() {
        let (processor, _queue) = processor();
        let mut envelope = signed_envelope(MessageType::Notification, &json!({}));
        envelope.body = Bytes::from_static(b"not json");

        let result = processor.process(envelope).await;
        assert!(matches!(result, Err(WebhookError::Unauthorized)));
    }

    /// Unannounced types are accepted without publishing.
    #[tokio::test]
    async fn test_unknown_event_type_accepted_without_publish() {
        let (processor, queue) = processor();
        let chat = queue.register_sink("chat");

        let envelope = signed_envelope(
            MessageType::Notification,
            &json!({"subscription": {"type": "channel.raid"}, "event": {"user_name": "Raider"}}),
        );
        let outcome = processor.process(envelope).await.unwrap();

        assert!(matches!(outcome, ProcessingOutcome::Accepted { event: None, .. }));
        assert!(chat.is_empty());
    }

    /// A malformed cheer is an acknowledged error and publishes nothing.
    #[tokio::test]
    async fn test_malformed_payload_is_acknowledged() {
        let (processor, queue) = processor();
        let chat = queue.register_sink("chat");

        let envelope = signed_envelope(
            MessageType::Notification,
            &json!({"subscription": {"type": "channel.cheer"}, "event": {"user_name": "Ada"}}),
        );
        let error = processor.process(envelope).await.unwrap_err();

        assert!(matches!(error, WebhookError::MalformedPayload(_)));
        assert!(error.is_acknowledged());
        assert!(chat.is_empty());
    }

    /// A notification without an event object is a malformed payload.
    #[tokio::test]
    async fn test_notification_without_event_object() {
        let (processor, _queue) = processor();
        let envelope = signed_envelope(
            MessageType::Notification,
            &json!({"subscription": {"type": "channel.follow"}}),
        );
        let result = processor.process(envelope).await;
        assert!(matches!(result, Err(WebhookError::MalformedPayload(_))));
    }

    /// Revocations are reported and publish nothing.
    #[tokio::test]
    async fn test_revocation_reported() {
        let (processor, queue) = processor();
        let chat = queue.register_sink("chat");

        let envelope = signed_envelope(
            MessageType::Revocation,
            &json!({"subscription": {"type": "channel.follow", "status": "authorization_revoked"}}),
        );
        let outcome = processor.process(envelope).await.unwrap();

        assert_eq!(
            outcome,
            ProcessingOutcome::Revoked {
                subscription_type: "channel.follow".to_string(),
                status: "authorization_revoked".to_string(),
            }
        );
        assert!(chat.is_empty());
    }

    /// Only malformed payloads are acknowledged; other errors are not.
    #[test]
    fn test_error_acknowledgement_classification() {
        assert!(!WebhookError::Unauthorized.is_acknowledged());
        assert!(!WebhookError::MalformedRequest(ValidationError::Required {
            field: "x".to_string()
        })
        .is_acknowledged());
    }
}
