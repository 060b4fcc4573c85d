//! Tests for the automation bridge sink.

use super::*;
use crate::AlertKind;
use futures_util::StreamExt;
use tokio::net::TcpListener;

const WAIT: Duration = Duration::from_secs(5);

fn event(kind: AlertKind, subject: &str, magnitude: Option<u64>) -> AlertEvent {
    AlertEvent::new(kind, subject, magnitude).unwrap()
}

/// Accept one WebSocket connection and return the first text frame.
async fn receive_one_frame(listener: TcpListener) -> String {
    let (stream, _) = listener.accept().await.unwrap();
    let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

mod command_tests {
    use super::*;

    /// The command serializes to the exact wire shape.
    #[test]
    fn test_command_wire_format() {
        let command = BridgeCommand::from_event(&event(AlertKind::Subscribe, "Zoe", None), DEFAULT_ACTION);
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"request":"DoAction","action":"TwitchAlert","args":{"type":"sub","user":"Zoe"}}"#
        );
    }

    /// Each kind maps to its automation type.
    #[test]
    fn test_kind_mapping() {
        let cases = [
            (event(AlertKind::Follow, "a", None), "follow"),
            (event(AlertKind::Subscribe, "a", None), "sub"),
            (event(AlertKind::GiftSub, "a", None), "gift"),
            (event(AlertKind::Cheer, "a", Some(5)), "bits"),
        ];
        for (event, expected) in cases {
            assert_eq!(BridgeCommand::from_event(&event, DEFAULT_ACTION).args.kind, expected);
        }
    }

    /// The action name is configurable; the request verb is not.
    #[test]
    fn test_custom_action() {
        let command = BridgeCommand::from_event(&event(AlertKind::Follow, "Ada", None), "MyAlerts");
        assert_eq!(command.action, "MyAlerts");
        assert_eq!(command.request, "DoAction");
    }
}

mod deliver_tests {
    use super::*;

    /// Delivery sends one JSON text frame to the host.
    #[tokio::test]
    async fn test_deliver_sends_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(receive_one_frame(listener));

        let bridge = AutomationBridge::new(url, DEFAULT_ACTION, WAIT);
        bridge
            .deliver(&event(AlertKind::Cheer, "Ada", Some(100)))
            .await
            .unwrap();

        let frame = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
        assert_eq!(
            frame,
            r#"{"request":"DoAction","action":"TwitchAlert","args":{"type":"bits","user":"Ada"}}"#
        );
    }

    /// Each delivery uses its own connection.
    #[tokio::test]
    async fn test_connection_per_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let mut frames = Vec::new();
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
                if let Some(Ok(Message::Text(text))) = socket.next().await {
                    frames.push(text.as_str().to_string());
                }
            }
            frames
        });

        let bridge = AutomationBridge::new(url, DEFAULT_ACTION, WAIT);
        bridge.deliver(&event(AlertKind::Follow, "one", None)).await.unwrap();
        bridge.deliver(&event(AlertKind::Follow, "two", None)).await.unwrap();

        let frames = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains(r#""user":"one""#));
        assert!(frames[1].contains(r#""user":"two""#));
    }

    /// An unreachable host is a connection error.
    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let bridge = AutomationBridge::new(url, DEFAULT_ACTION, WAIT);
        let result = bridge.deliver(&event(AlertKind::Follow, "Ada", None)).await;
        assert!(matches!(result, Err(DeliveryError::Connection { .. })));
    }

    /// A host that accepts TCP but never answers the handshake times out.
    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let _silent = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let timeout = Duration::from_millis(200);
        let bridge = AutomationBridge::new(url, DEFAULT_ACTION, timeout);
        let result = bridge.deliver(&event(AlertKind::Follow, "Ada", None)).await;
        assert!(matches!(result, Err(DeliveryError::Timeout { timeout: t }) if t == timeout));
    }
}
