//! Common test utilities for alert relay integration tests
//!
//! This module provides:
//! - A recording chat transport
//! - A local automation host that collects WebSocket frames
//! - A relay harness wiring the router, queue and sink workers together
//! - Signed callback request builders

#![allow(dead_code)]

use alert_relay_api::{create_router, AppState, ServiceConfig};
use alert_relay_core::{
    chat::{ChatError, ChatSender},
    queue::EventQueue,
    signature::SignatureVerifier,
    sinks::{spawn_sink_worker, AutomationBridge, ChatAnnouncer, Sink},
    webhook::{
        HEADER_MESSAGE_ID, HEADER_MESSAGE_SIGNATURE, HEADER_MESSAGE_TIMESTAMP,
        HEADER_MESSAGE_TYPE,
    },
};
use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

pub const SECRET: &str = "integration-shared-secret";
pub const TIMESTAMP: &str = "2024-05-01T12:00:00Z";
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Chat Transport
// ============================================================================

/// Chat transport that records every message it is asked to send
#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSender for RecordingChat {
    async fn send_message(&self, text: &str) -> Result<(), ChatError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ============================================================================
// Automation Host
// ============================================================================

/// Local WebSocket server standing in for the automation host
pub struct AutomationHost {
    pub url: String,
    frames: mpsc::UnboundedReceiver<String>,
    _server: JoinHandle<()>,
}

impl AutomationHost {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, frames) = mpsc::unbounded_channel();

        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    while let Some(Ok(message)) = socket.next().await {
                        if let Message::Text(text) = message {
                            let _ = tx.send(text.as_str().to_string());
                        }
                    }
                });
            }
        });

        Self {
            url,
            frames,
            _server: server,
        }
    }

    /// Next text frame, or `None` if nothing arrives within `wait`.
    pub async fn next_frame(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.frames.recv())
            .await
            .ok()
            .flatten()
    }
}

/// A `ws://` URL on which nothing is listening.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", address)
}

// ============================================================================
// Relay Harness
// ============================================================================

/// Router plus queue and sink workers, without the network listener
pub struct Relay {
    pub router: Router,
    pub queue: Arc<EventQueue>,
    pub chat: Arc<RecordingChat>,
    workers: Vec<JoinHandle<()>>,
}

impl Relay {
    /// Chat announcer and automation bridge pointed at `automation_url`.
    pub fn start(automation_url: &str) -> Self {
        let chat = Arc::new(RecordingChat::default());
        let sender: Arc<dyn ChatSender> = chat.clone();
        let sinks: Vec<Arc<dyn Sink>> = vec![
            Arc::new(ChatAnnouncer::new(sender)),
            Arc::new(AutomationBridge::new(
                automation_url,
                "TwitchAlert",
                Duration::from_secs(2),
            )),
        ];
        Self::with_sinks(chat, sinks)
    }

    pub fn with_sinks(chat: Arc<RecordingChat>, sinks: Vec<Arc<dyn Sink>>) -> Self {
        let mut config = ServiceConfig::default();
        config.eventsub.secret = SECRET.to_string();

        let queue = Arc::new(EventQueue::new(config.queue.capacity_per_sink));
        let workers = sinks
            .into_iter()
            .map(|sink| {
                let receiver = queue.register_sink(sink.name().to_string());
                spawn_sink_worker(sink, receiver, DELIVERY_TIMEOUT)
            })
            .collect();

        let state = AppState::for_eventsub(config, queue.clone()).unwrap();
        Self {
            router: create_router(state),
            queue,
            chat,
            workers,
        }
    }

    /// Close the queue and wait for every worker to drain.
    pub async fn drain(self) {
        self.queue.close();
        for worker in self.workers {
            tokio::time::timeout(Duration::from_secs(10), worker)
                .await
                .unwrap()
                .unwrap();
        }
    }

    /// Poll until `sink` has finished `count` deliveries, successful or not.
    pub async fn wait_for_attempts(&self, sink: &str, count: u64) {
        for _ in 0..500 {
            let attempts = self
                .queue
                .stats()
                .iter()
                .find(|s| s.sink == sink)
                .map(|s| s.delivered + s.failed)
                .unwrap_or_default();
            if attempts >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sink '{}' did not reach {} attempts", sink, count);
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Callback request signed with [`SECRET`].
pub fn signed_request(message_id: &str, message_type: &str, body: &str) -> Request<Body> {
    let signature = SignatureVerifier::new(SECRET).sign(message_id, TIMESTAMP, body.as_bytes());
    request_with_signature(message_id, message_type, body, &signature)
}

pub fn request_with_signature(
    message_id: &str,
    message_type: &str,
    body: &str,
    signature: &str,
) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/eventsub/callback")
        .header("content-type", "application/json")
        .header(HEADER_MESSAGE_ID, message_id)
        .header(HEADER_MESSAGE_TIMESTAMP, TIMESTAMP)
        .header(HEADER_MESSAGE_TYPE, message_type)
        .header(HEADER_MESSAGE_SIGNATURE, signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
