//! Runtime wiring of the event queue, sinks, chat transport and responder
//!
//! The [`Pipeline`] owns every background task. Shutdown closes the queue
//! first so sink workers drain what is already buffered, then stops the
//! responder and lets the chat connection close once nothing holds it.

use alert_relay_api::{ConfigError, ServiceConfig};
use alert_relay_core::{
    chat::{ChatSender, IncomingChatMessage, TwitchChatClient},
    generation::OllamaGenerator,
    queue::EventQueue,
    responder::ChatResponder,
    sinks::{spawn_sink_worker, AutomationBridge, ChatAnnouncer, Sink},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

/// A chat handle plus the stream of messages it receives
pub type ChatChannel = (Arc<dyn ChatSender>, mpsc::Receiver<IncomingChatMessage>);

struct SinkTask {
    name: String,
    task: JoinHandle<()>,
}

/// What happened to the sink workers at shutdown
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that finished draining in time
    pub drained: Vec<String>,
    /// Workers aborted at the deadline
    pub abandoned: Vec<String>,
}

pub struct Pipeline {
    queue: Arc<EventQueue>,
    sinks: Vec<SinkTask>,
    responder: Option<JoinHandle<()>>,
    chat_connection: Option<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(EventQueue::new(capacity)),
            sinks: Vec::new(),
            responder: None,
            chat_connection: None,
        }
    }

    /// Connect to chat when it is needed, then start everything else.
    pub fn start(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let needs_chat = config.sinks.enable_chat || config.responder.enabled;
        if !needs_chat {
            return Self::start_with_chat(config, None);
        }

        let (client, incoming, connection) =
            TwitchChatClient::spawn(config.chat.connection_config());
        info!(channel = %client.channel(), "Chat transport started");

        let sender: Arc<dyn ChatSender> = Arc::new(client);
        let mut pipeline = Self::start_with_chat(config, Some((sender, incoming)))?;
        pipeline.chat_connection = Some(connection);
        Ok(pipeline)
    }

    /// Start sinks and responder over an existing chat channel.
    pub fn start_with_chat(
        config: &ServiceConfig,
        chat: Option<ChatChannel>,
    ) -> Result<Self, ConfigError> {
        let mut pipeline = Self::new(config.queue.capacity_per_sink);
        let delivery_timeout = config.sinks.delivery_timeout();

        let (chat, incoming) = match chat {
            Some((sender, incoming)) => (Some(sender), Some(incoming)),
            None => (None, None),
        };

        if config.sinks.enable_chat {
            let sender = chat.clone().ok_or_else(|| ConfigError::Missing {
                key: "chat".to_string(),
            })?;
            pipeline.add_sink(Arc::new(ChatAnnouncer::new(sender)), delivery_timeout);
        }

        if config.sinks.enable_automation {
            let bridge = AutomationBridge::new(
                config.automation.url.clone(),
                config.automation.action.clone(),
                config.automation.connect_timeout(),
            );
            pipeline.add_sink(Arc::new(bridge), delivery_timeout);
        }

        if config.responder.enabled {
            if let (Some(sender), Some(incoming)) = (chat, incoming) {
                let generator = OllamaGenerator::new(
                    config.generation.url.clone(),
                    config.generation.model.clone(),
                    config.generation.timeout(),
                )
                .with_temperature(config.generation.temperature);
                let responder = Arc::new(ChatResponder::with_default_commands(
                    sender,
                    Arc::new(generator),
                    config.responder.responder_config()?,
                ));
                pipeline.responder = Some(tokio::spawn(responder.run(incoming)));
            }
        }

        if pipeline.sinks.is_empty() {
            warn!("No sinks enabled; alerts will be accepted and discarded");
        }

        Ok(pipeline)
    }

    pub fn queue(&self) -> Arc<EventQueue> {
        self.queue.clone()
    }

    /// Register `sink` on the queue and start its worker.
    pub fn add_sink(&mut self, sink: Arc<dyn Sink>, delivery_timeout: Duration) {
        let name = sink.name().to_string();
        let receiver = self.queue.register_sink(name.clone());
        let task = spawn_sink_worker(sink, receiver, delivery_timeout);
        info!(sink = %name, "Sink worker started");
        self.sinks.push(SinkTask { name, task });
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name.as_str()).collect()
    }

    /// Close the queue and wait up to `timeout` for sink workers to drain.
    pub async fn shutdown(self, timeout: Duration) -> ShutdownReport {
        let deadline = tokio::time::Instant::now() + timeout;
        self.queue.close();
        info!(timeout_secs = timeout.as_secs(), "Draining sink queues");

        let mut report = ShutdownReport::default();
        for SinkTask { name, mut task } in self.sinks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(_) => report.drained.push(name),
                Err(_) => {
                    warn!(sink = %name, "Sink did not drain before the shutdown deadline");
                    task.abort();
                    report.abandoned.push(name);
                }
            }
        }

        if let Some(responder) = self.responder {
            responder.abort();
        }

        if let Some(mut connection) = self.chat_connection {
            if tokio::time::timeout_at(deadline, &mut connection).await.is_err() {
                warn!("Chat connection did not close before the shutdown deadline");
                connection.abort();
            }
        }

        info!(
            drained = report.drained.len(),
            abandoned = report.abandoned.len(),
            "Pipeline stopped"
        );
        report
    }
}
