//! # Chat Responder
//!
//! Reacts to incoming chat. Free text is turned into a persona prompt for the
//! generation service and the reply is posted back; messages starting with the
//! command prefix go to the [`CommandRegistry`] instead.
//!
//! Nothing here returns an error to the caller: generation and send failures
//! are logged and reported through [`ResponderOutcome`].
//!
//! [`ChatResponder::run`] handles each message in its own task, at most
//! `max_in_flight` at once. Messages arriving while every slot is busy are
//! dropped and counted, so replies never lag behind a growing backlog.

use crate::chat::{ChatSender, IncomingChatMessage};
use crate::generation::TextGenerator;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "responder_tests.rs"]
mod tests;

pub const DEFAULT_PERSONA: &str = "Bob Smith";
pub const DEFAULT_FALLBACK_REPLY: &str = "Yo, my AI brain crashed mid-thought 💀";
pub const DEFAULT_MAX_IN_FLIGHT: usize = 2;

/// Responder behaviour settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderConfig {
    pub command_prefix: char,
    pub persona: String,
    /// Posted when generation fails; `None` stays silent instead
    pub fallback_reply: Option<String>,
    /// Skip messages written by the bot account
    pub ignore_self: bool,
    /// Messages handled concurrently; zero is raised to one
    pub max_in_flight: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            command_prefix: '!',
            persona: DEFAULT_PERSONA.to_string(),
            fallback_reply: Some(DEFAULT_FALLBACK_REPLY.to_string()),
            ignore_self: true,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Prompt asking the persona to react to a chat line.
pub fn persona_prompt(persona: &str, author: &str, text: &str) -> String {
    format!(
        "You're {persona}, a sarcastic, hype Twitch personality. Someone in chat named {author} just said: \"{text}\".\n\
         React in 1-2 short lines like you're part of the stream. Never say you're an AI."
    )
}

/// Prompt for the built-in `roastme` command.
pub fn roast_prompt(author: &str) -> String {
    format!("Roast '{author}' like you're a Twitch chat legend. Funny, brutal, one-liner only.")
}

// ============================================================================
// Commands
// ============================================================================

/// A parsed `!name args` chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation<'a> {
    /// Lowercased name without the prefix
    pub name: String,
    pub args: &'a str,
    pub message: &'a IncomingChatMessage,
}

impl<'a> CommandInvocation<'a> {
    /// Parse `message` if its text starts with `prefix`.
    pub fn parse(prefix: char, message: &'a IncomingChatMessage) -> Option<Self> {
        let body = message.text.trim().strip_prefix(prefix)?;
        let (name, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
        Some(Self {
            name: name.to_lowercase(),
            args: args.trim(),
            message,
        })
    }
}

/// Handles one chat command; returns the reply to post, if any.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, invocation: &CommandInvocation<'_>) -> Option<String>;
}

/// Command handlers keyed by lowercase name
#[derive(Default, Clone)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(name.to_lowercase(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

/// `!roastme`: a generated one-line roast of the caller
pub struct RoastCommand {
    generator: Arc<dyn TextGenerator>,
    fallback_reply: Option<String>,
}

impl RoastCommand {
    pub const NAME: &'static str = "roastme";

    pub fn new(generator: Arc<dyn TextGenerator>, fallback_reply: Option<String>) -> Self {
        Self {
            generator,
            fallback_reply,
        }
    }
}

#[async_trait]
impl CommandHandler for RoastCommand {
    async fn handle(&self, invocation: &CommandInvocation<'_>) -> Option<String> {
        match self
            .generator
            .generate(&roast_prompt(&invocation.message.author))
            .await
        {
            Ok(reply) if !reply.trim().is_empty() => Some(reply),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, command = Self::NAME, "Roast generation failed");
                self.fallback_reply.clone()
            }
        }
    }
}

// ============================================================================
// Responder
// ============================================================================

/// What the responder did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderOutcome {
    /// Authored by the bot itself
    IgnoredEcho,
    IgnoredEmpty,
    /// A reply was posted
    Replied(String),
    /// Generation produced nothing to say
    Skipped,
    /// Prefixed message with no registered handler
    UnknownCommand(String),
    /// The reply could not be posted
    SendFailed,
}

pub struct ChatResponder {
    chat: Arc<dyn ChatSender>,
    generator: Arc<dyn TextGenerator>,
    commands: CommandRegistry,
    config: ResponderConfig,
    in_flight: Arc<Semaphore>,
    dropped: AtomicU64,
}

impl ChatResponder {
    pub fn new(
        chat: Arc<dyn ChatSender>,
        generator: Arc<dyn TextGenerator>,
        commands: CommandRegistry,
        config: ResponderConfig,
    ) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            chat,
            generator,
            commands,
            config,
            in_flight,
            dropped: AtomicU64::new(0),
        }
    }

    /// Responder with the built-in `roastme` command registered.
    pub fn with_default_commands(
        chat: Arc<dyn ChatSender>,
        generator: Arc<dyn TextGenerator>,
        config: ResponderConfig,
    ) -> Self {
        let mut commands = CommandRegistry::new();
        commands.register(
            RoastCommand::NAME,
            Arc::new(RoastCommand::new(
                generator.clone(),
                config.fallback_reply.clone(),
            )),
        );
        Self::new(chat, generator, commands, config)
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Messages dropped by [`run`](Self::run) because every slot was busy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[instrument(skip(self, message), fields(author = %message.author))]
    pub async fn handle_message(&self, message: &IncomingChatMessage) -> ResponderOutcome {
        if self.config.ignore_self && message.echo {
            return ResponderOutcome::IgnoredEcho;
        }

        let text = message.text.trim();
        if text.is_empty() {
            return ResponderOutcome::IgnoredEmpty;
        }

        let reply = match CommandInvocation::parse(self.config.command_prefix, message) {
            Some(invocation) => {
                let Some(handler) = self.commands.get(&invocation.name) else {
                    debug!(command = %invocation.name, "No handler for command");
                    return ResponderOutcome::UnknownCommand(invocation.name);
                };
                handler.handle(&invocation).await
            }
            None => self.generate_reply(&message.author, text).await,
        };

        match reply {
            Some(reply) => self.post(reply).await,
            None => ResponderOutcome::Skipped,
        }
    }

    async fn generate_reply(&self, author: &str, text: &str) -> Option<String> {
        let prompt = persona_prompt(&self.config.persona, author, text);
        match self.generator.generate(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => Some(reply),
            Ok(_) => {
                debug!("Generation returned an empty reply; skipping");
                None
            }
            Err(e) => {
                warn!(error = %e, "Generation failed");
                self.config.fallback_reply.clone()
            }
        }
    }

    async fn post(&self, reply: String) -> ResponderOutcome {
        match self.chat.send_message(&reply).await {
            Ok(()) => ResponderOutcome::Replied(reply),
            Err(e) => {
                warn!(error = %e, "Failed to post chat reply");
                ResponderOutcome::SendFailed
            }
        }
    }

    /// Handle messages until the incoming stream ends, then wait for the ones in flight.
    ///
    /// Aborting the returned future's task also aborts its message tasks.
    pub async fn run(self: Arc<Self>, mut incoming: mpsc::Receiver<IncomingChatMessage>) {
        info!(
            commands = ?self.commands.names(),
            max_in_flight = self.config.max_in_flight.max(1),
            "Chat responder started"
        );

        let mut tasks = JoinSet::new();
        while let Some(message) = incoming.recv().await {
            while tasks.try_join_next().is_some() {}

            let Ok(permit) = self.in_flight.clone().try_acquire_owned() else {
                let dropped_total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    author = %message.author,
                    dropped_total,
                    "Responder busy; dropping chat message"
                );
                continue;
            };

            let responder = self.clone();
            tasks.spawn(async move {
                let outcome = responder.handle_message(&message).await;
                debug!(outcome = ?outcome, "Chat message handled");
                drop(permit);
            });
        }

        while tasks.join_next().await.is_some() {}
        info!(dropped = self.dropped(), "Chat responder stopped");
    }
}

impl std::fmt::Debug for ChatResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatResponder")
            .field("commands", &self.commands)
            .field("config", &self.config)
            .finish()
    }
}
