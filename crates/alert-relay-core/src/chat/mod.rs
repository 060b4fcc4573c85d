//! # Chat Module
//!
//! The chat channel seen from the relay: an outbound [`ChatSender`] shared by
//! the announcer and the responder, and [`IncomingChatMessage`]s produced by
//! the transport. [`irc`] provides the Twitch IRC-over-WebSocket transport.

pub mod irc;

pub use irc::{ChatConnectionConfig, TwitchChatClient};

use async_trait::async_trait;

/// Chat transport failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Chat message is empty")]
    EmptyMessage,

    #[error("Chat connection closed")]
    Closed,

    #[error("Chat send timed out")]
    Timeout,

    #[error("Chat connection failed: {0}")]
    Connection(String),
}

/// A message a viewer posted in the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingChatMessage {
    /// Channel name without the leading `#`
    pub channel: String,
    /// Display name of the author
    pub author: String,
    pub text: String,
    /// True when the author is the bot account itself
    pub echo: bool,
}

impl IncomingChatMessage {
    pub fn new(channel: impl Into<String>, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            author: author.into(),
            text: text.into(),
            echo: false,
        }
    }

    pub fn from_self(mut self) -> Self {
        self.echo = true;
        self
    }
}

/// Posts text into the configured channel.
///
/// Implementations serialize writes so concurrent callers never interleave.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<(), ChatError>;
}
