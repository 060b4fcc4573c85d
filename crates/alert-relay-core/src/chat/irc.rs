//! Twitch chat over IRC-on-WebSocket.
//!
//! One connection task owns the socket. Outbound lines from every
//! [`TwitchChatClient`] handle go through a bounded channel to that task, which
//! is the only writer, so messages never interleave. The task answers `PING`,
//! turns `PRIVMSG` lines into [`IncomingChatMessage`]s and reconnects with
//! backoff when the socket drops.
//!
//! Incoming messages go into a bounded buffer; when the consumer falls behind,
//! new messages are dropped and counted rather than queued.

use super::{ChatError, ChatSender, IncomingChatMessage};
use crate::retry::{Backoff, RetryPolicy};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "irc_tests.rs"]
mod tests;

/// Twitch rejects longer chat lines.
pub const MAX_MESSAGE_CHARS: usize = 500;

const OUTGOING_BUFFER: usize = 64;

/// Incoming chat messages buffered ahead of the consumer
pub const INCOMING_BUFFER: usize = 32;

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for the chat transport
#[derive(Clone)]
pub struct ChatConnectionConfig {
    pub server_url: String,
    pub nick: String,
    pub oauth_token: String,
    pub channel: String,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub reconnect: RetryPolicy,
}

impl ChatConnectionConfig {
    pub fn new(
        server_url: impl Into<String>,
        nick: impl Into<String>,
        oauth_token: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            nick: nick.into(),
            oauth_token: oauth_token.into(),
            channel: channel.into(),
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            reconnect: RetryPolicy::default(),
        }
    }

    /// Channel name, lowercase and without `#`.
    pub fn channel_name(&self) -> String {
        self.channel.trim().trim_start_matches('#').to_lowercase()
    }

    /// Lines sent right after the socket opens.
    pub fn login_lines(&self) -> Vec<String> {
        let token = self.oauth_token.trim();
        let pass = if token.starts_with("oauth:") {
            token.to_string()
        } else {
            format!("oauth:{}", token)
        };

        vec![
            "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
            format!("PASS {}", pass),
            format!("NICK {}", self.nick.trim().to_lowercase()),
            format!("JOIN #{}", self.channel_name()),
        ]
    }
}

impl fmt::Debug for ChatConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConnectionConfig")
            .field("server_url", &self.server_url)
            .field("nick", &self.nick)
            .field("oauth_token", &"<REDACTED>")
            .field("channel", &self.channel)
            .field("connect_timeout", &self.connect_timeout)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

// ============================================================================
// IRC line parsing
// ============================================================================

/// One IRC line, borrowed from the frame it came in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine<'a> {
    /// Raw IRCv3 tag string without the leading `@`
    pub tags: Option<&'a str>,
    /// Source prefix without the leading `:`
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
    pub trailing: Option<&'a str>,
}

impl<'a> IrcLine<'a> {
    /// Parse a single line. Returns `None` for blank or truncated lines.
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut rest = line.trim_end_matches(|c: char| c == '\r' || c == '\n');

        let mut tags = None;
        if let Some(tagged) = rest.strip_prefix('@') {
            let (raw, remainder) = tagged.split_once(' ')?;
            tags = Some(raw);
            rest = remainder.trim_start();
        }

        let mut prefix = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (raw, remainder) = prefixed.split_once(' ')?;
            prefix = Some(raw);
            rest = remainder.trim_start();
        }

        let (command, arguments) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return None;
        }

        let (middle, trailing) = match arguments.strip_prefix(':') {
            Some(trailing) => ("", Some(trailing)),
            None => match arguments.split_once(" :") {
                Some((middle, trailing)) => (middle, Some(trailing)),
                None => (arguments, None),
            },
        };

        Some(Self {
            tags,
            prefix,
            command,
            params: middle.split_whitespace().collect(),
            trailing,
        })
    }

    /// Value of a tag, if present and non-empty.
    pub fn tag(&self, key: &str) -> Option<&'a str> {
        self.tags?
            .split(';')
            .find_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                (name == key).then_some(value)
            })
            .filter(|value| !value.is_empty())
    }

    /// Login name from a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&'a str> {
        self.prefix
            .map(|prefix| prefix.split_once('!').map_or(prefix, |(nick, _)| nick))
    }

    pub fn is_command(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }

    /// Convert a `PRIVMSG` into an incoming chat message.
    ///
    /// `own_nick` marks messages written by the bot account as echoes.
    pub fn to_chat_message(&self, own_nick: &str) -> Option<IncomingChatMessage> {
        if !self.is_command("PRIVMSG") {
            return None;
        }

        let channel = self.params.first()?.trim_start_matches('#');
        let login = self.nick()?;
        let author = self.tag("display-name").unwrap_or(login);
        let text = self.trailing?;

        Some(IncomingChatMessage {
            channel: channel.to_string(),
            author: author.to_string(),
            text: text.to_string(),
            echo: login.eq_ignore_ascii_case(own_nick),
        })
    }
}

/// Build a `PRIVMSG` line for `channel`.
///
/// Line breaks become spaces and text longer than [`MAX_MESSAGE_CHARS`] is cut.
pub fn format_privmsg(channel: &str, text: &str) -> Result<String, ChatError> {
    let single_line: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    let trimmed = single_line.trim();
    if trimmed.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let body: String = trimmed.chars().take(MAX_MESSAGE_CHARS).collect();
    Ok(format!("PRIVMSG #{} :{}", channel.trim_start_matches('#'), body))
}

// ============================================================================
// Client
// ============================================================================

/// Cloneable handle for posting into the joined channel
#[derive(Debug, Clone)]
pub struct TwitchChatClient {
    outgoing: mpsc::Sender<String>,
    channel: String,
    send_timeout: Duration,
    dropped_incoming: Arc<AtomicU64>,
}

impl TwitchChatClient {
    /// Start the connection task.
    ///
    /// Returns the sending handle, the stream of incoming messages and the task
    /// handle. The task stops once every handle has been dropped, or when the
    /// reconnect policy is exhausted.
    pub fn spawn(
        config: ChatConnectionConfig,
    ) -> (
        Self,
        mpsc::Receiver<IncomingChatMessage>,
        JoinHandle<()>,
    ) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_BUFFER);
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_BUFFER);
        let dropped_incoming = Arc::new(AtomicU64::new(0));

        let client = Self {
            outgoing: outgoing_tx,
            channel: config.channel_name(),
            send_timeout: config.send_timeout,
            dropped_incoming: dropped_incoming.clone(),
        };
        let incoming = IncomingSink {
            sender: incoming_tx,
            dropped: dropped_incoming,
        };
        let handle = tokio::spawn(run_connection(config, outgoing_rx, incoming));

        (client, incoming_rx, handle)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Incoming messages discarded because the buffer was full.
    pub fn dropped_incoming(&self) -> u64 {
        self.dropped_incoming.load(Ordering::Relaxed)
    }
}

/// Producer side of the incoming buffer
struct IncomingSink {
    sender: mpsc::Sender<IncomingChatMessage>,
    dropped: Arc<AtomicU64>,
}

impl IncomingSink {
    fn offer(&self, message: IncomingChatMessage) {
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                let dropped_total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    author = %message.author,
                    dropped_total,
                    "Incoming chat buffer full; dropping message"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("No listener for incoming chat messages");
            }
        }
    }
}

#[async_trait]
impl ChatSender for TwitchChatClient {
    async fn send_message(&self, text: &str) -> Result<(), ChatError> {
        let line = format_privmsg(&self.channel, text)?;
        match tokio::time::timeout(self.send_timeout, self.outgoing.send(line)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ChatError::Closed),
            Err(_) => Err(ChatError::Timeout),
        }
    }
}

enum SessionEnd {
    Shutdown,
    Disconnected(String),
}

async fn run_connection(
    config: ChatConnectionConfig,
    mut outgoing: mpsc::Receiver<String>,
    incoming: IncomingSink,
) {
    let mut backoff = Backoff::new(config.reconnect.clone());

    loop {
        match run_session(&config, &mut outgoing, &incoming, &mut backoff).await {
            SessionEnd::Shutdown => {
                info!(channel = %config.channel_name(), "Chat client stopped");
                return;
            }
            SessionEnd::Disconnected(reason) => {
                warn!(channel = %config.channel_name(), reason = %reason, "Chat connection lost");
            }
        }

        let Some(delay) = backoff.next_delay() else {
            error!(
                attempts = backoff.attempt(),
                "Chat reconnect attempts exhausted; giving up"
            );
            return;
        };
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = backoff.attempt(),
            "Reconnecting to chat"
        );
        tokio::time::sleep(delay).await;
    }
}

async fn run_session(
    config: &ChatConnectionConfig,
    outgoing: &mut mpsc::Receiver<String>,
    incoming: &IncomingSink,
    backoff: &mut Backoff,
) -> SessionEnd {
    let connect = tokio::time::timeout(
        config.connect_timeout,
        connect_async(config.server_url.as_str()),
    )
    .await;
    let socket = match connect {
        Ok(Ok((socket, _response))) => socket,
        Ok(Err(e)) => return SessionEnd::Disconnected(e.to_string()),
        Err(_) => return SessionEnd::Disconnected("connect timed out".to_string()),
    };

    let (mut writer, mut reader) = socket.split();
    for line in config.login_lines() {
        if let Err(e) = writer.send(Message::Text(line.into())).await {
            return SessionEnd::Disconnected(e.to_string());
        }
    }

    backoff.reset();
    info!(channel = %config.channel_name(), nick = %config.nick, "Connected to chat");
    let own_nick = config.nick.trim().to_lowercase();

    loop {
        tokio::select! {
            frame = reader.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return SessionEnd::Disconnected("closed by server".to_string());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return SessionEnd::Disconnected(e.to_string()),
                };

                for raw in text.as_str().lines() {
                    let Some(line) = IrcLine::parse(raw) else {
                        continue;
                    };

                    if line.is_command("PING") {
                        let pong = format!("PONG :{}", line.trailing.unwrap_or("tmi.twitch.tv"));
                        if let Err(e) = writer.send(Message::Text(pong.into())).await {
                            return SessionEnd::Disconnected(e.to_string());
                        }
                        continue;
                    }

                    if line.is_command("RECONNECT") {
                        return SessionEnd::Disconnected("server requested reconnect".to_string());
                    }

                    if line.is_command("NOTICE") {
                        warn!(notice = line.trailing.unwrap_or_default(), "Chat server notice");
                        continue;
                    }

                    if let Some(message) = line.to_chat_message(&own_nick) {
                        incoming.offer(message);
                    }
                }
            }
            line = outgoing.recv() => {
                let Some(line) = line else {
                    if let Err(e) = writer.send(Message::Close(None)).await {
                        debug!(error = %e, "Chat close frame not sent");
                    }
                    return SessionEnd::Shutdown;
                };

                if let Err(e) = writer.send(Message::Text(line.into())).await {
                    return SessionEnd::Disconnected(e.to_string());
                }
            }
        }
    }
}
