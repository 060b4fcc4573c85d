//! Configuration types for the HTTP service and the pipeline behind it

use crate::errors::ConfigError;
use alert_relay_core::{
    bootstrap::{BootstrapConfig, DEFAULT_SUBSCRIPTIONS_URL, DEFAULT_TOKEN_URL},
    chat::ChatConnectionConfig,
    generation::{DEFAULT_GENERATE_URL, DEFAULT_MODEL, DEFAULT_TEMPERATURE},
    queue::DEFAULT_CAPACITY,
    responder::{ResponderConfig, DEFAULT_FALLBACK_REPLY, DEFAULT_MAX_IN_FLIGHT, DEFAULT_PERSONA},
    sinks::automation_bridge::DEFAULT_ACTION,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Optional system-wide configuration file (extension resolved by the loader)
pub const SYSTEM_CONFIG_BASE: &str = "/etc/alert-relay/service";

/// Optional configuration file relative to the working directory
pub const LOCAL_CONFIG_BASE: &str = "config/service";

/// Prefix for `ALERT_RELAY__SECTION__KEY` overrides
pub const ENV_PREFIX: &str = "ALERT_RELAY";

pub const MIN_SECRET_BYTES: usize = 10;
pub const MAX_SECRET_BYTES: usize = 100;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Callback route and shared secret
    pub eventsub: EventSubConfig,

    pub queue: QueueConfig,

    /// Which sinks run and how long a delivery may take
    pub sinks: SinksConfig,

    pub automation: AutomationConfig,

    /// Chat transport, shared by the announcer and the responder
    pub chat: ChatConfig,

    pub generation: GenerationConfig,

    pub responder: ResponderSettings,

    /// Credentials for the `subscribe` command
    pub bootstrap: BootstrapSettings,

    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load from the standard layered sources.
    ///
    /// Later sources override earlier ones: the system file, the local file,
    /// `explicit_path` when given (required to exist), then environment.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_layered(
            &[SYSTEM_CONFIG_BASE, LOCAL_CONFIG_BASE],
            explicit_path,
            ENV_PREFIX,
        )
    }

    /// Load from the given optional base files, explicit file and env prefix.
    pub fn load_layered(
        optional_bases: &[&str],
        explicit_path: Option<&Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        for base in optional_bases {
            builder = builder.add_source(config::File::with_name(base).required(false));
        }
        if let Some(path) = explicit_path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret_len = self.eventsub.secret.len();
        if secret_len == 0 {
            return Err(ConfigError::Missing {
                key: "eventsub.secret".to_string(),
            });
        }
        if !(MIN_SECRET_BYTES..=MAX_SECRET_BYTES).contains(&secret_len) {
            return Err(invalid(format!(
                "eventsub.secret must be {}-{} bytes, got {}",
                MIN_SECRET_BYTES, MAX_SECRET_BYTES, secret_len
            )));
        }
        if !self.eventsub.callback_path.starts_with('/') {
            return Err(invalid("eventsub.callback_path must start with '/'"));
        }

        if self.queue.capacity_per_sink == 0 {
            return Err(invalid("queue.capacity_per_sink must be greater than 0"));
        }

        let timeouts = [
            ("server.shutdown_timeout_seconds", self.server.shutdown_timeout_seconds),
            ("sinks.delivery_timeout_seconds", self.sinks.delivery_timeout_seconds),
            ("automation.connect_timeout_seconds", self.automation.connect_timeout_seconds),
            ("chat.connect_timeout_seconds", self.chat.connect_timeout_seconds),
            ("chat.send_timeout_seconds", self.chat.send_timeout_seconds),
            ("generation.timeout_seconds", self.generation.timeout_seconds),
            ("bootstrap.timeout_seconds", self.bootstrap.timeout_seconds),
        ];
        if let Some((key, _)) = timeouts.iter().find(|(_, seconds)| *seconds == 0) {
            return Err(invalid(format!("{} must be greater than 0", key)));
        }

        check_scheme("automation.url", &self.automation.url, &["ws", "wss"])?;
        check_scheme("chat.server_url", &self.chat.server_url, &["ws", "wss"])?;
        check_scheme("generation.url", &self.generation.url, &["http", "https"])?;

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(invalid("generation.temperature must be between 0.0 and 2.0"));
        }

        self.responder.prefix_char()?;
        if self.responder.max_in_flight == 0 {
            return Err(invalid("responder.max_in_flight must be greater than 0"));
        }

        if self.sinks.enable_chat || self.responder.enabled {
            let required = [
                ("chat.nick", &self.chat.nick),
                ("chat.oauth_token", &self.chat.oauth_token),
                ("chat.channel", &self.chat.channel),
            ];
            if let Some((key, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
                return Err(ConfigError::Missing {
                    key: key.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Core bootstrap settings, sharing the EventSub secret.
    pub fn bootstrap_config(&self) -> BootstrapConfig {
        BootstrapConfig {
            client_id: self.bootstrap.client_id.clone(),
            client_secret: self.bootstrap.client_secret.clone(),
            broadcaster_user_id: self.bootstrap.broadcaster_user_id.clone(),
            callback_url: self.bootstrap.callback_url.clone(),
            eventsub_secret: self.eventsub.secret.clone(),
            token_url: self.bootstrap.token_url.clone(),
            subscriptions_url: self.bootstrap.subscriptions_url.clone(),
            timeout: Duration::from_secs(self.bootstrap.timeout_seconds),
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

fn check_scheme(key: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let parsed = Url::parse(value).map_err(|e| invalid(format!("{} '{}': {}", key, value, e)))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(invalid(format!(
            "{} must use one of {:?}, got '{}'",
            key,
            schemes,
            parsed.scheme()
        )));
    }
    Ok(())
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Bound on draining sink workers at shutdown
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// EventSub callback configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSubConfig {
    /// Shared secret the platform signs callbacks with
    pub secret: String,

    pub callback_path: String,
}

impl Default for EventSubConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            callback_path: "/eventsub/callback".to_string(),
        }
    }
}

impl fmt::Debug for EventSubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubConfig")
            .field("secret", &"<REDACTED>")
            .field("callback_path", &self.callback_path)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Events buffered per sink before the oldest is dropped
    pub capacity_per_sink: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity_per_sink: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinksConfig {
    pub delivery_timeout_seconds: u64,
    pub enable_chat: bool,
    pub enable_automation: bool,
}

impl SinksConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_seconds)
    }
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_seconds: 10,
            enable_chat: true,
            enable_automation: true,
        }
    }
}

/// Automation host WebSocket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub url: String,
    pub action: String,
    pub connect_timeout_seconds: u64,
}

impl AutomationConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080".to_string(),
            action: DEFAULT_ACTION.to_string(),
            connect_timeout_seconds: 5,
        }
    }
}

/// Chat transport settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub server_url: String,

    /// Bot account login
    pub nick: String,

    /// Chat OAuth token, with or without the `oauth:` prefix
    pub oauth_token: String,

    pub channel: String,
    pub connect_timeout_seconds: u64,
    pub send_timeout_seconds: u64,
}

impl ChatConfig {
    pub fn connection_config(&self) -> ChatConnectionConfig {
        let mut connection = ChatConnectionConfig::new(
            self.server_url.clone(),
            self.nick.clone(),
            self.oauth_token.clone(),
            self.channel.clone(),
        );
        connection.connect_timeout = Duration::from_secs(self.connect_timeout_seconds);
        connection.send_timeout = Duration::from_secs(self.send_timeout_seconds);
        connection
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server_url: "wss://irc-ws.chat.twitch.tv:443".to_string(),
            nick: String::new(),
            oauth_token: String::new(),
            channel: String::new(),
            connect_timeout_seconds: 10,
            send_timeout_seconds: 5,
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("server_url", &self.server_url)
            .field("nick", &self.nick)
            .field("oauth_token", &"<REDACTED>")
            .field("channel", &self.channel)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("send_timeout_seconds", &self.send_timeout_seconds)
            .finish()
    }
}

/// Text generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GENERATE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_seconds: 30,
        }
    }
}

/// Chat responder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderSettings {
    pub enabled: bool,

    /// A single non-whitespace character
    pub command_prefix: String,

    pub persona: String,

    /// Posted when generation fails; empty or absent stays silent
    pub fallback_reply: Option<String>,

    pub ignore_self: bool,

    /// Chat messages handled concurrently; extra messages are dropped
    pub max_in_flight: usize,
}

impl ResponderSettings {
    fn prefix_char(&self) -> Result<char, ConfigError> {
        let mut chars = self.command_prefix.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_whitespace() => Ok(c),
            _ => Err(invalid(format!(
                "responder.command_prefix must be one non-whitespace character, got '{}'",
                self.command_prefix
            ))),
        }
    }

    pub fn responder_config(&self) -> Result<ResponderConfig, ConfigError> {
        Ok(ResponderConfig {
            command_prefix: self.prefix_char()?,
            persona: self.persona.clone(),
            fallback_reply: self
                .fallback_reply
                .clone()
                .filter(|reply| !reply.trim().is_empty()),
            ignore_self: self.ignore_self,
            max_in_flight: self.max_in_flight,
        })
    }
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command_prefix: "!".to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            fallback_reply: Some(DEFAULT_FALLBACK_REPLY.to_string()),
            ignore_self: true,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Subscription bootstrap credentials
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub client_id: String,
    pub client_secret: String,
    pub broadcaster_user_id: String,

    /// Public HTTPS URL the platform will call
    pub callback_url: String,

    pub token_url: String,
    pub subscriptions_url: String,
    pub timeout_seconds: u64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            broadcaster_user_id: String::new(),
            callback_url: String::new(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            subscriptions_url: DEFAULT_SUBSCRIPTIONS_URL.to_string(),
            timeout_seconds: 10,
        }
    }
}

impl fmt::Debug for BootstrapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("broadcaster_user_id", &self.broadcaster_user_id)
            .field("callback_url", &self.callback_url)
            .field("token_url", &self.token_url)
            .field("subscriptions_url", &self.subscriptions_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}
