//! # Subscription Bootstrap
//!
//! One-shot registration of the EventSub webhook subscriptions: obtain an app
//! access token with the client-credentials grant, then create one
//! subscription per [`SubscriptionTopic`] pointing at the callback URL.

use crate::AlertKind;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;

pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const DEFAULT_SUBSCRIPTIONS_URL: &str = "https://api.twitch.tv/helix/eventsub/subscriptions";

/// An EventSub (type, version) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTopic {
    pub kind: AlertKind,
    pub version: &'static str,
}

impl SubscriptionTopic {
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Condition object for this topic.
    ///
    /// `channel.follow` v2 also requires a moderator; the broadcaster fills that role.
    pub fn condition(&self, broadcaster_user_id: &str) -> Value {
        match (self.kind, self.version) {
            (AlertKind::Follow, "2") => json!({
                "broadcaster_user_id": broadcaster_user_id,
                "moderator_user_id": broadcaster_user_id,
            }),
            _ => json!({ "broadcaster_user_id": broadcaster_user_id }),
        }
    }
}

impl fmt::Display for SubscriptionTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.event_type(), self.version)
    }
}

/// The four topics the relay announces.
pub fn default_topics() -> Vec<SubscriptionTopic> {
    AlertKind::ALL
        .iter()
        .map(|&kind| SubscriptionTopic {
            kind,
            version: match kind {
                AlertKind::Follow => "2",
                AlertKind::Subscribe | AlertKind::GiftSub | AlertKind::Cheer => "1",
            },
        })
        .collect()
}

/// Bootstrap failures
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Invalid bootstrap configuration: {0}")]
    InvalidConfig(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Token request rejected with status {status}: {body}")]
    TokenRejected { status: u16, body: String },

    #[error("Subscription to {event_type} rejected with status {status}: {body}")]
    SubscriptionRejected {
        event_type: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for BootstrapError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// Settings for subscription registration
#[derive(Clone)]
pub struct BootstrapConfig {
    pub client_id: String,
    pub client_secret: String,
    pub broadcaster_user_id: String,
    /// Public HTTPS URL of the callback route
    pub callback_url: String,
    /// Shared secret the platform signs callbacks with
    pub eventsub_secret: String,
    pub token_url: String,
    pub subscriptions_url: String,
    pub timeout: Duration,
}

impl BootstrapConfig {
    /// Check the fields the platform will otherwise reject.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        let required = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("broadcaster_user_id", &self.broadcaster_user_id),
            ("eventsub_secret", &self.eventsub_secret),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(BootstrapError::InvalidConfig(format!("{} is required", name)));
        }

        let callback = Url::parse(&self.callback_url).map_err(|e| {
            BootstrapError::InvalidConfig(format!("callback_url '{}': {}", self.callback_url, e))
        })?;
        if callback.scheme() != "https" {
            return Err(BootstrapError::InvalidConfig(
                "callback_url must use https".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("broadcaster_user_id", &self.broadcaster_user_id)
            .field("callback_url", &self.callback_url)
            .field("eventsub_secret", &"<REDACTED>")
            .field("token_url", &self.token_url)
            .field("subscriptions_url", &self.subscriptions_url)
            .finish()
    }
}

/// Application access token
#[derive(Clone, Deserialize)]
pub struct AppToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for AppToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppToken")
            .field("access_token", &"<REDACTED>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// A subscription the platform accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSubscription {
    pub id: String,
    pub status: String,
}

/// Per-topic result of [`EventSubBootstrapper::subscribe_all`]
#[derive(Debug)]
pub struct TopicOutcome {
    pub topic: SubscriptionTopic,
    pub result: Result<CreatedSubscription, BootstrapError>,
}

/// Registers EventSub webhook subscriptions
#[derive(Debug, Clone)]
pub struct EventSubBootstrapper {
    config: BootstrapConfig,
    client: reqwest::Client,
}

impl EventSubBootstrapper {
    pub fn new(config: BootstrapConfig) -> Result<Self, BootstrapError> {
        config.validate()?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    #[instrument(skip(self))]
    pub async fn fetch_app_token(&self) -> Result<AppToken, BootstrapError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BootstrapError::TokenRejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: AppToken = response
            .json()
            .await
            .map_err(|e| BootstrapError::UnexpectedResponse(e.to_string()))?;
        info!(expires_in = ?token.expires_in, "Obtained app access token");
        Ok(token)
    }

    /// Request body for creating `topic`.
    pub fn subscription_body(&self, topic: &SubscriptionTopic) -> Value {
        json!({
            "type": topic.event_type(),
            "version": topic.version,
            "condition": topic.condition(&self.config.broadcaster_user_id),
            "transport": {
                "method": "webhook",
                "callback": self.config.callback_url,
                "secret": self.config.eventsub_secret,
            }
        })
    }

    #[instrument(skip(self, token), fields(topic = %topic))]
    pub async fn subscribe(
        &self,
        topic: &SubscriptionTopic,
        token: &AppToken,
    ) -> Result<CreatedSubscription, BootstrapError> {
        let response = self
            .client
            .post(&self.config.subscriptions_url)
            .bearer_auth(&token.access_token)
            .header("Client-Id", &self.config.client_id)
            .json(&self.subscription_body(topic))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BootstrapError::SubscriptionRejected {
                event_type: topic.event_type().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| BootstrapError::UnexpectedResponse(e.to_string()))?;
        let created = parsed
            .pointer("/data/0")
            .ok_or_else(|| BootstrapError::UnexpectedResponse("missing data[0]".to_string()))?;
        let field = |name: &str| {
            created
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(CreatedSubscription {
            id: field("id"),
            status: field("status"),
        })
    }

    /// Fetch a token and register every default topic.
    ///
    /// A rejected topic is reported in its outcome and does not stop the rest;
    /// only a token failure aborts.
    pub async fn subscribe_all(&self) -> Result<Vec<TopicOutcome>, BootstrapError> {
        let token = self.fetch_app_token().await?;
        let mut outcomes = Vec::new();

        for topic in default_topics() {
            let result = self.subscribe(&topic, &token).await;
            match &result {
                Ok(created) => info!(topic = %topic, id = %created.id, status = %created.status, "Subscription created"),
                Err(e) => warn!(topic = %topic, error = %e, "Subscription failed"),
            }
            outcomes.push(TopicOutcome { topic, result });
        }

        Ok(outcomes)
    }
}
