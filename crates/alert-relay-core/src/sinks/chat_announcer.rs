//! Posts a human-readable line into chat for each alert.

use super::{DeliveryError, Sink};
use crate::chat::ChatSender;
use crate::{AlertEvent, AlertKind};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
#[path = "chat_announcer_tests.rs"]
mod tests;

/// Render the chat line for an alert.
pub fn format_alert(event: &AlertEvent) -> String {
    let subject = event.subject();
    match event.kind() {
        AlertKind::Follow => format!("📢 {} just followed!", subject),
        AlertKind::Subscribe => format!("🔥 {} just subscribed!", subject),
        AlertKind::GiftSub => format!("🎁 {} dropped a gift sub!", subject),
        AlertKind::Cheer => format!(
            "💸 {} just cheered {} bits!",
            subject,
            event.magnitude().unwrap_or_default()
        ),
    }
}

/// Sink announcing alerts in the chat channel
pub struct ChatAnnouncer {
    chat: Arc<dyn ChatSender>,
}

impl ChatAnnouncer {
    pub const NAME: &'static str = "chat";

    pub fn new(chat: Arc<dyn ChatSender>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl Sink for ChatAnnouncer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), DeliveryError> {
        self.chat.send_message(&format_alert(event)).await?;
        Ok(())
    }
}
