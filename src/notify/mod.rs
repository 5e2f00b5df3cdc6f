//! Admin notifications.
//!
//! Sending is best-effort everywhere: a sink reports success as a `bool` and
//! never fails the quote it belongs to.

mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::TelegramSettings;
use crate::error::QuoteError;

pub use telegram::TelegramSink;

/// Delivers a text message to a destination (a chat id for Telegram).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Returns `true` only if the message was accepted for delivery.
    async fn send(&self, destination: &str, text: &str) -> bool;
}

/// Sink used when no bot is configured. Logs the message and reports
/// "not sent".
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, destination: &str, text: &str) -> bool {
        info!("Notification not sent (no bot configured) to '{}':\n{}", destination, text);
        false
    }
}

/// A sink bound to the administrator's chat.
#[derive(Clone)]
pub struct AdminNotifier {
    sink: Arc<dyn NotificationSink>,
    chat_id: Option<String>,
}

impl AdminNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>, chat_id: Option<String>) -> Self {
        Self { sink, chat_id }
    }

    /// Telegram when a bot token is set, otherwise [`LogSink`].
    pub fn from_settings(settings: &TelegramSettings) -> Result<Self, QuoteError> {
        let sink: Arc<dyn NotificationSink> = match settings.bot_token.as_deref() {
            Some(token) => Arc::new(TelegramSink::new(&settings.api_base, token)?),
            None => Arc::new(LogSink),
        };
        Ok(Self::new(sink, settings.admin_chat_id.clone()))
    }

    pub fn is_configured(&self) -> bool {
        self.chat_id.is_some()
    }

    pub async fn notify(&self, text: &str) -> bool {
        match self.chat_id.as_deref() {
            Some(chat) => self.sink.send(chat, text).await,
            None => {
                debug!("No admin chat configured, notification skipped");
                false
            }
        }
    }
}

impl std::fmt::Debug for AdminNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminNotifier")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}
