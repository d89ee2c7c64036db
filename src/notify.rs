//! Notification delivery: the `Notifier` contract and the Telegram adapter.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid recipient '{0}'")]
    BadRecipient(String),
    #[error("delivery failed: {0}")]
    Send(String),
}

/// Delivers a message to a requester. Implementations must map every
/// non-success outcome — including ambiguous ones — to `Err`, so callers can
/// treat `Ok` as a confirmed delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, owner: &str, message: &str) -> Result<(), NotifyError>;
}

/// Sends notifications as Telegram direct messages. The opaque `owner`
/// routing string is the recipient's chat id.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, owner: &str, message: &str) -> Result<(), NotifyError> {
        let chat_id: i64 = owner
            .parse()
            .map_err(|_| NotifyError::BadRecipient(owner.to_string()))?;
        self.bot
            .send_message(ChatId(chat_id), message)
            .await
            .map_err(|err| NotifyError::Send(err.to_string()))?;
        Ok(())
    }
}
