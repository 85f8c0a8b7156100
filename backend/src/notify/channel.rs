use async_trait::async_trait;
use thiserror::Error;

/// Result of one delivery attempt to one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The recipient can no longer be reached (blocked the bot, account
    /// gone, chat missing). Never retried.
    Blocked(String),
    Failed(String),
}

/// Outbound message transport.
///
/// `send` reports per-recipient outcomes instead of erroring so a single bad
/// recipient cannot abort a fan-out.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, recipient_id: i64, text: &str) -> DeliveryOutcome;
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bot token is empty")]
    MissingToken,
}
