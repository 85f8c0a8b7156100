use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::notify::channel::{DeliveryOutcome, NotificationChannel, NotifyError};

/// Telegram Bot API `sendMessage` transport.
#[derive(Clone)]
pub struct TelegramChannel {
    http: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize, Default)]
struct ApiReply {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, NotifyError> {
        if token.trim().is_empty() {
            return Err(NotifyError::MissingToken);
        }

        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), token.trim()),
        })
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    #[instrument(skip(self, text), level = "debug")]
    async fn send(&self, recipient_id: i64, text: &str) -> DeliveryOutcome {
        let body = SendMessage {
            chat_id: recipient_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let resp = match self.http.post(&self.endpoint).json(&body).send().await {
            Ok(r) => r,
            // the token is part of the url; keep it out of the reason
            Err(e) => return DeliveryOutcome::Failed(bounded(&e.without_url().to_string())),
        };

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        let outcome = classify_response(status, &raw);

        debug!(status = status.as_u16(), ?outcome, "telegram send finished");
        outcome
    }
}

/// Maps a Bot API reply onto a delivery outcome.
pub fn classify_response(status: StatusCode, body: &str) -> DeliveryOutcome {
    let reply: ApiReply = serde_json::from_str(body).unwrap_or_default();

    if status.is_success() && reply.ok {
        return DeliveryOutcome::Delivered;
    }

    let reason = reply
        .description
        .unwrap_or_else(|| format!("status {}", status.as_u16()));

    let lower = reason.to_ascii_lowercase();
    let unreachable = status == StatusCode::FORBIDDEN
        || lower.contains("bot was blocked")
        || lower.contains("user is deactivated")
        || lower.contains("chat not found");

    if unreachable {
        DeliveryOutcome::Blocked(bounded(&reason))
    } else {
        DeliveryOutcome::Failed(bounded(&reason))
    }
}

/// Keeps reasons short and stable for logs.
fn bounded(s: &str) -> String {
    const MAX: usize = 160;
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("ERR:{}", &s[..idx]),
        None => s.to_string(),
    }
}
