use chrono::{DateTime, Utc};
use engine::OptionQuote;

/// An instrument the scheduler polls every tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedSymbol {
    pub symbol: String,
    pub added_at: DateTime<Utc>,
}

/// Historical copy of a quote as it was seen in one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotRecord {
    pub quote: OptionQuote,
    pub snapshot_time: DateTime<Utc>,
}

/// A notification recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscriber {
    /// Chat id on the notification channel.
    pub recipient_id: i64,
    pub display_name: Option<String>,
    pub subscribed: bool,
    pub subscribed_at: DateTime<Utc>,
}

/// Canonical form of a ticker symbol.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let s = raw.trim().to_ascii_uppercase();
    let valid = !s.is_empty()
        && s.len() <= 16
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    valid.then_some(s)
}
