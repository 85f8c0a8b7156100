//! Operations behind the chat commands: watchlist edits, subscriptions,
//! the recent-signal listing and a settings overview.

use std::fmt;

use thiserror::Error;

use crate::notify::format::render_recent;
use crate::settings::SettingKey;
use crate::store::model::normalize_symbol;
use crate::store::{QuoteStore, SettingsRepository, SubscriberRegistry, TickerRegistry};

/// Listing size of the recent-signals view.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickerChange {
    Added(String),
    AlreadyTracked(String),
    Removed(String),
    NotTracked(String),
}

impl fmt::Display for TickerChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickerChange::Added(s) => write!(f, "✅ {s} added to the watchlist."),
            TickerChange::AlreadyTracked(s) => write!(f, "{s} is already tracked."),
            TickerChange::Removed(s) => write!(f, "❌ {s} removed from the watchlist."),
            TickerChange::NotTracked(s) => write!(f, "{s} is not on the watchlist."),
        }
    }
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub async fn track(registry: &dyn TickerRegistry, raw: &str) -> Result<TickerChange, AdminError> {
    let symbol = valid_symbol(raw)?;

    if registry.add(&symbol).await? {
        tracing::info!(%symbol, "ticker added");
        Ok(TickerChange::Added(symbol))
    } else {
        Ok(TickerChange::AlreadyTracked(symbol))
    }
}

pub async fn untrack(registry: &dyn TickerRegistry, raw: &str) -> Result<TickerChange, AdminError> {
    let symbol = valid_symbol(raw)?;

    if registry.remove(&symbol).await? {
        tracing::info!(%symbol, "ticker removed");
        Ok(TickerChange::Removed(symbol))
    } else {
        Ok(TickerChange::NotTracked(symbol))
    }
}

fn valid_symbol(raw: &str) -> Result<String, AdminError> {
    normalize_symbol(raw).ok_or_else(|| AdminError::InvalidSymbol(raw.to_string()))
}

pub async fn subscribe(
    registry: &dyn SubscriberRegistry,
    recipient_id: i64,
    display_name: Option<&str>,
) -> anyhow::Result<()> {
    registry.subscribe(recipient_id, display_name).await?;
    tracing::info!(recipient = recipient_id, "subscribed");
    Ok(())
}

pub async fn unsubscribe(
    registry: &dyn SubscriberRegistry,
    recipient_id: i64,
) -> anyhow::Result<()> {
    registry.set_subscribed(recipient_id, false).await?;
    tracing::info!(recipient = recipient_id, "unsubscribed");
    Ok(())
}

/// Rendered listing of the latest signals, newest first.
pub async fn recent_signals(store: &dyn QuoteStore, limit: usize) -> anyhow::Result<String> {
    let signals = store.recent_signals(limit).await?;
    Ok(render_recent(&signals))
}

/// Stored value per key, `None` where the default applies.
pub async fn settings_overview(
    repo: &dyn SettingsRepository,
) -> anyhow::Result<Vec<(SettingKey, Option<f64>)>> {
    let stored = repo.all_settings().await?;
    Ok(SettingKey::ALL
        .into_iter()
        .map(|k| {
            let v = stored.iter().find(|(name, _)| name == k.as_str()).map(|(_, v)| *v);
            (k, v)
        })
        .collect())
}
