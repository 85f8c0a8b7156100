//! Persistence seams. The scheduler and dispatcher only ever see these
//! traits; [`super::SqlxRepository`] is the production implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine::{OptionQuote, PutCallRatioRecord, SignalRecord};

use crate::store::model::{SnapshotRecord, Subscriber, TrackedSymbol};

#[async_trait]
pub trait TickerRegistry: Send + Sync {
    /// Tracked symbols in the order they were added.
    async fn list(&self) -> Result<Vec<TrackedSymbol>>;

    /// Returns `false` if the symbol was already tracked.
    async fn add(&self, symbol: &str) -> Result<bool>;

    /// Returns `false` if the symbol was not tracked.
    async fn remove(&self, symbol: &str) -> Result<bool>;
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Replaces the latest view for the quote's contract key.
    async fn upsert_latest_quote(&self, quote: &OptionQuote) -> Result<()>;

    /// Appends an immutable history row; never deduplicates.
    async fn append_snapshot(&self, quote: &OptionQuote, snapshot_time: DateTime<Utc>)
    -> Result<()>;

    /// Latest view + snapshot for a whole batch.
    ///
    /// The default applies the two single-row operations per quote;
    /// implementations backed by a transactional store should override it
    /// so a batch lands atomically.
    async fn save_quotes(
        &self,
        quotes: &[OptionQuote],
        snapshot_time: DateTime<Utc>,
    ) -> Result<()> {
        for q in quotes {
            self.upsert_latest_quote(q).await?;
            self.append_snapshot(q, snapshot_time).await?;
        }
        Ok(())
    }

    async fn append_signal(&self, signal: &SignalRecord) -> Result<()>;

    async fn append_pcr(&self, record: &PutCallRatioRecord) -> Result<()>;

    /// Most recent signals, newest first.
    async fn recent_signals(&self, limit: usize) -> Result<Vec<SignalRecord>>;

    /// Most recent put/call ratio rows, newest first.
    async fn recent_pcr(&self, limit: usize) -> Result<Vec<PutCallRatioRecord>>;

    /// Latest view of every contract of `ticker`.
    async fn latest_quotes(&self, ticker: &str) -> Result<Vec<OptionQuote>>;

    /// Snapshot history of `ticker`, newest first.
    async fn snapshots(&self, ticker: &str, limit: usize) -> Result<Vec<SnapshotRecord>>;
}

#[async_trait]
pub trait SubscriberRegistry: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Subscriber>>;

    /// Idempotent: setting the current value again is a no-op.
    async fn set_subscribed(&self, recipient_id: i64, subscribed: bool) -> Result<()>;

    /// Creates the subscriber or re-enables an existing one.
    async fn subscribe(&self, recipient_id: i64, display_name: Option<&str>) -> Result<()>;
}

/// Raw key → value settings storage. Validation and defaults live in
/// [`crate::settings`].
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<f64>>;

    async fn set_setting(&self, key: &str, value: f64) -> Result<()>;

    async fn all_settings(&self) -> Result<Vec<(String, f64)>>;
}
