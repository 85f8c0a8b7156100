pub mod model;
pub mod repository;
pub mod repository_sqlx;

pub use model::{SnapshotRecord, Subscriber, TrackedSymbol};
pub use repository::{QuoteStore, SettingsRepository, SubscriberRegistry, TickerRegistry};
pub use repository_sqlx::SqlxRepository;

use std::sync::Arc;

/// The store handles the scheduler works against.
#[derive(Clone)]
pub struct Stores {
    pub tickers: Arc<dyn TickerRegistry>,
    pub quotes: Arc<dyn QuoteStore>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Stores {
    /// All three seams backed by one repository.
    pub fn shared<R>(repo: Arc<R>) -> Self
    where
        R: TickerRegistry + QuoteStore + SettingsRepository + 'static,
    {
        Self {
            tickers: repo.clone(),
            quotes: repo.clone(),
            settings: repo,
        }
    }
}
