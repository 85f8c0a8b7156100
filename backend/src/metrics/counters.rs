use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub ticks: Arc<AtomicU64>,
    pub ticks_empty: Arc<AtomicU64>,

    // per symbol
    pub symbols_processed: Arc<AtomicU64>,
    pub symbol_failures: Arc<AtomicU64>,
    pub fetch_no_data: Arc<AtomicU64>,
    pub persist_failures: Arc<AtomicU64>,

    // signals
    pub signals_emitted: Arc<AtomicU64>,
    pub pcr_alerts: Arc<AtomicU64>,

    // delivery
    pub deliveries: Arc<AtomicU64>,
    pub delivery_failures: Arc<AtomicU64>,
    pub auto_unsubscribed: Arc<AtomicU64>,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
