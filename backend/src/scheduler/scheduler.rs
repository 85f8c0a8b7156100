//! Polling loop.
//!
//! Each tick reloads runtime settings, walks the tracked symbols in order
//! and runs fetch → detect → persist → dispatch for each one, then sleeps
//! for whatever is left of the poll interval.
//!
//! Failure model:
//! - A symbol whose chain cannot be fetched is skipped for this tick.
//! - Store writes are best-effort; alerts still go out from memory.
//! - An error or panic inside one symbol never aborts the tick.
//! - Cancellation is observed before each symbol and while sleeping.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{TraceId, child_span, root_span, warn_if_slow};
use engine::{SignalEngine, SignalSet};
use futures::{FutureExt, StreamExt, stream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::market::{ChainFetcher, ChainProvider, OptionChain, RetryPolicy};
use crate::metrics::Counters;
use crate::notify::{Alert, AlertDispatcher, NotificationChannel};
use crate::settings;
use crate::store::Stores;

const SLOW_PERSIST: Duration = Duration::from_secs(2);
const SLOW_DISPATCH: Duration = Duration::from_secs(10);

/// Pipeline stage, for logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Fetching,
    Detecting,
    Persisting,
    Dispatching,
    Sleeping,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Fetching => "FETCHING",
            Phase::Detecting => "DETECTING",
            Phase::Persisting => "PERSISTING",
            Phase::Dispatching => "DISPATCHING",
            Phase::Sleeping => "SLEEPING",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one tick did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub symbols: usize,
    pub processed: usize,
    pub no_data: usize,
    pub failed: usize,
    pub signals: usize,
    pub pcr_alerts: usize,
    pub cancelled: bool,
    /// Interval in force for this tick; the loop sleeps against it.
    pub poll_interval: Duration,
}

struct Prefetched {
    symbol: String,
    fetched: std::thread::Result<Option<OptionChain>>,
    span: tracing::Span,
}

enum SymbolOutcome {
    NoData,
    Processed { signals: usize, pcr_alerts: usize },
}

pub struct Scheduler<P, C> {
    fetcher: ChainFetcher<P>,
    stores: Stores,
    dispatcher: Arc<AlertDispatcher<C>>,

    /// Tag written on every signal row.
    source: String,

    /// Prefetch window. Processing stays sequential and in symbol order.
    fetch_concurrency: usize,

    counters: Counters,
}

impl<P, C> Scheduler<P, C>
where
    P: ChainProvider,
    C: NotificationChannel,
{
    pub fn new(
        fetcher: ChainFetcher<P>,
        stores: Stores,
        dispatcher: Arc<AlertDispatcher<C>>,
        source: impl Into<String>,
        counters: Counters,
    ) -> Self {
        Self {
            fetcher,
            stores,
            dispatcher,
            source: source.into(),
            fetch_concurrency: 1,
            counters,
        }
    }

    pub fn with_fetch_concurrency(mut self, n: usize) -> Self {
        self.fetch_concurrency = n.max(1);
        self
    }

    /// Runs ticks until `cancel` fires. Never returns early on errors.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(fetch_concurrency = self.fetch_concurrency, "scheduler started");

        while !cancel.is_cancelled() {
            let started = Instant::now();
            let report = self.run_tick(&cancel).await;
            if report.cancelled {
                break;
            }

            let pause = report.poll_interval.saturating_sub(started.elapsed());
            debug!(phase = %Phase::Sleeping, sleep_ms = pause.as_millis() as u64, "tick finished");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("scheduler stopped");
    }

    /// One full pass over the tracked symbols.
    pub async fn run_tick(&self, cancel: &CancellationToken) -> TickReport {
        let trace_id = TraceId::default();
        let span = root_span("scheduler_tick", &trace_id);
        self.tick(cancel).instrument(span).await
    }

    async fn tick(&self, cancel: &CancellationToken) -> TickReport {
        Counters::bump(&self.counters.ticks);

        let settings = settings::load(self.stores.settings.as_ref()).await;
        let mut report = TickReport {
            poll_interval: settings.poll_interval,
            ..TickReport::default()
        };

        let symbols: Vec<String> = match self.stores.tickers.list().await {
            Ok(rows) => rows.into_iter().map(|t| t.symbol).collect(),
            Err(e) => {
                error!(error = ?e, "failed to load tracked symbols");
                Vec::new()
            }
        };

        if symbols.is_empty() {
            Counters::bump(&self.counters.ticks_empty);
            warn!("no tracked symbols, nothing to poll");
            return report;
        }
        report.symbols = symbols.len();

        let engine = SignalEngine::new(settings.thresholds.clone(), self.source.clone());
        let retry = settings.retry;

        let pending: Vec<_> = symbols
            .into_iter()
            .map(|symbol| self.prefetch(symbol, retry))
            .collect();
        let mut fetches = pin!(stream::iter(pending).buffered(self.fetch_concurrency));

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    info!("tick cancelled");
                    break;
                }
                next = fetches.next() => next,
            };

            let Some(Prefetched { symbol, fetched, span }) = next else {
                break;
            };

            let chain = match fetched {
                Ok(chain) => chain,
                Err(panic) => {
                    self.symbol_panicked(&mut report, &symbol, panic_message(&*panic), &span);
                    continue;
                }
            };

            let outcome = AssertUnwindSafe(self.process_symbol(&engine, &symbol, chain))
                .catch_unwind()
                .instrument(span.clone())
                .await;

            match outcome {
                Ok(SymbolOutcome::NoData) => report.no_data += 1,
                Ok(SymbolOutcome::Processed { signals, pcr_alerts }) => {
                    report.processed += 1;
                    report.signals += signals;
                    report.pcr_alerts += pcr_alerts;
                }
                Err(panic) => {
                    self.symbol_panicked(&mut report, &symbol, panic_message(&*panic), &span)
                }
            }
        }

        info!(
            symbols = report.symbols,
            processed = report.processed,
            no_data = report.no_data,
            failed = report.failed,
            signals = report.signals,
            pcr_alerts = report.pcr_alerts,
            "tick complete"
        );
        report
    }

    /// Fetches one chain under its own `symbol` span. The span is handed
    /// back so the rest of the pipeline logs under it too.
    async fn prefetch(&self, symbol: String, retry: RetryPolicy) -> Prefetched {
        let span = child_span("symbol");
        span.record("ticker", symbol.as_str());
        span.in_scope(|| debug!(phase = %Phase::Fetching, "fetching chain"));

        let fetched = AssertUnwindSafe(self.fetcher.fetch(&symbol, &retry))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        Prefetched { symbol, fetched, span }
    }

    async fn process_symbol(
        &self,
        engine: &SignalEngine,
        symbol: &str,
        chain: Option<OptionChain>,
    ) -> SymbolOutcome {
        let Some(chain) = chain else {
            Counters::bump(&self.counters.fetch_no_data);
            info!(symbol, "no option data this tick");
            return SymbolOutcome::NoData;
        };

        debug!(phase = %Phase::Detecting, quotes = chain.quotes.len(), "running detectors");
        let now = Utc::now();
        let set = engine.generate(&chain.quotes, now);

        debug!(phase = %Phase::Persisting, "persisting");
        warn_if_slow("persist_symbol", SLOW_PERSIST, self.persist(&chain, &set, now)).await;

        debug!(phase = %Phase::Dispatching, "dispatching");
        let pcr_alerts = warn_if_slow("dispatch_symbol", SLOW_DISPATCH, self.dispatch(&set)).await;

        Counters::bump(&self.counters.symbols_processed);
        Counters::add(&self.counters.signals_emitted, set.anomalies.len() as u64);
        Counters::add(&self.counters.pcr_alerts, pcr_alerts as u64);

        info!(
            symbol,
            quotes = chain.quotes.len(),
            signals = set.anomalies.len(),
            pcr_alerts,
            "symbol processed"
        );

        SymbolOutcome::Processed {
            signals: set.anomalies.len(),
            pcr_alerts,
        }
    }

    /// Each write is attempted independently; failures are logged only.
    async fn persist(&self, chain: &OptionChain, set: &SignalSet, now: chrono::DateTime<Utc>) {
        let quotes = self.stores.quotes.as_ref();

        if let Err(e) = quotes.save_quotes(&chain.quotes, now).await {
            Counters::bump(&self.counters.persist_failures);
            error!(error = ?e, count = chain.quotes.len(), "failed to store quotes");
        }

        for signal in &set.anomalies {
            if let Err(e) = quotes.append_signal(signal).await {
                Counters::bump(&self.counters.persist_failures);
                error!(error = ?e, strike = %signal.strike, "failed to store signal");
            }
        }

        for record in &set.put_call {
            if let Err(e) = quotes.append_pcr(record).await {
                Counters::bump(&self.counters.persist_failures);
                error!(error = ?e, "failed to store put/call ratio");
            }
        }
    }

    /// Returns the number of put/call alerts sent out.
    async fn dispatch(&self, set: &SignalSet) -> usize {
        for signal in &set.anomalies {
            self.dispatcher.dispatch(&Alert::Anomaly(signal)).await;
        }

        let mut pcr_alerts = 0;
        for record in set.pcr_alerts() {
            self.dispatcher.dispatch(&Alert::PutCallRatio(record)).await;
            pcr_alerts += 1;
        }
        pcr_alerts
    }

    fn symbol_panicked(
        &self,
        report: &mut TickReport,
        symbol: &str,
        message: String,
        span: &tracing::Span,
    ) {
        report.failed += 1;
        Counters::bump(&self.counters.symbol_failures);
        span.in_scope(|| error!(symbol, panic = %message, "symbol pipeline panicked, continuing"));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
