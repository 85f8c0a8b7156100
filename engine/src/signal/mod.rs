pub mod expiration;
pub mod iv;
pub mod pcr;
pub mod types;
pub mod volume;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::quote::{ContractKey, OptionQuote};
pub use expiration::{ExpirationWindow, Expiring, filter_by_expiration};
pub use iv::IvIncreaseDetector;
pub use pcr::{classify, compute_put_call_ratios};
pub use types::{PutCallRatioRecord, Sentiment, SignalRecord};
pub use volume::VolumeSpikeDetector;

/// A rule evaluated against a whole batch at once.
pub trait Detector: Send + Sync {
    /// Returns the quotes of `batch` the rule flags, in batch order.
    fn detect<'a>(&self, batch: &'a [OptionQuote]) -> Vec<&'a OptionQuote>;
}

/// Mean of `metric` per ticker, over the quotes that report it.
/// Tickers with no reported value are absent from the map.
pub(crate) fn per_ticker_mean<'a, F>(
    batch: &'a [OptionQuote],
    metric: F,
) -> HashMap<&'a str, f64>
where
    F: Fn(&OptionQuote) -> Option<f64>,
{
    let mut acc: HashMap<&str, (f64, u32)> = HashMap::new();
    for q in batch {
        if let Some(v) = metric(q) {
            let e = acc.entry(q.ticker.as_str()).or_insert((0.0, 0));
            e.0 += v;
            e.1 += 1;
        }
    }
    acc.into_iter()
        .map(|(ticker, (sum, n))| (ticker, sum / f64::from(n)))
        .collect()
}

/// Detection thresholds for one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalThresholds {
    /// Volume multiple over the batch mean that counts as a spike.
    pub volume_spike_k: f64,
    /// Relative IV excess over the batch mean, as a fraction (0.10 = 10%).
    pub iv_threshold: f64,
    /// Maximum days to expiration for an anomaly to be reported.
    pub expiration_days: u32,
    /// `pcr_volume` strictly above this is bearish.
    pub bearish_pcr: f64,
    /// `pcr_volume` strictly below this is bullish.
    pub bullish_pcr: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            volume_spike_k: 3.0,
            iv_threshold: 0.10,
            expiration_days: 7,
            bearish_pcr: 1.5,
            bullish_pcr: 0.5,
        }
    }
}

/// Output of one [`SignalEngine::generate`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalSet {
    pub anomalies: Vec<SignalRecord>,
    /// Every ticker's ratio row, neutral ones included.
    pub put_call: Vec<PutCallRatioRecord>,
}

impl SignalSet {
    /// Ratio rows worth telling subscribers about.
    pub fn pcr_alerts(&self) -> impl Iterator<Item = &PutCallRatioRecord> {
        self.put_call.iter().filter(|r| r.sentiment.is_alertable())
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty() && self.put_call.is_empty()
    }
}

/// A quote that at least one detector flagged.
#[derive(Clone, Debug)]
pub struct Flagged<'a> {
    pub quote: &'a OptionQuote,
    pub volume_spike: bool,
    pub iv_increase: bool,
}

impl Expiring for Flagged<'_> {
    fn expiration(&self) -> NaiveDate {
        self.quote.expiration
    }
}

/// Union of both detectors' output, deduplicated by contract key, in
/// first-seen order (volume spikes first).
pub fn union_flags<'a>(volume: &[&'a OptionQuote], iv: &[&'a OptionQuote]) -> Vec<Flagged<'a>> {
    let mut out: Vec<Flagged<'a>> = Vec::with_capacity(volume.len() + iv.len());
    let mut seen: HashMap<ContractKey, usize> = HashMap::new();

    for (q, is_volume) in volume
        .iter()
        .map(|q| (*q, true))
        .chain(iv.iter().map(|q| (*q, false)))
    {
        let idx = *seen.entry(q.key()).or_insert_with(|| {
            out.push(Flagged {
                quote: q,
                volume_spike: false,
                iv_increase: false,
            });
            out.len() - 1
        });
        if is_volume {
            out[idx].volume_spike = true;
        } else {
            out[idx].iv_increase = true;
        }
    }
    out
}

/// Runs every rule over one batch.
pub struct SignalEngine {
    thresholds: SignalThresholds,
    volume: VolumeSpikeDetector,
    iv: IvIncreaseDetector,
    source: String,
}

impl SignalEngine {
    pub fn new(thresholds: SignalThresholds, source: impl Into<String>) -> Self {
        Self {
            volume: VolumeSpikeDetector::new(thresholds.volume_spike_k),
            iv: IvIncreaseDetector::new(thresholds.iv_threshold),
            thresholds,
            source: source.into(),
        }
    }

    /// Anomaly signals for `batch`.
    ///
    /// Quotes are flagged by either detector, deduplicated, and only then
    /// restricted to the expiration window. Filtering before the union
    /// would change which contracts survive deduplication.
    pub fn detect_anomalies(
        &self,
        batch: &[OptionQuote],
        today: NaiveDate,
        detected_at: DateTime<Utc>,
    ) -> Vec<SignalRecord> {
        if batch.is_empty() {
            tracing::debug!("no data to generate signals");
            return Vec::new();
        }

        let volume = self.volume.detect(batch);
        let iv = self.iv.detect(batch);
        let combined = union_flags(&volume, &iv);

        let in_window = filter_by_expiration(combined, self.thresholds.expiration_days, today);

        let signals: Vec<SignalRecord> = in_window
            .iter()
            .map(|f| SignalRecord {
                ticker: f.quote.ticker.clone(),
                kind: f.quote.kind,
                strike: f.quote.strike,
                expiration: f.quote.expiration,
                volume: f.quote.volume.unwrap_or(0),
                implied_volatility: f.quote.implied_volatility.unwrap_or(0.0),
                open_interest: f.quote.open_interest.unwrap_or(0),
                volume_spike: f.volume_spike,
                iv_increase: f.iv_increase,
                detected_at,
                source: self.source.clone(),
            })
            .collect();

        tracing::info!(
            volume_spikes = volume.len(),
            iv_increases = iv.len(),
            signals = signals.len(),
            "signals generated"
        );
        signals
    }

    /// Both result sets for one batch. `now` supplies the detection
    /// timestamp and, through its UTC date, the expiration window anchor.
    pub fn generate(&self, batch: &[OptionQuote], now: DateTime<Utc>) -> SignalSet {
        SignalSet {
            anomalies: self.detect_anomalies(batch, now.date_naive(), now),
            put_call: compute_put_call_ratios(
                batch,
                self.thresholds.bearish_pcr,
                self.thresholds.bullish_pcr,
                now,
            ),
        }
    }
}
