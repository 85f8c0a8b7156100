use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::types::{PutCallRatioRecord, Sentiment};
use crate::quote::{OptionKind, OptionQuote};

#[derive(Default)]
struct Totals {
    call_volume: u64,
    put_volume: u64,
    call_oi: u64,
    put_oi: u64,
}

/// Ratio with the zero-denominator sentinel.
///
/// A ticker with no call activity yields `0.0`, never infinity or an
/// error. The classifier reads that as bullish.
pub fn ratio(puts: u64, calls: u64) -> f64 {
    if calls == 0 {
        0.0
    } else {
        puts as f64 / calls as f64
    }
}

/// Maps a volume ratio to a sentiment. Both bounds are exclusive.
pub fn classify(pcr_volume: f64, bearish_above: f64, bullish_below: f64) -> Sentiment {
    if pcr_volume > bearish_above {
        Sentiment::Bearish
    } else if pcr_volume < bullish_below {
        Sentiment::Bullish
    } else {
        Sentiment::Neutral
    }
}

/// One record per ticker present in `batch`, ordered by ticker.
/// Missing volume / open interest count as zero.
pub fn compute_put_call_ratios(
    batch: &[OptionQuote],
    bearish_above: f64,
    bullish_below: f64,
    computed_at: DateTime<Utc>,
) -> Vec<PutCallRatioRecord> {
    let mut per_ticker: BTreeMap<&str, Totals> = BTreeMap::new();

    for q in batch {
        let t = per_ticker.entry(q.ticker.as_str()).or_default();
        let volume = q.volume.unwrap_or(0);
        let oi = q.open_interest.unwrap_or(0);
        match q.kind {
            OptionKind::Call => {
                t.call_volume = t.call_volume.saturating_add(volume);
                t.call_oi = t.call_oi.saturating_add(oi);
            }
            OptionKind::Put => {
                t.put_volume = t.put_volume.saturating_add(volume);
                t.put_oi = t.put_oi.saturating_add(oi);
            }
        }
    }

    per_ticker
        .into_iter()
        .map(|(ticker, t)| {
            let pcr_volume = ratio(t.put_volume, t.call_volume);
            let pcr_open_interest = ratio(t.put_oi, t.call_oi);
            PutCallRatioRecord {
                ticker: ticker.to_string(),
                call_volume: t.call_volume,
                put_volume: t.put_volume,
                call_open_interest: t.call_oi,
                put_open_interest: t.put_oi,
                pcr_volume,
                pcr_open_interest,
                sentiment: classify(pcr_volume, bearish_above, bullish_below),
                computed_at,
            }
        })
        .collect()
}
