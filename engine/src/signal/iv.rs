use super::{Detector, per_ticker_mean};
use crate::quote::OptionQuote;

/// Flags quotes whose implied volatility is more than `threshold` (a
/// fraction) above the mean IV of their ticker within the same batch.
#[derive(Clone, Debug)]
pub struct IvIncreaseDetector {
    threshold: f64,
}

impl IvIncreaseDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for IvIncreaseDetector {
    fn default() -> Self {
        Self::new(0.10)
    }
}

impl Detector for IvIncreaseDetector {
    fn detect<'a>(&self, batch: &'a [OptionQuote]) -> Vec<&'a OptionQuote> {
        let iv = |q: &OptionQuote| q.implied_volatility.filter(|v| v.is_finite());
        let means = per_ticker_mean(batch, iv);
        let factor = 1.0 + self.threshold;

        let flagged: Vec<&OptionQuote> = batch
            .iter()
            .filter(|q| match (iv(q), means.get(q.ticker.as_str())) {
                (Some(v), Some(mean)) => v > factor * mean,
                _ => false,
            })
            .collect();

        tracing::debug!(
            threshold = self.threshold,
            flagged = flagged.len(),
            "iv increases detected"
        );
        flagged
    }
}
