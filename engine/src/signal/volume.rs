use super::{Detector, per_ticker_mean};
use crate::quote::OptionQuote;

/// Flags quotes whose volume exceeds `k` times the mean volume of their
/// ticker within the same batch.
#[derive(Clone, Debug)]
pub struct VolumeSpikeDetector {
    k: f64,
}

impl VolumeSpikeDetector {
    pub fn new(k: f64) -> Self {
        Self { k }
    }
}

impl Default for VolumeSpikeDetector {
    fn default() -> Self {
        Self::new(3.0)
    }
}

impl Detector for VolumeSpikeDetector {
    fn detect<'a>(&self, batch: &'a [OptionQuote]) -> Vec<&'a OptionQuote> {
        let volume = |q: &OptionQuote| q.volume.map(|v| v as f64);
        let means = per_ticker_mean(batch, volume);

        let spikes: Vec<&OptionQuote> = batch
            .iter()
            .filter(|q| match (volume(q), means.get(q.ticker.as_str())) {
                (Some(v), Some(mean)) => v > self.k * mean,
                _ => false,
            })
            .collect();

        tracing::debug!(k = self.k, flagged = spikes.len(), "volume spikes detected");
        spikes
    }
}
