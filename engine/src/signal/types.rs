use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::quote::{ContractKey, OptionKind};

/// An anomaly on a single contract, produced only by [`crate::SignalEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub ticker: String,
    pub kind: OptionKind,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    /// Observed volume of the flagged quote (0 when the provider sent none).
    pub volume: u64,
    /// Observed implied volatility of the flagged quote (0.0 when absent).
    pub implied_volatility: f64,
    /// Observed open interest of the flagged quote (0 when absent).
    pub open_interest: u64,
    pub volume_spike: bool,
    pub iv_increase: bool,
    pub detected_at: DateTime<Utc>,
    pub source: String,
}

impl SignalRecord {
    pub fn key(&self) -> ContractKey {
        ContractKey {
            ticker: self.ticker.clone(),
            kind: self.kind,
            strike: self.strike.normalize(),
            expiration: self.expiration,
        }
    }
}

/// Put/call ratio classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "BULLISH",
            Sentiment::Bearish => "BEARISH",
            Sentiment::Neutral => "NEUTRAL",
        }
    }

    /// Neutral readings are stored but never sent to subscribers.
    pub fn is_alertable(&self) -> bool {
        !matches!(self, Sentiment::Neutral)
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BULLISH" => Ok(Sentiment::Bullish),
            "BEARISH" => Ok(Sentiment::Bearish),
            "NEUTRAL" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment: {other}")),
        }
    }
}

/// Aggregated put/call activity for one ticker in one cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PutCallRatioRecord {
    pub ticker: String,
    pub call_volume: u64,
    pub put_volume: u64,
    pub call_open_interest: u64,
    pub put_open_interest: u64,
    pub pcr_volume: f64,
    pub pcr_open_interest: f64,
    pub sentiment: Sentiment,
    pub computed_at: DateTime<Utc>,
}
