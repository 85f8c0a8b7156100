//! Canonical option quote shape shared by the fetcher, the detectors and
//! the stores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Contract side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKind::Call => "CALL",
            OptionKind::Put => "PUT",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" | "C" => Ok(OptionKind::Call),
            "PUT" | "P" => Ok(OptionKind::Put),
            other => Err(format!("unknown option kind: {other}")),
        }
    }
}

/// Identity of a contract: (ticker, kind, strike, expiration).
///
/// Used for deduplication in the detectors and as the primary key of the
/// latest-quote view.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractKey {
    pub ticker: String,
    pub kind: OptionKind,
    pub strike: Decimal,
    pub expiration: NaiveDate,
}

/// One contract observation from one fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub ticker: String,
    pub kind: OptionKind,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub last_price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    /// Fraction, e.g. `0.25` for 25%.
    pub implied_volatility: Option<f64>,
    pub volume: Option<u64>,
    pub open_interest: Option<u64>,
    pub underlying_price: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl OptionQuote {
    pub fn key(&self) -> ContractKey {
        ContractKey {
            ticker: self.ticker.clone(),
            kind: self.kind,
            strike: self.strike.normalize(),
            expiration: self.expiration,
        }
    }
}

/// Parses an expiration as carried by providers and stores.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and `YYYY-MM-DD HH:MM:SS`.
/// Anything else is `None`; callers drop such records.
pub fn parse_expiration(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}
