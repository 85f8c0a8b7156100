use chrono::NaiveDate;
use engine::OptionQuote;
use serde::Deserialize;

/// One contract as the provider reports it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContract {
    pub contract_symbol: Option<String>,
    pub strike: Option<f64>,
    pub last_price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub implied_volatility: Option<f64>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    /// Unix seconds.
    pub expiration: Option<i64>,
    pub in_the_money: Option<bool>,
}

/// Provider chain for a single expiration, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawChain {
    pub underlying_price: Option<f64>,
    pub calls: Vec<RawContract>,
    pub puts: Vec<RawContract>,
}

/// Normalized nearest-expiration chain of one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionChain {
    pub symbol: String,
    pub expiration: NaiveDate,
    pub underlying_price: Option<f64>,
    pub quotes: Vec<OptionQuote>,
}
