//! Wire shapes of the Yahoo Finance `/options/{symbol}` endpoint.

use serde::Deserialize;

use crate::market::types::RawContract;

#[derive(Debug, Deserialize)]
pub struct OptionsEnvelope {
    #[serde(rename = "optionChain")]
    pub option_chain: OptionChainResult,
}

#[derive(Debug, Deserialize)]
pub struct OptionChainResult {
    #[serde(default)]
    pub result: Vec<ChainData>,
    pub error: Option<ProviderFault>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderFault {
    pub code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainData {
    pub underlying_symbol: Option<String>,
    /// Unix seconds, midnight UTC.
    #[serde(default)]
    pub expiration_dates: Vec<i64>,
    pub quote: Option<UnderlyingQuote>,
    #[serde(default)]
    pub options: Vec<OptionsBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderlyingQuote {
    pub regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsBlock {
    pub expiration_date: Option<i64>,
    #[serde(default)]
    pub calls: Vec<RawContract>,
    #[serde(default)]
    pub puts: Vec<RawContract>,
}
