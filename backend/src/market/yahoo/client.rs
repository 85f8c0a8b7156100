use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use crate::market::errors::ProviderError;
use crate::market::types::RawChain;
use crate::market::yahoo::types::{ChainData, OptionsEnvelope};
use crate::market::ChainProvider;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Yahoo Finance options endpoint.
#[derive(Clone)]
pub struct YahooClient {
    http: Client,
    url: String,
}

impl YahooClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_chain_data(
        &self,
        symbol: &str,
        date: Option<i64>,
    ) -> Result<ChainData, ProviderError> {
        let mut req = self.http.get(format!("{}/options/{}", self.url, symbol));
        if let Some(ts) = date {
            req = req.query(&[("date", ts)]);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::UnknownSymbol(symbol.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }

        let body = resp.bytes().await?;
        parse_envelope(symbol, &body)
    }
}

pub(crate) fn parse_envelope(symbol: &str, body: &[u8]) -> Result<ChainData, ProviderError> {
    let envelope: OptionsEnvelope =
        serde_json::from_slice(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    if let Some(fault) = envelope.option_chain.error {
        return Err(ProviderError::InvalidResponse(
            fault
                .description
                .or(fault.code)
                .unwrap_or_else(|| "unspecified provider error".to_string()),
        ));
    }

    envelope
        .option_chain
        .result
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::UnknownSymbol(symbol.to_string()))
}

/// Yahoo keys expirations by midnight UTC of the expiry date.
fn expiration_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

#[async_trait]
impl ChainProvider for YahooClient {
    #[instrument(skip(self), level = "debug")]
    async fn expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>, ProviderError> {
        let data = self.get_chain_data(symbol, None).await?;

        let dates: Vec<NaiveDate> = data
            .expiration_dates
            .iter()
            .filter_map(|&ts| DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()))
            .collect();

        debug!(symbol, count = dates.len(), "yahoo expirations fetched");
        Ok(dates)
    }

    #[instrument(skip(self), fields(expiration = %expiration), level = "debug")]
    async fn chain(&self, symbol: &str, expiration: NaiveDate) -> Result<RawChain, ProviderError> {
        let data = self
            .get_chain_data(symbol, Some(expiration_timestamp(expiration)))
            .await?;

        let underlying_price = data.quote.and_then(|q| q.regular_market_price);
        let block = data
            .options
            .into_iter()
            .next()
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!("no option block for {symbol}"))
            })?;

        debug!(
            symbol,
            calls = block.calls.len(),
            puts = block.puts.len(),
            "yahoo chain fetched"
        );

        Ok(RawChain {
            underlying_price,
            calls: block.calls,
            puts: block.puts,
        })
    }
}
