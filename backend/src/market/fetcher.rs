use std::time::Duration;

use chrono::{DateTime, Utc};
use engine::{OptionKind, OptionQuote};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::{debug, error, instrument, warn};

use crate::market::errors::ProviderError;
use crate::market::types::{OptionChain, RawChain, RawContract};
use crate::market::ChainProvider;

/// Bounded fixed-delay retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Fetches the nearest-expiration chain of a symbol. Never fails: every
/// problem ends as `None` after being logged.
pub struct ChainFetcher<P> {
    provider: P,
}

impl<P: ChainProvider> ChainFetcher<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    #[instrument(skip(self, policy), fields(attempts = policy.attempts), level = "debug")]
    pub async fn fetch(&self, symbol: &str, policy: &RetryPolicy) -> Option<OptionChain> {
        let max_attempts = policy.attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.try_fetch(symbol).await {
                Ok(chain) => {
                    debug!(
                        symbol,
                        attempt,
                        quotes = chain.quotes.len(),
                        expiration = %chain.expiration,
                        "chain fetched"
                    );
                    return Some(chain);
                }
                Err(e) if !e.is_transient() => {
                    warn!(symbol, error = %e, "no option data");
                    return None;
                }
                Err(e) => {
                    warn!(symbol, attempt, max_attempts, error = %e, "chain fetch attempt failed");

                    if attempt >= max_attempts {
                        error!(symbol, attempts = attempt, "chain fetch exhausted retries");
                        return None;
                    }
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    async fn try_fetch(&self, symbol: &str) -> Result<OptionChain, ProviderError> {
        let nearest = self
            .provider
            .expirations(symbol)
            .await?
            .into_iter()
            .min()
            .ok_or(ProviderError::NoExpirations)?;

        let raw = self.provider.chain(symbol, nearest).await?;
        Ok(normalize_chain(symbol, raw, nearest, Utc::now()))
    }
}

/// Maps provider contracts onto [`OptionQuote`]s.
///
/// Contracts without a usable strike are dropped. A contract whose own
/// expiration is missing or out of range takes the chain's expiration.
pub fn normalize_chain(
    symbol: &str,
    raw: RawChain,
    expiration: chrono::NaiveDate,
    observed_at: DateTime<Utc>,
) -> OptionChain {
    let underlying_price = raw.underlying_price;
    let total = raw.calls.len() + raw.puts.len();

    let quotes: Vec<OptionQuote> = raw
        .calls
        .iter()
        .map(|c| (OptionKind::Call, c))
        .chain(raw.puts.iter().map(|p| (OptionKind::Put, p)))
        .filter_map(|(kind, c)| {
            normalize_contract(symbol, kind, c, expiration, underlying_price, observed_at)
        })
        .collect();

    if quotes.len() < total {
        debug!(symbol, dropped = total - quotes.len(), "contracts without strike dropped");
    }

    OptionChain {
        symbol: symbol.to_string(),
        expiration,
        underlying_price,
        quotes,
    }
}

fn normalize_contract(
    symbol: &str,
    kind: OptionKind,
    c: &RawContract,
    chain_expiration: chrono::NaiveDate,
    underlying_price: Option<f64>,
    observed_at: DateTime<Utc>,
) -> Option<OptionQuote> {
    let strike = c.strike.filter(|s| s.is_finite()).and_then(Decimal::from_f64)?;

    let expiration = c
        .expiration
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.date_naive())
        .unwrap_or(chain_expiration);

    Some(OptionQuote {
        ticker: symbol.to_string(),
        kind,
        strike: strike.normalize(),
        expiration,
        last_price: c.last_price,
        bid: c.bid,
        ask: c.ask,
        implied_volatility: c.implied_volatility,
        volume: c.volume.and_then(|v| u64::try_from(v).ok()),
        open_interest: c.open_interest.and_then(|v| u64::try_from(v).ok()),
        underlying_price,
        observed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use reqwest::StatusCode;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_test::traced_test;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    enum Behaviour {
        Healthy,
        AlwaysDown,
        NoExpirations,
        DownThenUp(u32),
        Rejected(StatusCode),
    }

    struct MockProvider {
        behaviour: Behaviour,
        calls: AtomicU32,
    }

    impl MockProvider {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ChainProvider for MockProvider {
        async fn expirations(&self, _symbol: &str) -> Result<Vec<NaiveDate>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.behaviour {
                Behaviour::AlwaysDown => Err(ProviderError::Status(StatusCode::BAD_GATEWAY)),
                Behaviour::Rejected(status) => Err(ProviderError::Status(status)),
                Behaviour::DownThenUp(fails) if n <= fails => {
                    Err(ProviderError::Status(StatusCode::SERVICE_UNAVAILABLE))
                }
                Behaviour::NoExpirations => Ok(vec![]),
                _ => Ok(vec![day(2024, 1, 12), day(2024, 1, 5), day(2024, 2, 16)]),
            }
        }

        async fn chain(
            &self,
            _symbol: &str,
            expiration: NaiveDate,
        ) -> Result<RawChain, ProviderError> {
            assert_eq!(expiration, day(2024, 1, 5), "only the nearest expiration is requested");
            Ok(RawChain {
                underlying_price: Some(470.5),
                calls: vec![RawContract {
                    strike: Some(470.0),
                    volume: Some(100),
                    implied_volatility: Some(0.2),
                    expiration: Some(1704412800),
                    ..Default::default()
                }],
                puts: vec![],
            })
        }
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn gives_up_after_configured_attempts() {
        let fetcher = ChainFetcher::new(MockProvider::new(Behaviour::AlwaysDown));

        let out = fetcher.fetch("SPY", &RetryPolicy::default()).await;

        assert!(out.is_none());
        assert_eq!(fetcher.provider.calls.load(Ordering::SeqCst), 3);
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("chain fetch attempt failed")).count() {
                3 => Ok(()),
                n => Err(format!("expected 3 failed attempts, saw {n}")),
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_configured_delay_between_attempts() {
        let fetcher = ChainFetcher::new(MockProvider::new(Behaviour::AlwaysDown));
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(5),
        };

        let started = tokio::time::Instant::now();
        fetcher.fetch("SPY", &policy).await;

        // two sleeps between three attempts
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_within_budget() {
        let fetcher = ChainFetcher::new(MockProvider::new(Behaviour::DownThenUp(2)));

        let chain = fetcher.fetch("SPY", &RetryPolicy::default()).await.unwrap();

        assert_eq!(fetcher.provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(chain.expiration, day(2024, 1, 5));
        assert_eq!(chain.quotes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn client_error_status_is_retried() {
        let provider = MockProvider::new(Behaviour::Rejected(StatusCode::UNAUTHORIZED));
        let fetcher = ChainFetcher::new(provider);

        assert!(fetcher.fetch("SPY", &RetryPolicy::default()).await.is_none());
        assert_eq!(fetcher.provider.calls.load(Ordering::SeqCst), 3);
        assert!(logs_contain("chain fetch exhausted retries"));
    }

    #[tokio::test]
    async fn data_shape_failure_is_not_retried() {
        let fetcher = ChainFetcher::new(MockProvider::new(Behaviour::NoExpirations));

        assert!(fetcher.fetch("SPY", &RetryPolicy::default()).await.is_none());
        assert_eq!(fetcher.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn picks_nearest_expiration() {
        let fetcher = ChainFetcher::new(MockProvider::new(Behaviour::Healthy));

        let chain = fetcher.fetch("SPY", &RetryPolicy::default()).await.unwrap();

        assert_eq!(chain.expiration, day(2024, 1, 5));
        assert_eq!(chain.underlying_price, Some(470.5));
        assert_eq!(chain.quotes[0].strike, dec!(470));
    }

    #[test]
    fn normalization_maps_provider_fields() {
        let observed_at = Utc::now();
        let raw = RawChain {
            underlying_price: Some(101.0),
            calls: vec![
                RawContract {
                    contract_symbol: Some("AAPL240105C00100000".into()),
                    strike: Some(100.0),
                    last_price: Some(1.5),
                    implied_volatility: Some(0.3),
                    volume: Some(42),
                    open_interest: Some(-1),
                    expiration: Some(1704412800),
                    ..Default::default()
                },
                RawContract {
                    strike: None,
                    ..Default::default()
                },
            ],
            puts: vec![RawContract {
                strike: Some(97.5),
                expiration: None,
                ..Default::default()
            }],
        };

        let chain = normalize_chain("AAPL", raw, day(2024, 1, 5), observed_at);

        assert_eq!(chain.quotes.len(), 2);
        let call = &chain.quotes[0];
        assert_eq!(call.kind, OptionKind::Call);
        assert_eq!(call.strike, dec!(100));
        assert_eq!(call.last_price, Some(1.5));
        assert_eq!(call.volume, Some(42));
        assert_eq!(call.open_interest, None);
        assert_eq!(call.underlying_price, Some(101.0));
        assert_eq!(call.observed_at, observed_at);

        let put = &chain.quotes[1];
        assert_eq!(put.kind, OptionKind::Put);
        assert_eq!(put.strike, dec!(97.5));
        assert_eq!(put.expiration, day(2024, 1, 5));
    }
}
