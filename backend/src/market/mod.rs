pub mod errors;
pub mod fetcher;
pub mod types;
pub mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;

pub use errors::ProviderError;
pub use fetcher::{ChainFetcher, RetryPolicy, normalize_chain};
pub use types::{OptionChain, RawChain, RawContract};
pub use yahoo::YahooClient;

/// Options-chain source used by [`ChainFetcher`].
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Listed expiration dates for `symbol`, in any order.
    async fn expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>, ProviderError>;

    /// Calls and puts of `symbol` expiring on `expiration`.
    async fn chain(&self, symbol: &str, expiration: NaiveDate) -> Result<RawChain, ProviderError>;
}
