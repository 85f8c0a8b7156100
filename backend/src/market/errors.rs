use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(StatusCode),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("no expirations listed")]
    NoExpirations,
}

impl ProviderError {
    /// Any upstream failure is worth another attempt. Data-shape problems
    /// (unknown symbol, malformed body, no expirations) are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(e) => !e.is_decode() && !e.is_builder(),
            ProviderError::Status(_) => true,
            ProviderError::UnknownSymbol(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::NoExpirations => false,
        }
    }
}
