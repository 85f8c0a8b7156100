use std::time::Duration;

use crate::error::AppError;

/// Process-level configuration, read once at startup.
///
/// Detection thresholds and cadence are *not* here: they are runtime
/// settings re-read every tick (see [`crate::settings`]).
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    // =========================
    // Notification channel
    // =========================
    /// Telegram bot token. Mandatory: without it nothing can be delivered.
    pub telegram_bot_token: String,

    /// Telegram Bot API base URL (overridable for tests / proxies).
    pub telegram_api_url: String,

    // =========================
    // Market data
    // =========================
    /// Options endpoint base URL of the market-data provider.
    pub yahoo_api_url: String,

    /// Per-request timeout applied to every outbound HTTP call.
    pub http_timeout: Duration,

    /// How many symbols may be fetched concurrently within one tick.
    /// `1` keeps the tick strictly sequential.
    pub fetch_concurrency: usize,

    /// Source tag written on every signal row.
    pub signal_source: String,

    /// JSON logs when `APP_ENV=production`.
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Only the database location; admin commands need nothing else.
    pub fn database_url_from_env() -> String {
        database_url(&|key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let telegram_bot_token =
            get("TELEGRAM_BOT_TOKEN").ok_or(AppError::MissingConfig("TELEGRAM_BOT_TOKEN"))?;

        let http_timeout_secs = parse_or("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"), 10u64)?;
        let fetch_concurrency = parse_or("FETCH_CONCURRENCY", get("FETCH_CONCURRENCY"), 1usize)?;
        if fetch_concurrency == 0 {
            return Err(AppError::InvalidConfig {
                key: "FETCH_CONCURRENCY",
                value: "0".into(),
            });
        }

        Ok(Self {
            database_url: database_url(&get),
            telegram_bot_token,
            telegram_api_url: get("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            yahoo_api_url: get("YAHOO_API_URL")
                .unwrap_or_else(|| "https://query2.finance.yahoo.com/v7/finance".to_string()),
            http_timeout: Duration::from_secs(http_timeout_secs),
            fetch_concurrency,
            signal_source: get("SIGNAL_SOURCE").unwrap_or_else(|| "yfinance".to_string()),
            json_logs: get("APP_ENV").is_some_and(|v| v == "production"),
        })
    }
}

fn database_url(get: &dyn Fn(&str) -> Option<String>) -> String {
    get("DATABASE_URL").unwrap_or_else(|| "sqlite://options_data.db?mode=rwc".to_string())
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, AppError> {
    match raw {
        None => Ok(default),
        Some(v) => match v.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(AppError::InvalidConfig { key, value: v }),
        },
    }
}
