use anyhow::Context;
use sqlx::AnyPool;

/// Idempotent schema bootstrap. Safe to run on every start.
const STATEMENTS: &[(&str, &str)] = &[
    (
        "tickers",
        r#"
CREATE TABLE IF NOT EXISTS tickers (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  symbol TEXT NOT NULL UNIQUE,
  added_ms BIGINT NOT NULL
);
"#,
    ),
    (
        "options_data",
        r#"
CREATE TABLE IF NOT EXISTS options_data (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ticker TEXT NOT NULL,
  option_type TEXT NOT NULL CHECK (option_type IN ('CALL','PUT')),
  strike TEXT NOT NULL,
  expiration TEXT NOT NULL,
  last_price REAL,
  bid REAL,
  ask REAL,
  implied_volatility REAL,
  volume BIGINT,
  open_interest BIGINT,
  underlying_price REAL,
  updated_ms BIGINT NOT NULL,
  UNIQUE (ticker, option_type, strike, expiration)
);
"#,
    ),
    (
        "option_snapshots",
        r#"
CREATE TABLE IF NOT EXISTS option_snapshots (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ticker TEXT NOT NULL,
  option_type TEXT NOT NULL,
  strike TEXT NOT NULL,
  expiration TEXT NOT NULL,
  last_price REAL,
  bid REAL,
  ask REAL,
  implied_volatility REAL,
  volume BIGINT,
  open_interest BIGINT,
  underlying_price REAL,
  observed_ms BIGINT NOT NULL,
  snapshot_ms BIGINT NOT NULL
);
"#,
    ),
    (
        "signals_log",
        r#"
CREATE TABLE IF NOT EXISTS signals_log (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ticker TEXT NOT NULL,
  option_type TEXT NOT NULL,
  strike TEXT NOT NULL,
  expiration TEXT NOT NULL,
  volume BIGINT NOT NULL,
  implied_volatility REAL NOT NULL,
  open_interest BIGINT NOT NULL,
  volume_spike INTEGER NOT NULL CHECK (volume_spike IN (0,1)),
  iv_increase INTEGER NOT NULL CHECK (iv_increase IN (0,1)),
  signal_ms BIGINT NOT NULL,
  source TEXT NOT NULL
);
"#,
    ),
    (
        "put_call_ratios",
        r#"
CREATE TABLE IF NOT EXISTS put_call_ratios (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ticker TEXT NOT NULL,
  call_volume BIGINT NOT NULL,
  put_volume BIGINT NOT NULL,
  call_oi BIGINT NOT NULL,
  put_oi BIGINT NOT NULL,
  pcr_volume REAL NOT NULL,
  pcr_oi REAL NOT NULL,
  signal_type TEXT NOT NULL,
  calculated_ms BIGINT NOT NULL
);
"#,
    ),
    (
        "settings",
        r#"
CREATE TABLE IF NOT EXISTS settings (
  key TEXT PRIMARY KEY,
  value REAL NOT NULL,
  updated_ms BIGINT NOT NULL
);
"#,
    ),
    (
        "subscribers",
        r#"
CREATE TABLE IF NOT EXISTS subscribers (
  user_id BIGINT PRIMARY KEY,
  username TEXT,
  subscribed INTEGER NOT NULL CHECK (subscribed IN (0,1)),
  subscribed_ms BIGINT NOT NULL
);
"#,
    ),
    (
        "idx_snapshots_ticker",
        r#"
CREATE INDEX IF NOT EXISTS idx_snapshots_ticker
  ON option_snapshots(ticker, snapshot_ms);
"#,
    ),
    (
        "idx_options_ticker",
        r#"CREATE INDEX IF NOT EXISTS idx_options_ticker ON options_data(ticker);"#,
    ),
    (
        "idx_pcr_ticker",
        r#"CREATE INDEX IF NOT EXISTS idx_pcr_ticker ON put_call_ratios(ticker);"#,
    ),
];

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    for (name, sql) in STATEMENTS {
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("schema step {name} failed"))?;
    }
    tracing::info!(steps = STATEMENTS.len(), "schema up to date");
    Ok(())
}
