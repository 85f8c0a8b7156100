use std::str::FromStr;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use engine::{
    OptionKind, OptionQuote, PutCallRatioRecord, Sentiment, SignalRecord, parse_expiration,
};
use rust_decimal::Decimal;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, AnyPool, Row};

use crate::store::model::{SnapshotRecord, Subscriber, TrackedSymbol};
use crate::store::repository::{QuoteStore, SettingsRepository, SubscriberRegistry, TickerRegistry};

const QUOTE_COLUMNS: &str = "ticker, option_type, strike, expiration, last_price, bid, ask, \
     implied_volatility, volume, open_interest, underlying_price";

/// SQLx-backed implementation of every store seam.
/// Responsible only for persistence and row mapping.
#[derive(Clone)]
pub struct SqlxRepository {
    pool: AnyPool,
}

impl SqlxRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TickerRegistry for SqlxRepository {
    async fn list(&self) -> anyhow::Result<Vec<TrackedSymbol>> {
        let rows = sqlx::query("SELECT symbol, added_ms FROM tickers ORDER BY id ASC;")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let symbol: String = r.try_get("symbol")?;
            out.push(TrackedSymbol {
                symbol,
                added_at: ms_to_datetime(r.try_get("added_ms")?)?,
            });
        }
        Ok(out)
    }

    async fn add(&self, symbol: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
INSERT INTO tickers (symbol, added_ms) VALUES (?, ?)
ON CONFLICT(symbol) DO NOTHING;
"#,
        )
        .bind(symbol.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn remove(&self, symbol: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM tickers WHERE symbol = ?;")
            .bind(symbol.to_string())
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl QuoteStore for SqlxRepository {
    async fn upsert_latest_quote(&self, quote: &OptionQuote) -> anyhow::Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_latest(&mut conn, quote).await
    }

    async fn append_snapshot(
        &self,
        quote: &OptionQuote,
        snapshot_time: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_snapshot(&mut conn, quote, snapshot_time).await
    }

    async fn save_quotes(
        &self,
        quotes: &[OptionQuote],
        snapshot_time: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for q in quotes {
            write_latest(&mut tx, q).await?;
            write_snapshot(&mut tx, q, snapshot_time).await?;
        }

        tx.commit().await.context("committing quote batch")?;
        Ok(())
    }

    async fn append_signal(&self, signal: &SignalRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO signals_log (
  ticker, option_type, strike, expiration,
  volume, implied_volatility, open_interest,
  volume_spike, iv_increase, signal_ms, source
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(signal.ticker.clone())
        .bind(signal.kind.as_str())
        .bind(strike_text(signal.strike))
        .bind(signal.expiration.format("%Y-%m-%d").to_string())
        .bind(u64_to_i64(signal.volume)?)
        .bind(signal.implied_volatility)
        .bind(u64_to_i64(signal.open_interest)?)
        .bind(i64::from(signal.volume_spike))
        .bind(i64::from(signal.iv_increase))
        .bind(signal.detected_at.timestamp_millis())
        .bind(signal.source.clone())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_pcr(&self, record: &PutCallRatioRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO put_call_ratios (
  ticker, call_volume, put_volume, call_oi, put_oi,
  pcr_volume, pcr_oi, signal_type, calculated_ms
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(record.ticker.clone())
        .bind(u64_to_i64(record.call_volume)?)
        .bind(u64_to_i64(record.put_volume)?)
        .bind(u64_to_i64(record.call_open_interest)?)
        .bind(u64_to_i64(record.put_open_interest)?)
        .bind(record.pcr_volume)
        .bind(record.pcr_open_interest)
        .bind(record.sentiment.as_str())
        .bind(record.computed_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_signals(&self, limit: usize) -> anyhow::Result<Vec<SignalRecord>> {
        let rows = sqlx::query(
            r#"
SELECT
  ticker, option_type, strike, expiration,
  volume, implied_volatility, open_interest,
  volume_spike, iv_increase, signal_ms, source
FROM signals_log
ORDER BY id DESC
LIMIT ?;
"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(map_rows(rows, row_to_signal, "signal"))
    }

    async fn recent_pcr(&self, limit: usize) -> anyhow::Result<Vec<PutCallRatioRecord>> {
        let rows = sqlx::query(
            r#"
SELECT
  ticker, call_volume, put_volume, call_oi, put_oi,
  pcr_volume, pcr_oi, signal_type, calculated_ms
FROM put_call_ratios
ORDER BY id DESC
LIMIT ?;
"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(map_rows(rows, row_to_pcr, "put/call ratio"))
    }

    async fn latest_quotes(&self, ticker: &str) -> anyhow::Result<Vec<OptionQuote>> {
        let sql = format!(
            "SELECT {QUOTE_COLUMNS}, updated_ms AS observed_ms FROM options_data WHERE ticker = ?;"
        );
        let rows = sqlx::query(&sql)
            .bind(ticker.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut out = map_rows(rows, row_to_quote, "latest quote");
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(out)
    }

    async fn snapshots(&self, ticker: &str, limit: usize) -> anyhow::Result<Vec<SnapshotRecord>> {
        let sql = format!(
            "SELECT {QUOTE_COLUMNS}, observed_ms, snapshot_ms FROM option_snapshots \
             WHERE ticker = ? ORDER BY snapshot_ms DESC, id DESC LIMIT ?;"
        );
        let rows = sqlx::query(&sql)
            .bind(ticker.to_string())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(map_rows(
            rows,
            |r| {
                Ok(SnapshotRecord {
                    quote: row_to_quote(r)?,
                    snapshot_time: ms_to_datetime(r.try_get("snapshot_ms")?)?,
                })
            },
            "snapshot",
        ))
    }
}

#[async_trait]
impl SubscriberRegistry for SqlxRepository {
    async fn list_active(&self) -> anyhow::Result<Vec<Subscriber>> {
        let rows = sqlx::query(
            r#"
SELECT user_id, username, subscribed, subscribed_ms
FROM subscribers
WHERE subscribed = 1
ORDER BY subscribed_ms ASC, user_id ASC;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(map_rows(
            rows,
            |r| {
                Ok(Subscriber {
                    recipient_id: r.try_get("user_id")?,
                    display_name: r.try_get("username")?,
                    subscribed: r.try_get::<i64, _>("subscribed")? == 1,
                    subscribed_at: ms_to_datetime(r.try_get("subscribed_ms")?)?,
                })
            },
            "subscriber",
        ))
    }

    async fn set_subscribed(&self, recipient_id: i64, subscribed: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE subscribers SET subscribed = ? WHERE user_id = ?;")
            .bind(i64::from(subscribed))
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn subscribe(&self, recipient_id: i64, display_name: Option<&str>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO subscribers (user_id, username, subscribed, subscribed_ms)
VALUES (?, ?, 1, ?)
ON CONFLICT(user_id) DO UPDATE SET
  subscribed = 1,
  username = COALESCE(excluded.username, subscribers.username),
  subscribed_ms = excluded.subscribed_ms;
"#,
        )
        .bind(recipient_id)
        .bind(display_name.map(str::to_string))
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for SqlxRepository {
    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<f64>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?;")
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(r.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set_setting(&self, key: &str, value: f64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO settings (key, value, updated_ms) VALUES (?, ?, ?)
ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_ms = excluded.updated_ms;
"#,
        )
        .bind(key.to_string())
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn all_settings(&self) -> anyhow::Result<Vec<(String, f64)>> {
        let rows = sqlx::query("SELECT key, value FROM settings ORDER BY key ASC;")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push((r.try_get("key")?, r.try_get("value")?));
        }
        Ok(out)
    }
}

/* =========================
Statements shared by the single-row and batch paths
========================= */

async fn write_latest(conn: &mut AnyConnection, q: &OptionQuote) -> anyhow::Result<()> {
    sqlx::query(
        r#"
INSERT INTO options_data (
  ticker, option_type, strike, expiration,
  last_price, bid, ask, implied_volatility,
  volume, open_interest, underlying_price, updated_ms
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(ticker, option_type, strike, expiration) DO UPDATE SET
  last_price = excluded.last_price,
  bid = excluded.bid,
  ask = excluded.ask,
  implied_volatility = excluded.implied_volatility,
  volume = excluded.volume,
  open_interest = excluded.open_interest,
  underlying_price = excluded.underlying_price,
  updated_ms = excluded.updated_ms;
"#,
    )
    .bind(q.ticker.clone())
    .bind(q.kind.as_str())
    .bind(strike_text(q.strike))
    .bind(q.expiration.format("%Y-%m-%d").to_string())
    .bind(q.last_price)
    .bind(q.bid)
    .bind(q.ask)
    .bind(q.implied_volatility)
    .bind(q.volume.map(u64_to_i64).transpose()?)
    .bind(q.open_interest.map(u64_to_i64).transpose()?)
    .bind(q.underlying_price)
    .bind(q.observed_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn write_snapshot(
    conn: &mut AnyConnection,
    q: &OptionQuote,
    snapshot_time: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
INSERT INTO option_snapshots (
  ticker, option_type, strike, expiration,
  last_price, bid, ask, implied_volatility,
  volume, open_interest, underlying_price, observed_ms, snapshot_ms
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
    )
    .bind(q.ticker.clone())
    .bind(q.kind.as_str())
    .bind(strike_text(q.strike))
    .bind(q.expiration.format("%Y-%m-%d").to_string())
    .bind(q.last_price)
    .bind(q.bid)
    .bind(q.ask)
    .bind(q.implied_volatility)
    .bind(q.volume.map(u64_to_i64).transpose()?)
    .bind(q.open_interest.map(u64_to_i64).transpose()?)
    .bind(q.underlying_price)
    .bind(q.observed_at.timestamp_millis())
    .bind(snapshot_time.timestamp_millis())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/* =========================
Row mapping + conversions
========================= */

/// Poison-row resilience: a malformed row is logged and skipped instead
/// of failing the whole read.
fn map_rows<T>(
    rows: Vec<AnyRow>,
    f: impl Fn(&AnyRow) -> anyhow::Result<T>,
    what: &'static str,
) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        match f(r) {
            Ok(v) => out.push(v),
            Err(e) => tracing::warn!(error = %e, row = what, "skipping malformed row"),
        }
    }
    out
}

fn row_to_quote(r: &AnyRow) -> anyhow::Result<OptionQuote> {
    Ok(OptionQuote {
        ticker: r.try_get("ticker")?,
        kind: parse_kind(r)?,
        strike: parse_strike(r)?,
        expiration: parse_date(r)?,
        last_price: r.try_get("last_price")?,
        bid: r.try_get("bid")?,
        ask: r.try_get("ask")?,
        implied_volatility: r.try_get("implied_volatility")?,
        volume: r.try_get::<Option<i64>, _>("volume")?.map(i64_to_u64).transpose()?,
        open_interest: r
            .try_get::<Option<i64>, _>("open_interest")?
            .map(i64_to_u64)
            .transpose()?,
        underlying_price: r.try_get("underlying_price")?,
        observed_at: ms_to_datetime(r.try_get("observed_ms")?)?,
    })
}

fn row_to_signal(r: &AnyRow) -> anyhow::Result<SignalRecord> {
    Ok(SignalRecord {
        ticker: r.try_get("ticker")?,
        kind: parse_kind(r)?,
        strike: parse_strike(r)?,
        expiration: parse_date(r)?,
        volume: i64_to_u64(r.try_get("volume")?)?,
        implied_volatility: r.try_get("implied_volatility")?,
        open_interest: i64_to_u64(r.try_get("open_interest")?)?,
        volume_spike: r.try_get::<i64, _>("volume_spike")? == 1,
        iv_increase: r.try_get::<i64, _>("iv_increase")? == 1,
        detected_at: ms_to_datetime(r.try_get("signal_ms")?)?,
        source: r.try_get("source")?,
    })
}

fn row_to_pcr(r: &AnyRow) -> anyhow::Result<PutCallRatioRecord> {
    let sentiment: String = r.try_get("signal_type")?;
    Ok(PutCallRatioRecord {
        ticker: r.try_get("ticker")?,
        call_volume: i64_to_u64(r.try_get("call_volume")?)?,
        put_volume: i64_to_u64(r.try_get("put_volume")?)?,
        call_open_interest: i64_to_u64(r.try_get("call_oi")?)?,
        put_open_interest: i64_to_u64(r.try_get("put_oi")?)?,
        pcr_volume: r.try_get("pcr_volume")?,
        pcr_open_interest: r.try_get("pcr_oi")?,
        sentiment: Sentiment::from_str(&sentiment).map_err(|e| anyhow!(e))?,
        computed_at: ms_to_datetime(r.try_get("calculated_ms")?)?,
    })
}

fn parse_kind(r: &AnyRow) -> anyhow::Result<OptionKind> {
    let raw: String = r.try_get("option_type")?;
    OptionKind::from_str(&raw).map_err(|e| anyhow!(e))
}

fn parse_strike(r: &AnyRow) -> anyhow::Result<Decimal> {
    let raw: String = r.try_get("strike")?;
    Decimal::from_str(&raw).with_context(|| format!("invalid strike {raw:?}"))
}

fn parse_date(r: &AnyRow) -> anyhow::Result<NaiveDate> {
    let raw: String = r.try_get("expiration")?;
    parse_expiration(&raw).ok_or_else(|| anyhow!("invalid expiration {raw:?}"))
}

/// Strikes are keyed by their normalized decimal text so `470` and
/// `470.00` land on the same row.
fn strike_text(strike: Decimal) -> String {
    strike.normalize().to_string()
}

fn ms_to_datetime(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    if v < 0 {
        return Err(anyhow!("negative i64 where u64 expected: {v}"));
    }
    Ok(v as u64)
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}
