//! Runtime-mutable thresholds and cadence.
//!
//! Values live in the settings store as plain numbers and are re-read at the
//! start of every tick. A missing value falls back to its default silently;
//! a stored value outside its valid range falls back too, with a warning.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use engine::SignalThresholds;
use thiserror::Error;

use crate::market::RetryPolicy;
use crate::store::SettingsRepository;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingKey {
    VolumeSpikeK,
    IvThresholdPercent,
    ExpirationDays,
    PollIntervalMinutes,
    BearishPcr,
    BullishPcr,
    FetchRetryAttempts,
    FetchRetryDelaySeconds,
}

impl SettingKey {
    pub const ALL: [SettingKey; 8] = [
        SettingKey::VolumeSpikeK,
        SettingKey::IvThresholdPercent,
        SettingKey::ExpirationDays,
        SettingKey::PollIntervalMinutes,
        SettingKey::BearishPcr,
        SettingKey::BullishPcr,
        SettingKey::FetchRetryAttempts,
        SettingKey::FetchRetryDelaySeconds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::VolumeSpikeK => "volume_spike_k",
            SettingKey::IvThresholdPercent => "iv_threshold_percent",
            SettingKey::ExpirationDays => "expiration_days",
            SettingKey::PollIntervalMinutes => "poll_interval_minutes",
            SettingKey::BearishPcr => "bearish_pcr",
            SettingKey::BullishPcr => "bullish_pcr",
            SettingKey::FetchRetryAttempts => "fetch_retry_attempts",
            SettingKey::FetchRetryDelaySeconds => "fetch_retry_delay_seconds",
        }
    }

    pub fn default_value(&self) -> f64 {
        match self {
            SettingKey::VolumeSpikeK => 3.0,
            SettingKey::IvThresholdPercent => 10.0,
            SettingKey::ExpirationDays => 7.0,
            SettingKey::PollIntervalMinutes => 10.0,
            SettingKey::BearishPcr => 1.5,
            SettingKey::BullishPcr => 0.5,
            SettingKey::FetchRetryAttempts => 3.0,
            SettingKey::FetchRetryDelaySeconds => 5.0,
        }
    }

    /// Range check for a candidate value. Counts and whole-unit durations
    /// must be integral.
    pub fn accepts(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            SettingKey::VolumeSpikeK => value >= 1.0,
            SettingKey::IvThresholdPercent => (0.0..=100.0).contains(&value),
            SettingKey::ExpirationDays => whole_within(value, 1.0, MAX_EXPIRATION_DAYS),
            SettingKey::PollIntervalMinutes => whole_within(value, 1.0, MAX_POLL_MINUTES),
            SettingKey::FetchRetryAttempts => whole_within(value, 1.0, MAX_RETRY_ATTEMPTS),
            SettingKey::BearishPcr | SettingKey::BullishPcr => value > 0.0,
            SettingKey::FetchRetryDelaySeconds => (0.0..=MAX_RETRY_DELAY_SECS).contains(&value),
        }
    }
}

const MAX_EXPIRATION_DAYS: f64 = 365.0;
const MAX_POLL_MINUTES: f64 = 1440.0;
const MAX_RETRY_ATTEMPTS: f64 = 10.0;
const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

fn whole_within(value: f64, min: f64, max: f64) -> bool {
    value.fract() == 0.0 && (min..=max).contains(&value)
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown setting: {0}")]
    UnknownKey(String),

    #[error("value {value} is out of range for {key}")]
    OutOfRange { key: SettingKey, value: f64 },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Everything one tick needs from the settings store.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeSettings {
    pub thresholds: SignalThresholds,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_lookup(|k| k.default_value())
    }
}

impl RuntimeSettings {
    fn from_lookup(value: impl Fn(SettingKey) -> f64) -> Self {
        Self {
            thresholds: SignalThresholds {
                volume_spike_k: value(SettingKey::VolumeSpikeK),
                iv_threshold: value(SettingKey::IvThresholdPercent) / 100.0,
                expiration_days: value(SettingKey::ExpirationDays) as u32,
                bearish_pcr: value(SettingKey::BearishPcr),
                bullish_pcr: value(SettingKey::BullishPcr),
            },
            poll_interval: duration_of(SettingKey::PollIntervalMinutes, 60.0, &value),
            retry: RetryPolicy {
                attempts: value(SettingKey::FetchRetryAttempts) as u32,
                delay: duration_of(SettingKey::FetchRetryDelaySeconds, 1.0, &value),
            },
        }
    }
}

/// `value(key) * secs_per_unit` as a duration, or the key's default when
/// that does not fit.
fn duration_of(
    key: SettingKey,
    secs_per_unit: f64,
    value: &impl Fn(SettingKey) -> f64,
) -> Duration {
    let raw = value(key);
    match Duration::try_from_secs_f64(raw * secs_per_unit) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(
                setting = key.as_str(),
                value = raw,
                error = %e,
                "setting is not a valid duration, using default"
            );
            Duration::try_from_secs_f64(key.default_value() * secs_per_unit).unwrap_or_default()
        }
    }
}

/// Reads every setting; never fails.
pub async fn load(repo: &dyn SettingsRepository) -> RuntimeSettings {
    let stored = match repo.all_settings().await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "settings unavailable, using defaults");
            Vec::new()
        }
    };

    RuntimeSettings::from_lookup(|key| {
        match stored.iter().find(|(k, _)| k == key.as_str()) {
            None => key.default_value(),
            Some((_, v)) if key.accepts(*v) => *v,
            Some((_, v)) => {
                tracing::warn!(
                    setting = key.as_str(),
                    value = *v,
                    default = key.default_value(),
                    "stored setting out of range, using default"
                );
                key.default_value()
            }
        }
    })
}

/// Validates and stores one setting.
pub async fn update(
    repo: &dyn SettingsRepository,
    key: &str,
    value: f64,
) -> Result<SettingKey, SettingsError> {
    let key = SettingKey::from_str(key)?;
    if !key.accepts(value) {
        return Err(SettingsError::OutOfRange { key, value });
    }

    repo.set_setting(key.as_str(), value).await?;
    tracing::info!(setting = key.as_str(), value, "setting updated");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct MemSettings {
        rows: Mutex<Vec<(String, f64)>>,
        broken: bool,
    }

    #[async_trait]
    impl SettingsRepository for MemSettings {
        async fn get_setting(&self, key: &str) -> anyhow::Result<Option<f64>> {
            Ok(self.rows.lock().iter().find(|(k, _)| k == key).map(|(_, v)| *v))
        }

        async fn set_setting(&self, key: &str, value: f64) -> anyhow::Result<()> {
            let mut rows = self.rows.lock();
            rows.retain(|(k, _)| k != key);
            rows.push((key.to_string(), value));
            Ok(())
        }

        async fn all_settings(&self) -> anyhow::Result<Vec<(String, f64)>> {
            if self.broken {
                anyhow::bail!("db down");
            }
            Ok(self.rows.lock().clone())
        }
    }

    #[tokio::test]
    async fn empty_store_yields_defaults() {
        let s = load(&MemSettings::default()).await;

        assert_eq!(s, RuntimeSettings::default());
        assert_eq!(s.thresholds.volume_spike_k, 3.0);
        assert!((s.thresholds.iv_threshold - 0.10).abs() < 1e-12);
        assert_eq!(s.thresholds.expiration_days, 7);
        assert_eq!(s.poll_interval, Duration::from_secs(600));
        assert_eq!(s.retry.attempts, 3);
        assert_eq!(s.retry.delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn stored_values_override_defaults() {
        let repo = MemSettings::default();
        update(&repo, "volume_spike_k", 2.5).await.unwrap();
        update(&repo, "iv_threshold_percent", 25.0).await.unwrap();
        update(&repo, "poll_interval_minutes", 1.0).await.unwrap();

        let s = load(&repo).await;
        assert_eq!(s.thresholds.volume_spike_k, 2.5);
        assert!((s.thresholds.iv_threshold - 0.25).abs() < 1e-12);
        assert_eq!(s.poll_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    #[traced_test]
    async fn out_of_range_stored_value_falls_back() {
        let repo = MemSettings::default();
        repo.set_setting("volume_spike_k", 0.2).await.unwrap();

        let s = load(&repo).await;

        assert_eq!(s.thresholds.volume_spike_k, 3.0);
        assert!(logs_contain("stored setting out of range"));
    }

    #[tokio::test]
    #[traced_test]
    async fn oversized_interval_row_falls_back_to_default() {
        let repo = MemSettings::default();
        repo.set_setting("poll_interval_minutes", 1e20).await.unwrap();
        repo.set_setting("fetch_retry_delay_seconds", 1e20).await.unwrap();

        let s = load(&repo).await;

        assert_eq!(s.poll_interval, Duration::from_secs(600));
        assert_eq!(s.retry.delay, Duration::from_secs(5));
        assert!(logs_contain("stored setting out of range"));
    }

    #[test]
    fn unrepresentable_duration_uses_default() {
        let s = RuntimeSettings::from_lookup(|k| match k {
            SettingKey::PollIntervalMinutes => 1e20,
            other => other.default_value(),
        });

        assert_eq!(s.poll_interval, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn store_failure_yields_defaults() {
        let repo = MemSettings {
            broken: true,
            ..Default::default()
        };
        assert_eq!(load(&repo).await, RuntimeSettings::default());
    }

    #[tokio::test]
    async fn update_validates() {
        let repo = MemSettings::default();

        assert!(matches!(
            update(&repo, "volume_spike_k", 0.5).await,
            Err(SettingsError::OutOfRange { key: SettingKey::VolumeSpikeK, .. })
        ));
        assert!(matches!(
            update(&repo, "iv_threshold_percent", 101.0).await,
            Err(SettingsError::OutOfRange { .. })
        ));
        assert!(matches!(
            update(&repo, "expiration_days", 0.0).await,
            Err(SettingsError::OutOfRange { .. })
        ));
        assert!(matches!(update(&repo, "nope", 1.0).await, Err(SettingsError::UnknownKey(_))));
        assert!(matches!(
            update(&repo, "bullish_pcr", f64::NAN).await,
            Err(SettingsError::OutOfRange { .. })
        ));
        assert!(matches!(
            update(&repo, "poll_interval_minutes", 1e20).await,
            Err(SettingsError::OutOfRange { key: SettingKey::PollIntervalMinutes, .. })
        ));
        assert!(matches!(
            update(&repo, "fetch_retry_delay_seconds", 3601.0).await,
            Err(SettingsError::OutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn whole_number_settings_reject_fractions() {
        let repo = MemSettings::default();

        for key in ["expiration_days", "fetch_retry_attempts", "poll_interval_minutes"] {
            assert!(
                matches!(update(&repo, key, 1.5).await, Err(SettingsError::OutOfRange { .. })),
                "{key} accepted a fraction"
            );
        }
        assert!(repo.rows.lock().is_empty());

        update(&repo, "fetch_retry_delay_seconds", 2.5).await.unwrap();

        let key = update(&repo, " expiration_days ", 3.0).await.unwrap();
        assert_eq!(key, SettingKey::ExpirationDays);
        assert_eq!(repo.get_setting("expiration_days").await.unwrap(), Some(3.0));
    }

    #[test]
    fn keys_round_trip_through_names() {
        for k in SettingKey::ALL {
            assert_eq!(SettingKey::from_str(k.as_str()).unwrap(), k);
            assert!(k.accepts(k.default_value()));
        }
    }
}
