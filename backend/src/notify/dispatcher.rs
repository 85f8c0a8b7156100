use std::sync::Arc;

use engine::{PutCallRatioRecord, SignalRecord};
use tracing::{error, info, instrument, warn};

use crate::metrics::Counters;
use crate::notify::channel::{DeliveryOutcome, NotificationChannel};
use crate::notify::format;
use crate::store::SubscriberRegistry;

/// Something worth telling subscribers about.
#[derive(Clone, Copy, Debug)]
pub enum Alert<'a> {
    Anomaly(&'a SignalRecord),
    PutCallRatio(&'a PutCallRatioRecord),
}

impl Alert<'_> {
    pub fn ticker(&self) -> &str {
        match self {
            Alert::Anomaly(s) => &s.ticker,
            Alert::PutCallRatio(r) => &r.ticker,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Alert::Anomaly(_) => "anomaly",
            Alert::PutCallRatio(_) => "put_call_ratio",
        }
    }

    pub fn render(&self) -> String {
        match self {
            Alert::Anomaly(s) => format::render_signal(s),
            Alert::PutCallRatio(r) => format::render_pcr(r),
        }
    }
}

/// Per-dispatch tally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub blocked: usize,
    pub failed: usize,
}

/// Fans alerts out to every active subscriber.
///
/// Built once at startup and shared by `Arc`. Recipients are loaded fresh on
/// every dispatch. A blocked recipient is unsubscribed on the spot; any other
/// failure is only logged.
pub struct AlertDispatcher<C> {
    channel: C,
    subscribers: Arc<dyn SubscriberRegistry>,
    counters: Counters,
}

impl<C: NotificationChannel> AlertDispatcher<C> {
    pub fn new(channel: C, subscribers: Arc<dyn SubscriberRegistry>, counters: Counters) -> Self {
        Self {
            channel,
            subscribers,
            counters,
        }
    }

    #[instrument(skip_all, fields(alert = alert.label(), ticker = %alert.ticker()))]
    pub async fn dispatch(&self, alert: &Alert<'_>) -> DispatchReport {
        let text = alert.render();
        self.broadcast(&text).await
    }

    /// Sends pre-rendered text to every active subscriber. Never fails.
    pub async fn broadcast(&self, text: &str) -> DispatchReport {
        let mut report = DispatchReport::default();

        let recipients = match self.subscribers.list_active().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = ?e, "failed to load subscribers, alert dropped");
                return report;
            }
        };

        for sub in &recipients {
            report.attempted += 1;

            match self.channel.send(sub.recipient_id, text).await {
                DeliveryOutcome::Delivered => {
                    report.delivered += 1;
                    Counters::bump(&self.counters.deliveries);
                }
                DeliveryOutcome::Blocked(reason) => {
                    report.blocked += 1;
                    warn!(
                        recipient = sub.recipient_id,
                        %reason,
                        "recipient unreachable, unsubscribing"
                    );

                    let recipient = sub.recipient_id;
                    match self.subscribers.set_subscribed(recipient, false).await {
                        Ok(()) => Counters::bump(&self.counters.auto_unsubscribed),
                        Err(e) => error!(recipient, error = ?e, "auto-unsubscribe failed"),
                    }
                }
                DeliveryOutcome::Failed(reason) => {
                    report.failed += 1;
                    Counters::bump(&self.counters.delivery_failures);
                    warn!(recipient = sub.recipient_id, %reason, "delivery failed");
                }
            }
        }

        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            blocked = report.blocked,
            failed = report.failed,
            "alert dispatched"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use engine::{OptionKind, Sentiment};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    use crate::store::Subscriber;

    struct MemSubscribers {
        rows: Mutex<Vec<Subscriber>>,
        fail_list: bool,
    }

    impl MemSubscribers {
        fn with(ids: &[i64]) -> Self {
            Self {
                rows: Mutex::new(
                    ids.iter()
                        .map(|&id| Subscriber {
                            recipient_id: id,
                            display_name: None,
                            subscribed: true,
                            subscribed_at: Utc::now(),
                        })
                        .collect(),
                ),
                fail_list: false,
            }
        }

        fn is_subscribed(&self, id: i64) -> bool {
            self.rows.lock().iter().any(|s| s.recipient_id == id && s.subscribed)
        }
    }

    #[async_trait]
    impl SubscriberRegistry for MemSubscribers {
        async fn list_active(&self) -> anyhow::Result<Vec<Subscriber>> {
            if self.fail_list {
                anyhow::bail!("db down");
            }
            Ok(self.rows.lock().iter().filter(|s| s.subscribed).cloned().collect())
        }

        async fn set_subscribed(&self, recipient_id: i64, subscribed: bool) -> anyhow::Result<()> {
            for s in self.rows.lock().iter_mut().filter(|s| s.recipient_id == recipient_id) {
                s.subscribed = subscribed;
            }
            Ok(())
        }

        async fn subscribe(
            &self,
            recipient_id: i64,
            _display_name: Option<&str>,
        ) -> anyhow::Result<()> {
            self.set_subscribed(recipient_id, true).await
        }
    }

    /// Blocks and fails fixed recipient ids, records everything sent.
    #[derive(Default)]
    struct ScriptedChannel {
        blocked: Vec<i64>,
        failing: Vec<i64>,
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl NotificationChannel for ScriptedChannel {
        async fn send(&self, recipient_id: i64, text: &str) -> DeliveryOutcome {
            self.sent.lock().push((recipient_id, text.to_string()));
            if self.blocked.contains(&recipient_id) {
                DeliveryOutcome::Blocked("Forbidden: bot was blocked by the user".into())
            } else if self.failing.contains(&recipient_id) {
                DeliveryOutcome::Failed("timeout".into())
            } else {
                DeliveryOutcome::Delivered
            }
        }
    }

    fn signal() -> SignalRecord {
        SignalRecord {
            ticker: "SPY".into(),
            kind: OptionKind::Put,
            strike: dec!(465),
            expiration: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            volume: 900,
            implied_volatility: 0.31,
            open_interest: 40,
            volume_spike: true,
            iv_increase: false,
            detected_at: Utc::now(),
            source: "yfinance".into(),
        }
    }

    #[tokio::test]
    async fn blocked_recipient_is_unsubscribed_others_kept() {
        let subs = Arc::new(MemSubscribers::with(&[1, 2, 3]));
        let counters = Counters::default();
        let dispatcher = AlertDispatcher::new(
            ScriptedChannel {
                blocked: vec![2],
                ..Default::default()
            },
            subs.clone(),
            counters.clone(),
        );

        let s = signal();
        let report = dispatcher.dispatch(&Alert::Anomaly(&s)).await;

        assert_eq!(
            report,
            DispatchReport {
                attempted: 3,
                delivered: 2,
                blocked: 1,
                failed: 0
            }
        );
        assert!(subs.is_subscribed(1));
        assert!(!subs.is_subscribed(2));
        assert!(subs.is_subscribed(3));
        assert_eq!(Counters::get(&counters.auto_unsubscribed), 1);

        // next dispatch skips the unsubscribed recipient
        let again = dispatcher.dispatch(&Alert::Anomaly(&s)).await;
        assert_eq!(again.attempted, 2);
    }

    #[tokio::test]
    async fn other_failures_leave_recipient_subscribed() {
        let subs = Arc::new(MemSubscribers::with(&[7, 8]));
        let dispatcher = AlertDispatcher::new(
            ScriptedChannel {
                failing: vec![7],
                ..Default::default()
            },
            subs.clone(),
            Counters::default(),
        );

        let report = dispatcher.broadcast("hello").await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert!(subs.is_subscribed(7));
    }

    #[tokio::test]
    async fn subscriber_load_failure_delivers_nothing() {
        let subs = Arc::new(MemSubscribers {
            fail_list: true,
            ..MemSubscribers::with(&[1])
        });
        let dispatcher =
            AlertDispatcher::new(ScriptedChannel::default(), subs, Counters::default());

        let report = dispatcher.broadcast("hello").await;

        assert_eq!(report, DispatchReport::default());
        assert!(dispatcher.channel.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn pcr_alert_is_rendered_for_every_recipient() {
        let subs = Arc::new(MemSubscribers::with(&[1, 2]));
        let dispatcher =
            AlertDispatcher::new(ScriptedChannel::default(), subs, Counters::default());
        let r = PutCallRatioRecord {
            ticker: "TSLA".into(),
            call_volume: 10,
            put_volume: 30,
            call_open_interest: 5,
            put_open_interest: 5,
            pcr_volume: 3.0,
            pcr_open_interest: 1.0,
            sentiment: Sentiment::Bearish,
            computed_at: Utc::now(),
        };

        dispatcher.dispatch(&Alert::PutCallRatio(&r)).await;

        let sent = dispatcher.channel.sent.lock();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, t)| t.contains("<b>TSLA</b>") && t.contains("BEARISH")));
    }
}
