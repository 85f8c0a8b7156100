use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use engine::{OptionKind, SignalRecord};
use optwatch::cli::{AdminCommand, execute};
use optwatch::db::Db;
use optwatch::store::{QuoteStore, SqlxRepository, SubscriberRegistry, TickerRegistry};

async fn setup() -> SqlxRepository {
    let url = format!("sqlite:file:{}?mode=memory&cache=shared", Uuid::new_v4());
    let db = Db::connect(&url).await.expect("connect sqlite memory db");
    db.migrate().await.expect("migrate");
    SqlxRepository::new(db.pool.clone())
}

fn signal(ticker: &str, minute: u32) -> SignalRecord {
    SignalRecord {
        ticker: ticker.into(),
        kind: OptionKind::Call,
        strike: dec!(470),
        expiration: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        volume: 100,
        implied_volatility: 0.5,
        open_interest: 250,
        volume_spike: true,
        iv_increase: false,
        detected_at: Utc.with_ymd_and_hms(2024, 1, 1, 15, minute, 0).unwrap(),
        source: "yfinance".into(),
    }
}

async fn run(repo: &SqlxRepository, command: AdminCommand) -> String {
    execute(command, repo).await.unwrap()
}

#[tokio::test]
async fn watchlist_edits_report_what_changed() {
    let repo = setup().await;
    let track = |s: &str| AdminCommand::Track { symbol: s.into() };

    assert_eq!(run(&repo, track("spy")).await, "✅ SPY added to the watchlist.");
    assert_eq!(run(&repo, track(" SPY ")).await, "SPY is already tracked.");
    assert_eq!(repo.list().await.unwrap().len(), 1);

    assert_eq!(
        run(&repo, AdminCommand::Untrack { symbol: "spy".into() }).await,
        "❌ SPY removed from the watchlist."
    );
    assert_eq!(
        run(&repo, AdminCommand::Untrack { symbol: "spy".into() }).await,
        "SPY is not on the watchlist."
    );
    assert!(execute(track("S P Y"), &repo).await.is_err());
}

#[tokio::test]
async fn resubscribe_turns_alerts_back_on_and_keeps_the_name() {
    let repo = setup().await;

    run(&repo, AdminCommand::Subscribe { recipient_id: 42, name: Some("ops".into()) }).await;
    run(&repo, AdminCommand::Unsubscribe { recipient_id: 42 }).await;
    assert!(repo.list_active().await.unwrap().is_empty());

    let reply = run(&repo, AdminCommand::Subscribe { recipient_id: 42, name: None }).await;
    assert_eq!(reply, "✅ 42 subscribed.");

    let active = repo.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].recipient_id, 42);
    assert_eq!(active[0].display_name.as_deref(), Some("ops"));
}

#[tokio::test]
async fn recent_signals_render_newest_first() {
    let repo = setup().await;
    assert_eq!(run(&repo, AdminCommand::Signals { limit: 10 }).await, "No signals yet.");

    repo.append_signal(&signal("SPY", 1)).await.unwrap();
    repo.append_signal(&signal("QQQ", 2)).await.unwrap();

    let all = run(&repo, AdminCommand::Signals { limit: 10 }).await;
    let blocks: Vec<&str> = all.split("\n\n").collect();
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].starts_with("🚨 <b>QQQ</b>"));
    assert!(blocks[1].starts_with("🚨 <b>SPY</b>"));

    let one = run(&repo, AdminCommand::Signals { limit: 1 }).await;
    assert!(one.starts_with("🚨 <b>QQQ</b>"));
    assert!(!one.contains("SPY"));
}

#[tokio::test]
async fn settings_are_validated_and_listed() {
    let repo = setup().await;

    let reply = run(&repo, AdminCommand::Set { key: "volume_spike_k".into(), value: 2.5 }).await;
    assert_eq!(reply, "✅ volume_spike_k set to 2.5.");

    let rejected = AdminCommand::Set {
        key: "poll_interval_minutes".into(),
        value: 1e20,
    };
    assert!(execute(rejected, &repo).await.is_err());

    let listing = run(&repo, AdminCommand::Settings).await;
    assert!(listing.contains("volume_spike_k = 2.5"));
    assert!(listing.contains("poll_interval_minutes = 10 (default)"));
    assert_eq!(listing.lines().count(), 8);
}
