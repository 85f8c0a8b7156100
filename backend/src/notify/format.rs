//! Text rendering for the notification channel (Telegram HTML subset).

use engine::{PutCallRatioRecord, SignalRecord};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn fired_rules(s: &SignalRecord) -> &'static str {
    match (s.volume_spike, s.iv_increase) {
        (true, true) => "volume spike + IV increase",
        (true, false) => "volume spike",
        (false, true) => "IV increase",
        (false, false) => "none",
    }
}

pub fn render_signal(s: &SignalRecord) -> String {
    format!(
        "🚨 <b>{ticker}</b> | {kind} | Strike: {strike} | Exp: {exp}\n\
         Volume: {volume} | IV: {iv:.1}%\n\
         OI: {oi}\n\
         Rule: {rule}\n\
         Time: {time}\n\
         Source: {source}",
        ticker = escape_html(&s.ticker),
        kind = s.kind,
        strike = s.strike.normalize(),
        exp = s.expiration.format("%Y-%m-%d"),
        volume = s.volume,
        iv = s.implied_volatility * 100.0,
        oi = s.open_interest,
        rule = fired_rules(s),
        time = s.detected_at.format(TIME_FORMAT),
        source = escape_html(&s.source),
    )
}

pub fn render_pcr(r: &PutCallRatioRecord) -> String {
    format!(
        "📊 <b>{ticker}</b> put/call ratio: <b>{sentiment}</b>\n\
         Volume PCR: {pcr_v:.2} (puts {pv} / calls {cv})\n\
         OI PCR: {pcr_oi:.2} (puts {poi} / calls {coi})\n\
         Time: {time}",
        ticker = escape_html(&r.ticker),
        sentiment = r.sentiment,
        pcr_v = r.pcr_volume,
        pv = r.put_volume,
        cv = r.call_volume,
        pcr_oi = r.pcr_open_interest,
        poi = r.put_open_interest,
        coi = r.call_open_interest,
        time = r.computed_at.format(TIME_FORMAT),
    )
}

/// The recent-signals listing, newest first as given.
pub fn render_recent(signals: &[SignalRecord]) -> String {
    if signals.is_empty() {
        return "No signals yet.".to_string();
    }
    signals.iter().map(render_signal).collect::<Vec<_>>().join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use engine::{OptionKind, Sentiment};
    use rust_decimal_macros::dec;

    fn signal() -> SignalRecord {
        SignalRecord {
            ticker: "SPY".into(),
            kind: OptionKind::Call,
            strike: dec!(470.00),
            expiration: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            volume: 100,
            implied_volatility: 0.5,
            open_interest: 250,
            volume_spike: true,
            iv_increase: true,
            detected_at: Utc.with_ymd_and_hms(2024, 1, 1, 15, 30, 0).unwrap(),
            source: "yfinance".into(),
        }
    }

    #[test]
    fn signal_text() {
        let text = render_signal(&signal());

        assert_eq!(
            text,
            "🚨 <b>SPY</b> | CALL | Strike: 470 | Exp: 2024-01-05\n\
             Volume: 100 | IV: 50.0%\n\
             OI: 250\n\
             Rule: volume spike + IV increase\n\
             Time: 2024-01-01 15:30\n\
             Source: yfinance"
        );
    }

    #[test]
    fn pcr_text() {
        let r = PutCallRatioRecord {
            ticker: "AAPL".into(),
            call_volume: 160,
            put_volume: 256,
            call_open_interest: 1000,
            put_open_interest: 500,
            pcr_volume: 1.6,
            pcr_open_interest: 0.5,
            sentiment: Sentiment::Bearish,
            computed_at: Utc.with_ymd_and_hms(2024, 1, 1, 15, 30, 0).unwrap(),
        };

        let text = render_pcr(&r);
        assert!(text.starts_with("📊 <b>AAPL</b> put/call ratio: <b>BEARISH</b>"));
        assert!(text.contains("Volume PCR: 1.60 (puts 256 / calls 160)"));
        assert!(text.contains("OI PCR: 0.50 (puts 500 / calls 1000)"));
    }

    #[test]
    fn recent_listing() {
        assert_eq!(render_recent(&[]), "No signals yet.");

        let two = render_recent(&[signal(), signal()]);
        assert_eq!(two.matches("🚨").count(), 2);
        assert!(two.contains("\n\n🚨"));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("a<b>&c"), "a&lt;b&gt;&amp;c");
    }
}
