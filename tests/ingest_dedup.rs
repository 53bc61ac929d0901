// tests/ingest_dedup.rs
//
// Filter properties: duplicate idempotence, daily budget with rollover, and
// the zero-match relevance rule.

use chrono::{DateTime, Duration, TimeZone, Utc};
use news_signal_pipeline::config::IngestConfig;
use news_signal_pipeline::ingest::{IngestionFilter, ItemOutcome, RawNewsItem, RejectReason};

fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, min, 0).unwrap()
}

fn item(title: &str, content: &str, published: DateTime<Utc>) -> RawNewsItem {
    RawNewsItem {
        title: title.into(),
        content: content.into(),
        source: "Reuters".into(),
        url: String::new(),
        published_at: Some(published.to_rfc3339()),
    }
}

fn cfg() -> IngestConfig {
    let mut cfg = IngestConfig::default();
    cfg.thresholds.min_relevance_score = 0.1;
    cfg
}

fn solar(n: usize, published: DateTime<Utc>) -> RawNewsItem {
    let titles = [
        "TAN climbs as Texas approves a giant solar farm",
        "Solar installers report record quarter, TAN rises",
        "Why utilities keep buying solar panels: TAN view",
        "TAN holders cheer new federal solar tax credit",
        "Desert solar auction draws bids; TAN ticks up",
        "Rooftop solar demand in Europe lifts TAN",
    ];
    item(
        titles[n % titles.len()],
        &format!("Project {n}: regulators cleared a utility-scale solar build, a gain for TAN holders."),
        published,
    )
}

#[test]
fn same_item_twice_is_accepted_once() {
    let mut f = IngestionFilter::new(&cfg()).unwrap();
    let now = at(4, 16, 0);
    let raw = solar(1, now);

    let (first, _) = f.filter(std::slice::from_ref(&raw), now);
    let (second, stats) = f.filter(std::slice::from_ref(&raw), now + Duration::minutes(5));

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(stats.reasons.get("duplicate_content"), Some(&1));
}

#[test]
fn near_duplicate_titles_are_rejected() {
    let mut f = IngestionFilter::new(&cfg()).unwrap();
    let now = at(4, 16, 0);
    let a = item(
        "TAN jumps after solar tariff ruling",
        "A federal court struck down solar tariffs, a clear gain for TAN.",
        now,
    );
    let b = item(
        "TAN jumps after solar tariff ruling!",
        "Different wording of the same story about solar tariffs and TAN gain.",
        now,
    );
    let (accepted, stats) = f.filter(&[a, b], now);
    assert_eq!(accepted.len(), 1);
    assert_eq!(stats.reasons.get("duplicate_content"), Some(&1));
}

#[test]
fn daily_budget_then_local_midnight_rollover() {
    let mut c = cfg();
    c.max_daily_headlines = 3;
    let mut f = IngestionFilter::new(&c).unwrap();

    // 15:00 UTC = 10:00 New York
    let now = at(4, 15, 0);
    let raw: Vec<RawNewsItem> = (0..5).map(|n| solar(n, now)).collect();
    let (accepted, stats) = f.filter(&raw, now);
    assert_eq!(accepted.len(), 3);
    assert_eq!(stats.reasons.get("daily_limit_reached"), Some(&2));
    assert_eq!(stats.remaining_daily_budget, 0);

    // 03:00 UTC on the 5th is still the 4th in New York
    let late = at(5, 3, 0);
    match f.evaluate(&solar(5, at(4, 20, 0)), late) {
        ItemOutcome::Rejected(r) => assert_eq!(r.reason, RejectReason::DailyLimitReached),
        other => panic!("expected daily limit, got {other:?}"),
    }

    // next local morning: fresh budget and a cleared duplicate window
    let next = at(5, 15, 0);
    let (accepted, _) = f.filter(&[solar(0, next)], next);
    assert_eq!(accepted.len(), 1);
    assert_eq!(f.daily_count(), 1);
}

#[test]
fn no_ticker_or_keyword_is_rejected_as_irrelevant() {
    let mut f = IngestionFilter::new(&cfg()).unwrap();
    let now = at(4, 16, 0);
    let raw = item(
        "City council approves new bike lanes downtown",
        "The plan adds twelve miles of protected lanes over two years.",
        now,
    );
    match f.evaluate(&raw, now) {
        ItemOutcome::Rejected(r) => {
            assert_eq!(r.reason, RejectReason::NoRelevantKeywords);
            assert_eq!(r.relevance_score, 0.0);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn two_tickers_without_keywords_pass_coverage() {
    let mut c = cfg();
    c.thresholds.min_relevance_score = 0.05;
    let mut f = IngestionFilter::new(&c).unwrap();
    let now = at(4, 16, 0);
    let two = item(
        "ITA and XAR gain after contract awards",
        "Shares tracked by ITA and XAR closed with a gain on Tuesday.",
        now,
    );
    let one = item(
        "ITA gains after a large contract award",
        "Shares tracked by ITA closed with a gain on Tuesday afternoon.",
        now,
    );
    assert!(matches!(f.evaluate(&two, now), ItemOutcome::Accepted(_)));
    match f.evaluate(&one, now) {
        ItemOutcome::Rejected(r) => assert_eq!(r.reason, RejectReason::NoRelevantKeywords),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn malformed_items_are_counted_not_fatal() {
    let mut f = IngestionFilter::new(&cfg()).unwrap();
    let now = at(4, 16, 0);
    let mut bad_ts = solar(1, now);
    bad_ts.published_at = Some("next tuesday".into());
    let mut no_title = solar(2, now);
    no_title.title = "   ".into();

    let (accepted, stats) = f.filter(&[bad_ts, no_title, solar(3, now)], now);
    assert_eq!(accepted.len(), 1);
    assert_eq!(stats.errored, 2);
}
