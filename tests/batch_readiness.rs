// tests/batch_readiness.rs
//
// Batch assembler readiness: full batches release at once, minimum-size
// batches release only after the wait, oversize groups split.

use chrono::{DateTime, Duration, TimeZone, Utc};
use news_signal_pipeline::batch::BatchAssembler;
use news_signal_pipeline::config::{BatchingConfig, SourceCategory, SourceProfile};
use news_signal_pipeline::ingest::NewsItem;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap()
}

fn news(n: usize, ticker: &str) -> NewsItem {
    let tz = chrono_tz::America::New_York;
    NewsItem {
        title: format!("{ticker} headline {n}"),
        content: format!("{ticker} story number {n} about solar demand"),
        source: "Reuters".into(),
        url: format!("https://news.example/{ticker}/{n}"),
        published_at: t0().with_timezone(&tz),
        hash_id: format!("{ticker}-{n}"),
        tickers: vec![ticker.to_string()],
        keywords: vec!["solar".into()],
        source_profile: SourceProfile {
            priority: 5,
            category: SourceCategory::Financial,
        },
        relevance_score: 0.4,
        sentiment_score: 0.5,
    }
}

#[test]
fn full_batch_is_ready_immediately() {
    let mut a = BatchAssembler::new(&BatchingConfig::default());
    let ready = a.add_items((0..5).map(|n| news(n, "TAN")).collect(), t0());

    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].size(), 5);
    assert_eq!(ready[0].group_key, "ticker_TAN");
    assert_eq!(a.stats().pending_batches, 0);
}

#[test]
fn min_size_batch_waits_for_the_window() {
    let mut a = BatchAssembler::new(&BatchingConfig::default());
    assert!(a.add_items(vec![news(0, "LIT"), news(1, "LIT")], t0()).is_empty());

    assert!(a.add_items(Vec::new(), t0() + Duration::seconds(299)).is_empty());
    let ready = a.add_items(Vec::new(), t0() + Duration::seconds(300));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].size(), 2);
    assert_eq!(ready[0].created_at, t0());
}

#[test]
fn single_item_never_ages_out() {
    let mut a = BatchAssembler::new(&BatchingConfig::default());
    a.add_items(vec![news(0, "URA")], t0());
    assert!(a.sweep(t0() + Duration::hours(6)).is_empty());
    assert_eq!(a.stats().pending_items, 1);
}

#[test]
fn later_items_merge_into_the_open_batch() {
    let mut a = BatchAssembler::new(&BatchingConfig::default());
    a.add_items(vec![news(0, "ITA")], t0());
    assert!(a.add_items(vec![news(1, "ITA")], t0() + Duration::seconds(100)).is_empty());

    let pending = a.pending_batches();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].size(), 2);
    assert_eq!(pending[0].created_at, t0());

    let ready = a.sweep(t0() + Duration::seconds(300));
    assert_eq!(ready.len(), 1);
}

#[test]
fn oversize_group_splits_and_remainder_keeps_its_age() {
    let mut a = BatchAssembler::new(&BatchingConfig::default());
    let ready = a.add_items((0..12).map(|n| news(n, "TAN")).collect(), t0());

    assert_eq!(ready.len(), 2);
    assert!(ready.iter().all(|b| b.size() == 5));
    assert_ne!(ready[0].batch_id, ready[1].batch_id);

    let stats = a.stats();
    assert_eq!(stats.pending_batches, 1);
    assert_eq!(stats.pending_items, 2);

    let rest = a.sweep(t0() + Duration::seconds(300));
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].size(), 2);
}

#[test]
fn groups_are_kept_apart() {
    let mut a = BatchAssembler::new(&BatchingConfig::default());
    let ready = a.add_items(
        vec![news(0, "TAN"), news(1, "XLE"), news(2, "TAN")],
        t0(),
    );
    assert!(ready.is_empty());

    let stats = a.stats();
    assert_eq!(stats.pending_batches, 2);
    assert_eq!(stats.pending_items, 3);
    assert_eq!(stats.max_batch_size, 5);
    assert_eq!(stats.min_batch_size, 2);
    assert_eq!(stats.max_wait_secs, 300);

    // only the TAN group meets the minimum size
    let aged = a.sweep(t0() + Duration::minutes(10));
    assert_eq!(aged.len(), 1);
    assert_eq!(aged[0].tickers, vec!["TAN"]);
}
