// tests/ingest_pipeline.rs
//
// Ingestion filter over the JSON fixture: one accepted item per theme and one
// item for each common rejection path.

use chrono::{DateTime, TimeZone, Utc};
use news_signal_pipeline::config::IngestConfig;
use news_signal_pipeline::ingest::providers::JsonFileSource;
use news_signal_pipeline::ingest::{IngestionFilter, NewsSource, RawNewsItem};

const FIXTURE: &str = include_str!("fixtures/news.json");

fn now() -> DateTime<Utc> {
    // 14:00 in New York
    Utc.with_ymd_and_hms(2025, 3, 4, 19, 0, 0).unwrap()
}

async fn fixture_items() -> Vec<RawNewsItem> {
    JsonFileSource::from_fixture(FIXTURE).fetch_latest().await.unwrap()
}

#[tokio::test]
async fn fixture_yields_expected_outcomes() {
    let raw = fixture_items().await;
    assert_eq!(raw.len(), 7);

    let mut filter = IngestionFilter::new(&IngestConfig::default()).unwrap();
    let (accepted, stats) = filter.filter(&raw, now());

    let titles: Vec<&str> = accepted.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "TAN, ICLN and LIT rally as solar and battery demand surge",
            "ITA and XAR surge on defense spending as BOTZ and DRIV gain on robotics",
        ]
    );

    assert_eq!(stats.total_received, 7);
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.rejected, 4);
    assert_eq!(stats.errored, 1);
    assert_eq!(stats.reasons.get("duplicate_content"), Some(&1));
    assert_eq!(stats.reasons.get("outside_market_hours"), Some(&1));
    assert_eq!(stats.reasons.get("no_relevant_keywords"), Some(&1));
    assert_eq!(stats.reasons.get("low_priority_source"), Some(&1));
    assert_eq!(stats.remaining_daily_budget, 18);
    assert_eq!(stats.sample_rejected.len(), 4);
}

#[tokio::test]
async fn accepted_items_are_scored_and_normalized() {
    let raw = fixture_items().await;
    let mut filter = IngestionFilter::new(&IngestConfig::default()).unwrap();
    let (accepted, _) = filter.filter(&raw, now());

    let solar = &accepted[0];
    assert_eq!(solar.tickers, vec!["TAN", "ICLN", "LIT", "URA"]);
    assert_eq!(solar.keywords, vec!["solar", "battery", "clean energy"]);
    assert!((solar.relevance_score - 0.36).abs() < 1e-9);
    assert_eq!(solar.sentiment_score, 1.0);
    assert_eq!(solar.published_at.timezone(), chrono_tz::America::New_York);
    assert_eq!(solar.published_at.format("%H:%M").to_string(), "10:15");
    assert_eq!(solar.source_profile.priority, 5);
    assert_eq!(solar.hash_id.len(), 64);
}

#[tokio::test]
async fn filter_status_reflects_counters() {
    let raw = fixture_items().await;
    let mut filter = IngestionFilter::new(&IngestConfig::default()).unwrap();
    filter.filter(&raw, now());

    let status = filter.status();
    assert_eq!(status.daily_headline_count, 2);
    assert_eq!(status.max_daily_headlines, 20);
    assert_eq!(status.remaining_budget, 18);
    assert_eq!(status.tracked_tickers_count, 10);
    assert_eq!(status.keywords_count, 10);
    assert_eq!(status.processed_hashes_count, 2);
}
