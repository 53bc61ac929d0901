// tests/memory_patterns.rs
//
// Signal memory against an in-memory store: persistence, pattern detection,
// contextual insight and retention cleanup.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use news_signal_pipeline::config::MemoryConfig;
use news_signal_pipeline::memory::{PatternDetail, SignalMemory};
use news_signal_pipeline::signal::{Direction, Signal};
use news_signal_pipeline::store::Store;

const TZ: Tz = chrono_tz::America::New_York;

/// 15:00 UTC on `day` (10:00 New York).
fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, d, 15, 0, 0).unwrap()
}

fn sig(ts: DateTime<Utc>, dir: Direction, conf: u8, etf: &str) -> Signal {
    Signal::new(ts, TZ, dir, conf, vec![etf.to_string()], format!("{dir} call on {etf}"))
}

async fn memory() -> (Store, SignalMemory) {
    let store = Store::in_memory().await.unwrap();
    let mem = SignalMemory::new(store.clone(), &MemoryConfig::default(), TZ);
    (store, mem)
}

#[tokio::test]
async fn three_day_bearish_streak_is_one_pattern() {
    let (store, mem) = memory().await;
    for (d, conf) in [(1, 7), (2, 8), (3, 9)] {
        mem.store_signal(&sig(day(d), Direction::Bearish, conf, "TAN")).await.unwrap();
    }

    let found = mem.detect_patterns(Some("TAN"), day(4)).await.unwrap();
    assert_eq!(found.len(), 1);
    let p = &found[0];
    assert_eq!(p.kind(), "consecutive");
    assert_eq!(
        p.detail,
        PatternDetail::Consecutive {
            direction: Direction::Bearish,
            streak: 3,
            average_confidence: 8.0,
        }
    );
    assert_eq!(p.start_date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    assert_eq!(p.end_date, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
    assert!(p.description.contains("3 consecutive bearish alerts with high confidence"));

    // detected patterns are recorded
    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patterns")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn reversal_needs_confidence_on_both_sides() {
    let (_store, mem) = memory().await;
    mem.store_signal(&sig(day(1), Direction::Bearish, 7, "LIT")).await.unwrap();
    mem.store_signal(&sig(day(2), Direction::Bullish, 8, "LIT")).await.unwrap();
    mem.store_signal(&sig(day(1), Direction::Bearish, 5, "URA")).await.unwrap();
    mem.store_signal(&sig(day(2), Direction::Bullish, 8, "URA")).await.unwrap();

    let lit = mem.detect_patterns(Some("LIT"), day(3)).await.unwrap();
    assert_eq!(lit.len(), 1);
    assert_eq!(lit[0].kind(), "reversal");
    assert!(lit[0].description.contains("reversed from bearish to bullish"));
    assert!((lit[0].strength - 0.7).abs() < 1e-9);

    assert!(mem.detect_patterns(Some("URA"), day(3)).await.unwrap().is_empty());
}

#[tokio::test]
async fn alternating_calls_read_as_volatility() {
    let (_store, mem) = memory().await;
    let dirs = [Direction::Bullish, Direction::Bearish, Direction::Bullish, Direction::Bearish];
    for (i, d) in dirs.into_iter().enumerate() {
        mem.store_signal(&sig(day(i as u32 + 1), d, 5, "XLE")).await.unwrap();
    }

    let found = mem.detect_patterns(None, day(5)).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].etf, "XLE");
    assert_eq!(found[0].detail, PatternDetail::Volatility { changes: 3, window: 4 });
}

#[tokio::test]
async fn insight_includes_bias_and_respects_direction() {
    let (_store, mem) = memory().await;
    for d in 1..=3 {
        mem.store_signal(&sig(day(d), Direction::Bullish, 8, "QQQ")).await.unwrap();
    }
    let etfs = vec!["QQQ".to_string()];

    let any = mem.contextual_insight(None, &etfs, day(4)).await.unwrap().unwrap();
    assert!(any.contains("sustained 3 consecutive bullish alerts"));
    assert!(any.contains("QQQ has been predominantly bullish this week (3/3 signals)."));

    let opposed = mem
        .contextual_insight(Some(Direction::Bearish), &etfs, day(4))
        .await
        .unwrap()
        .unwrap();
    assert!(!opposed.contains("consecutive"));
    assert!(opposed.contains("predominantly bullish"));

    let none = mem
        .contextual_insight(None, &["ICLN".to_string()], day(4))
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn stored_signals_come_back_newest_first() {
    let (_store, mem) = memory().await;
    let mut first = sig(day(2), Direction::Bullish, 7, "TAN");
    first.batch_id = Some("ticker_TAN_1_1".into());
    first.price_snapshot.insert("TAN".into(), 41.25);
    let id = mem.store_signal(&first).await.unwrap();
    mem.store_signal(&sig(day(3), Direction::Neutral, 4, "TAN")).await.unwrap();

    let recent = mem.get_recent_signals(7, day(4)).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].direction, Direction::Neutral);
    assert_eq!(recent[1].id, Some(id));
    assert_eq!(recent[1].batch_id.as_deref(), Some("ticker_TAN_1_1"));
    assert_eq!(recent[1].price_snapshot.get("TAN"), Some(&41.25));

    // a one-day window from the 4th reaches back to the 3rd only
    assert_eq!(mem.get_recent_signals(1, day(4)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stats_count_by_direction() {
    let (_store, mem) = memory().await;
    mem.store_signal(&sig(day(1), Direction::Bearish, 7, "TAN")).await.unwrap();
    mem.store_signal(&sig(day(2), Direction::Bearish, 6, "LIT")).await.unwrap();
    mem.store_signal(&sig(day(3), Direction::Bullish, 9, "URA")).await.unwrap();

    let stats = mem.memory_stats(day(4)).await.unwrap();
    assert_eq!(stats.total_signals, 3);
    assert_eq!(stats.signal_breakdown.get("Bearish"), Some(&2));
    assert_eq!(stats.signal_breakdown.get("Bullish"), Some(&1));
    assert_eq!(stats.recent_signals, 3);
    assert_eq!(stats.first_date.as_deref(), Some("2025-03-01"));
    assert_eq!(stats.last_date.as_deref(), Some("2025-03-03"));
}

#[tokio::test]
async fn cleanup_drops_only_expired_rows_and_is_repeatable() {
    let (_store, mem) = memory().await;
    let now = day(20);
    mem.store_signal(&sig(now - Duration::days(120), Direction::Bearish, 7, "TAN"))
        .await
        .unwrap();
    mem.store_signal(&sig(now - Duration::days(2), Direction::Bullish, 8, "TAN"))
        .await
        .unwrap();

    let first = mem.cleanup(now).await.unwrap();
    assert_eq!(first.deleted_signals, 1);
    assert_eq!(first.cutoff_date, now.with_timezone(&TZ).date_naive() - Duration::days(90));

    let second = mem.cleanup(now).await.unwrap();
    assert_eq!(second.deleted_signals, 0);
    assert_eq!(second.deleted_patterns, 0);
    assert_eq!(mem.memory_stats(now).await.unwrap().total_signals, 1);
}
