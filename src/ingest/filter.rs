// src/ingest/filter.rs
//! Ingestion filter: raw items → scored, deduplicated, budgeted `NewsItem`s.
//!
//! Filters run in a fixed order and stop at the first failure:
//! market hours → duplicate → relevance → sentiment strength → ticker/keyword
//! coverage → content length → low-quality source → source priority.
//! The daily accepted-item budget is checked before anything else.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::dedup::DedupWindow;
use super::score::{relevance_score, SentimentLexicon};
use super::types::{ItemOutcome, NewsItem, RawNewsItem, RejectReason, Rejection};
use super::vocab::VocabMatcher;
use super::{content_hash, normalize_text, parse_published_at, title_prefix};
use crate::config::IngestConfig;
use crate::error::IngestError;

const MAX_TITLE_CHARS: usize = 500;
const MAX_CONTENT_CHARS: usize = 8_000;
const MAX_SAMPLES: usize = 5;
const LOG_PREFIX_CHARS: usize = 60;
const SAMPLE_PREFIX_CHARS: usize = 80;

/// Per-call filtering statistics.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FilterStats {
    pub total_received: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Rejection count per reason code.
    pub reasons: BTreeMap<String, usize>,
    pub errored: usize,
    pub sample_rejected: Vec<Rejection>,
    pub remaining_daily_budget: u32,
}

/// Snapshot of the filter's in-process counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FilterStatus {
    pub day: Option<NaiveDate>,
    pub daily_headline_count: u32,
    pub max_daily_headlines: u32,
    pub remaining_budget: u32,
    pub tracked_tickers_count: usize,
    pub keywords_count: usize,
    pub processed_hashes_count: usize,
    pub recent_titles_count: usize,
}

#[derive(Debug)]
pub struct IngestionFilter {
    cfg: IngestConfig,
    market_window: (NaiveTime, NaiveTime),
    vocab: VocabMatcher,
    lexicon: SentimentLexicon,
    dedup: DedupWindow,
    day: Option<NaiveDate>,
    daily_count: u32,
}

impl IngestionFilter {
    pub fn new(cfg: &IngestConfig) -> Result<Self> {
        Ok(Self {
            market_window: cfg.market_hours.window()?,
            vocab: VocabMatcher::new(&cfg.tracked_tickers, &cfg.keywords)?,
            lexicon: SentimentLexicon::new(&cfg.positive_words, &cfg.negative_words),
            dedup: DedupWindow::new(&cfg.dedup),
            cfg: cfg.clone(),
            day: None,
            daily_count: 0,
        })
    }

    /// Filter a sequence of raw items observed at `now`.
    ///
    /// Malformed items are counted and skipped; nothing here aborts the batch.
    pub fn filter(&mut self, raw: &[RawNewsItem], now: DateTime<Utc>) -> (Vec<NewsItem>, FilterStats) {
        let mut accepted = Vec::new();
        let mut stats = FilterStats {
            total_received: raw.len(),
            ..FilterStats::default()
        };

        for item in raw {
            match self.evaluate(item, now) {
                ItemOutcome::Accepted(news) => {
                    debug!(
                        title = %title_prefix(&news.title, LOG_PREFIX_CHARS),
                        tickers = ?news.tickers,
                        relevance = news.relevance_score,
                        "accepted"
                    );
                    accepted.push(news);
                }
                ItemOutcome::Rejected(rej) => {
                    debug!(
                        title = %title_prefix(&rej.title, LOG_PREFIX_CHARS),
                        reason = %rej.reason,
                        relevance = rej.relevance_score,
                        tickers = ?rej.tickers,
                        "filtered"
                    );
                    counter!("ingest_rejected_total", "reason" => rej.reason.code()).increment(1);
                    stats.rejected += 1;
                    *stats.reasons.entry(rej.reason.code().to_string()).or_insert(0) += 1;
                    if stats.sample_rejected.len() < MAX_SAMPLES {
                        let mut sample = rej;
                        sample.title = title_prefix(&sample.title, SAMPLE_PREFIX_CHARS);
                        stats.sample_rejected.push(sample);
                    }
                }
                ItemOutcome::Errored { title, cause } => {
                    warn!(title = %title_prefix(&title, LOG_PREFIX_CHARS), error = %cause, "malformed news item skipped");
                    counter!("ingest_errored_total").increment(1);
                    stats.errored += 1;
                }
            }
        }

        stats.accepted = accepted.len();
        stats.remaining_daily_budget = self.remaining();
        counter!("ingest_items_total").increment(raw.len() as u64);
        counter!("ingest_accepted_total").increment(accepted.len() as u64);

        info!(
            accepted = stats.accepted,
            received = stats.total_received,
            rejected = stats.rejected,
            errored = stats.errored,
            remaining = stats.remaining_daily_budget,
            "news filtering complete"
        );
        (accepted, stats)
    }

    /// Evaluate one raw item. Accepted items count against the daily budget and
    /// are remembered for duplicate detection.
    pub fn evaluate(&mut self, raw: &RawNewsItem, now: DateTime<Utc>) -> ItemOutcome {
        self.roll_day(now);

        if self.daily_count >= self.cfg.max_daily_headlines {
            return ItemOutcome::Rejected(Rejection {
                title: raw.title.trim().to_string(),
                source: raw.source.trim().to_string(),
                tickers: Vec::new(),
                keywords: Vec::new(),
                relevance_score: 0.0,
                sentiment_score: 0.0,
                reason: RejectReason::DailyLimitReached,
            });
        }

        let news = match self.build_item(raw, now) {
            Ok(n) => n,
            Err(cause) => {
                return ItemOutcome::Errored {
                    title: raw.title.clone(),
                    cause,
                }
            }
        };

        if let Some(reason) = self.first_failure(&news, now) {
            return ItemOutcome::Rejected(Rejection {
                title: news.title,
                source: news.source,
                tickers: news.tickers,
                keywords: news.keywords,
                relevance_score: news.relevance_score,
                sentiment_score: news.sentiment_score,
                reason,
            });
        }

        self.dedup.remember(now, &news.hash_id, &news.title);
        self.daily_count += 1;
        ItemOutcome::Accepted(news)
    }

    /// Raise the in-process daily count to what the durable store has recorded,
    /// so overlapping processes share one headline budget.
    pub fn sync_daily_count(&mut self, persisted: u32, now: DateTime<Utc>) {
        self.roll_day(now);
        if persisted > self.daily_count {
            debug!(persisted, local = self.daily_count, "daily headline count synced from store");
            self.daily_count = persisted;
        }
    }

    pub fn status(&self) -> FilterStatus {
        FilterStatus {
            day: self.day,
            daily_headline_count: self.daily_count,
            max_daily_headlines: self.cfg.max_daily_headlines,
            remaining_budget: self.remaining(),
            tracked_tickers_count: self.vocab.ticker_count(),
            keywords_count: self.vocab.keyword_count(),
            processed_hashes_count: self.dedup.hash_count(),
            recent_titles_count: self.dedup.recent_len(),
        }
    }

    pub fn daily_count(&self) -> u32 {
        self.daily_count
    }

    pub fn remaining(&self) -> u32 {
        self.cfg.max_daily_headlines.saturating_sub(self.daily_count)
    }

    /// Reset counters when the local date (reference timezone) changes.
    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.with_timezone(&self.cfg.timezone).date_naive();
        match self.day {
            Some(d) if d >= today => {}
            Some(_) => {
                info!(day = %today, "daily news counters reset");
                self.day = Some(today);
                self.daily_count = 0;
                self.dedup.clear();
            }
            None => self.day = Some(today),
        }
    }

    fn build_item(&self, raw: &RawNewsItem, now: DateTime<Utc>) -> Result<NewsItem, IngestError> {
        let title = normalize_text(&raw.title, MAX_TITLE_CHARS);
        if title.is_empty() {
            return Err(IngestError::MissingField("title"));
        }
        let content = normalize_text(&raw.content, MAX_CONTENT_CHARS);
        let source = match raw.source.trim() {
            "" => "unknown".to_string(),
            s => s.to_string(),
        };
        let published_at = parse_published_at(raw.published_at.as_deref(), self.cfg.timezone, now)?;

        let full_text = format!("{title} {content}");
        let tickers = self.vocab.tickers_in(&full_text);
        let keywords = self.vocab.keywords_in(&full_text);
        let th = &self.cfg.thresholds;
        let relevance = relevance_score(
            tickers.len(),
            keywords.len(),
            th.ticker_weight,
            th.keyword_weight,
            th.relevance_saturation,
        );
        let (sentiment, _, _) = self.lexicon.score_text(&full_text);

        Ok(NewsItem {
            hash_id: content_hash(&title, &content),
            source_profile: self.cfg.sources.lookup(&source),
            title,
            content,
            source,
            url: raw.url.trim().to_string(),
            published_at,
            tickers,
            keywords,
            relevance_score: relevance,
            sentiment_score: sentiment,
        })
    }

    fn first_failure(&mut self, n: &NewsItem, now: DateTime<Utc>) -> Option<RejectReason> {
        // (a) market hours
        if self.cfg.market_hours.enabled {
            let t = n.published_at.time();
            let (start, end) = self.market_window;
            if t < start || t > end {
                return Some(RejectReason::OutsideMarketHours);
            }
        }

        // (b) exact or near duplicate
        if self.dedup.is_duplicate(now, &n.hash_id, &n.title) {
            return Some(RejectReason::DuplicateContent);
        }

        let th = &self.cfg.thresholds;

        // (c) relevance; nothing matched at all is reported as missing keywords
        if n.tickers.is_empty() && n.keywords.is_empty() {
            return Some(RejectReason::NoRelevantKeywords);
        }
        if n.relevance_score < th.min_relevance_score {
            return Some(RejectReason::LowRelevanceScore {
                score: n.relevance_score,
            });
        }

        // (d) sentiment strength, only when sentiment is present
        let strength = n.sentiment_score.abs();
        if strength > 0.0 && strength < th.min_sentiment_strength {
            return Some(RejectReason::WeakSentiment { strength });
        }

        // (e) coverage
        if n.tickers.len() < th.min_ticker_count {
            return Some(RejectReason::InsufficientTickers {
                count: n.tickers.len(),
            });
        }
        if n.keywords.is_empty() && n.tickers.len() < 2 {
            return Some(RejectReason::NoRelevantKeywords);
        }

        // (f) content length
        if n.title.chars().count() < th.min_title_len || n.content.chars().count() < th.min_body_len {
            return Some(RejectReason::InsufficientContent);
        }

        // (g) low-quality source
        let sources = &self.cfg.sources;
        if sources.is_low_quality(&n.source) {
            return Some(RejectReason::LowQualitySource);
        }

        // (h) source priority
        if sources.validation_enabled && n.source_profile.priority < sources.min_priority {
            return Some(RejectReason::LowPrioritySource {
                priority: n.source_profile.priority,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg() -> IngestConfig {
        let mut c = IngestConfig::default();
        c.thresholds.min_relevance_score = 0.1;
        c
    }

    // 10:00 New York (EST)
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap()
    }

    fn raw(title: &str, content: &str) -> RawNewsItem {
        RawNewsItem {
            title: title.into(),
            content: content.into(),
            source: "Reuters".into(),
            url: "https://example.com/a".into(),
            published_at: Some("2025-03-04T10:00:00".into()),
        }
    }

    #[test]
    fn relevant_item_is_accepted_with_scores() {
        let mut f = IngestionFilter::new(&cfg()).unwrap();
        let out = f.evaluate(
            &raw(
                "TAN and ICLN rally as solar demand grows",
                "Solar installers see strong growth in clean energy orders this quarter.",
            ),
            now(),
        );
        let n = match out {
            ItemOutcome::Accepted(n) => n,
            other => panic!("expected accepted, got {other:?}"),
        };
        assert_eq!(n.tickers, vec!["TAN", "ICLN"]);
        assert_eq!(n.keywords, vec!["solar", "clean energy"]);
        assert!(n.sentiment_score > 0.0);
        assert_eq!(n.source_profile.priority, 5);
        assert_eq!(f.daily_count(), 1);
    }

    #[test]
    fn outside_market_hours_is_rejected() {
        let mut f = IngestionFilter::new(&cfg()).unwrap();
        let mut r = raw("TAN and ICLN rally on solar", "Solar names extend their rally after hours today.");
        r.published_at = Some("2025-03-04T18:30:00".into());
        match f.evaluate(&r, now()) {
            ItemOutcome::Rejected(rej) => assert_eq!(rej.reason, RejectReason::OutsideMarketHours),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_title_is_errored() {
        let mut f = IngestionFilter::new(&cfg()).unwrap();
        match f.evaluate(&raw("   ", "body"), now()) {
            ItemOutcome::Errored { cause, .. } => assert_eq!(cause, IngestError::MissingField("title")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sync_only_raises_the_count() {
        let mut f = IngestionFilter::new(&cfg()).unwrap();
        f.sync_daily_count(7, now());
        assert_eq!(f.daily_count(), 7);
        f.sync_daily_count(3, now());
        assert_eq!(f.daily_count(), 7);
        assert_eq!(f.status().remaining_budget, 13);
    }
}
