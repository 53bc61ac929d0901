// src/ingest/types.rs
use anyhow::Result;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::SourceProfile;
use crate::error::IngestError;

/// A news item exactly as the source collaborator hands it over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RawNewsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "description", alias = "summary", alias = "body")]
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    /// ISO-8601 / RFC 3339 / RFC 2822; a missing offset means the reference timezone.
    #[serde(default)]
    pub published_at: Option<String>,
}

/// A raw item that passed normalization and scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub content: String,
    pub source: String,
    pub url: String,
    /// Always expressed in the reference timezone.
    #[serde(with = "zoned_time")]
    pub published_at: DateTime<Tz>,
    /// SHA-256 of title + content; exact-duplicate identity.
    pub hash_id: String,
    /// Ordered by first occurrence in the text.
    pub tickers: Vec<String>,
    pub keywords: Vec<String>,
    pub source_profile: SourceProfile,
    /// [0, 1]
    pub relevance_score: f64,
    /// [-1, 1]
    pub sentiment_score: f64,
}

impl NewsItem {
    pub fn source_weight(&self) -> f64 {
        self.source_profile.weight()
    }
}

/// `DateTime<Tz>` as an offset timestamp plus its IANA zone name.
mod zoned_time {
    use chrono::{DateTime, FixedOffset};
    use chrono_tz::Tz;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Zoned {
        at: DateTime<FixedOffset>,
        tz: Tz,
    }

    pub fn serialize<S: Serializer>(t: &DateTime<Tz>, s: S) -> Result<S::Ok, S::Error> {
        Zoned {
            at: t.fixed_offset(),
            tz: t.timezone(),
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Tz>, D::Error> {
        let z = Zoned::deserialize(d)?;
        Ok(z.at.with_timezone(&z.tz))
    }
}

/// Why an item was dropped. `code()` is the stable label used in stats and metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    OutsideMarketHours,
    DuplicateContent,
    LowRelevanceScore { score: f64 },
    WeakSentiment { strength: f64 },
    InsufficientTickers { count: usize },
    NoRelevantKeywords,
    InsufficientContent,
    LowQualitySource,
    LowPrioritySource { priority: u8 },
    DailyLimitReached,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutsideMarketHours => "outside_market_hours",
            Self::DuplicateContent => "duplicate_content",
            Self::LowRelevanceScore { .. } => "low_relevance_score",
            Self::WeakSentiment { .. } => "weak_sentiment",
            Self::InsufficientTickers { .. } => "insufficient_tickers",
            Self::NoRelevantKeywords => "no_relevant_keywords",
            Self::InsufficientContent => "insufficient_content",
            Self::LowQualitySource => "low_quality_source",
            Self::LowPrioritySource { .. } => "low_priority_source",
            Self::DailyLimitReached => "daily_limit_reached",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowRelevanceScore { score } => write!(f, "{} ({score:.2})", self.code()),
            Self::WeakSentiment { strength } => write!(f, "{} ({strength:.2})", self.code()),
            Self::InsufficientTickers { count } => write!(f, "{} ({count})", self.code()),
            Self::LowPrioritySource { priority } => write!(f, "{} ({priority})", self.code()),
            _ => f.write_str(self.code()),
        }
    }
}

/// Snapshot of a rejected item, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub title: String,
    pub source: String,
    pub tickers: Vec<String>,
    pub keywords: Vec<String>,
    pub relevance_score: f64,
    pub sentiment_score: f64,
    pub reason: RejectReason,
}

/// Per-item result of the ingestion filter.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Accepted(NewsItem),
    Rejected(Rejection),
    Errored { title: String, cause: IngestError },
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawNewsItem>>;
    fn name(&self) -> &'static str;
}
