// src/signal.rs
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Directional assessment of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "Bullish",
            Self::Bearish => "Bearish",
            Self::Neutral => "Neutral",
        }
    }

    /// Bullish ↔ Bearish.
    pub fn opposes(self, other: Direction) -> bool {
        matches!(
            (self, other),
            (Self::Bullish, Self::Bearish) | (Self::Bearish, Self::Bullish)
        )
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Self::Bullish => "↗",
            Self::Bearish => "↘",
            Self::Neutral => "→",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" | "buy" | "long" => Ok(Self::Bullish),
            "bearish" | "sell" | "short" => Ok(Self::Bearish),
            "neutral" | "hold" => Ok(Self::Neutral),
            other => Err(format!("unknown direction `{other}`")),
        }
    }
}

/// Price per instrument at signal time.
pub type PriceSnapshot = BTreeMap<String, f64>;

/// A stored trading signal. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    /// Row id; `None` until stored.
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    /// Calendar date of `timestamp` in the reference timezone.
    pub date: NaiveDate,
    pub direction: Direction,
    /// 1..=10
    pub confidence: u8,
    pub etfs: Vec<String>,
    pub reasoning: String,
    pub title: String,
    pub sector: String,
    pub market_impact: String,
    pub strategic_advice: String,
    pub coaching_tone: String,
    pub risk_factors: String,
    pub opportunity_thesis: String,
    pub article_url: String,
    pub batch_id: Option<String>,
    pub price_snapshot: PriceSnapshot,
}

impl Signal {
    /// Minimal signal at `timestamp`; the date is taken in `tz`.
    pub fn new(
        timestamp: DateTime<Utc>,
        tz: Tz,
        direction: Direction,
        confidence: u8,
        etfs: Vec<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            timestamp,
            date: timestamp.with_timezone(&tz).date_naive(),
            direction,
            confidence: confidence.clamp(1, 10),
            etfs,
            reasoning: reasoning.into(),
            title: String::new(),
            sector: String::new(),
            market_impact: String::new(),
            strategic_advice: String::new(),
            coaching_tone: String::new(),
            risk_factors: String::new(),
            opportunity_thesis: String::new(),
            article_url: String::new(),
            batch_id: None,
            price_snapshot: PriceSnapshot::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn involves(&self, etf: &str) -> bool {
        self.etfs.iter().any(|e| e == etf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn direction_parsing_is_lenient() {
        assert_eq!("BULLISH".parse::<Direction>().unwrap(), Direction::Bullish);
        assert_eq!(" bearish ".parse::<Direction>().unwrap(), Direction::Bearish);
        assert!("sideways".parse::<Direction>().is_err());
        assert!(Direction::Bullish.opposes(Direction::Bearish));
        assert!(!Direction::Neutral.opposes(Direction::Bearish));
    }

    #[test]
    fn date_follows_reference_timezone() {
        // 02:00 UTC is still the previous evening in New York
        let ts = Utc.with_ymd_and_hms(2025, 3, 5, 2, 0, 0).unwrap();
        let s = Signal::new(ts, chrono_tz::America::New_York, Direction::Bullish, 12, vec![], "r");
        assert_eq!(s.date, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        assert_eq!(s.confidence, 10);
    }
}
