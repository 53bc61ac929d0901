// src/ingest/dedup.rs
//! Duplicate detection for the ingestion filter.
//!
//! Two checks, in order:
//! - exact: content hash already accepted today
//! - near: a remembered title (within the time window) whose normalized
//!   Levenshtein similarity is at or above the threshold
//!
//! Only accepted items are remembered; the caller decides when that happens.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};

use crate::config::DedupConfig;

#[derive(Clone, Debug)]
struct SeenTitle {
    ts: DateTime<Utc>,
    text: String,
}

#[derive(Debug)]
pub struct DedupWindow {
    enabled: bool,
    similarity_threshold: f64,
    horizon: Duration,
    capacity: usize,
    hashes: HashSet<String>,
    window: VecDeque<SeenTitle>,
}

impl DedupWindow {
    pub fn new(cfg: &DedupConfig) -> Self {
        let capacity = cfg.recent_capacity.max(1);
        Self {
            enabled: cfg.enabled,
            similarity_threshold: cfg.similarity_threshold.clamp(0.0, 1.0),
            horizon: Duration::hours(cfg.window_hours.max(1)),
            capacity,
            hashes: HashSet::new(),
            window: VecDeque::with_capacity(capacity),
        }
    }

    /// True if the item repeats something already accepted.
    pub fn is_duplicate(&mut self, now: DateTime<Utc>, hash: &str, title: &str) -> bool {
        if !self.enabled {
            return false;
        }
        if self.hashes.contains(hash) {
            return true;
        }
        self.evict_old(now);

        let norm = normalize(title);
        self.window
            .iter()
            .rev()
            .any(|seen| strsim::normalized_levenshtein(&norm, &seen.text) >= self.similarity_threshold)
    }

    pub fn remember(&mut self, now: DateTime<Utc>, hash: &str, title: &str) {
        if !self.enabled {
            return;
        }
        self.hashes.insert(hash.to_string());
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(SeenTitle {
            ts: now,
            text: normalize(title),
        });
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
        self.window.clear();
    }

    pub fn hash_count(&self) -> usize {
        self.hashes.len()
    }

    pub fn recent_len(&self) -> usize {
        self.window.len()
    }

    fn evict_old(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.window.front() {
            if now - front.ts > self.horizon {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Lowercase + collapse whitespace before similarity.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 14, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn window() -> DedupWindow {
        DedupWindow::new(&DedupConfig::default())
    }

    #[test]
    fn exact_hash_is_duplicate() {
        let mut w = window();
        w.remember(ts(0), "h1", "Solar output hits record");
        assert!(w.is_duplicate(ts(1), "h1", "completely different"));
    }

    #[test]
    fn near_title_is_duplicate() {
        let mut w = window();
        w.remember(ts(0), "h1", "Solar output hits record high in Texas");
        assert!(w.is_duplicate(ts(5), "h2", "Solar output hits record highs in Texas"));
        assert!(!w.is_duplicate(ts(5), "h3", "Uranium miners slide on supply news"));
    }

    #[test]
    fn old_titles_are_forgotten_but_hashes_stay() {
        let mut w = window();
        w.remember(ts(0), "h1", "Solar output hits record high in Texas");
        let later = ts(25 * 60);
        assert!(!w.is_duplicate(later, "h2", "Solar output hits record high in Texas!"));
        assert!(w.is_duplicate(later, "h1", "anything"));
        assert_eq!(w.recent_len(), 0);
    }

    #[test]
    fn capacity_bounds_the_window() {
        let cfg = DedupConfig {
            recent_capacity: 2,
            ..DedupConfig::default()
        };
        let mut w = DedupWindow::new(&cfg);
        w.remember(ts(0), "a", "first headline about lithium");
        w.remember(ts(1), "b", "second headline about uranium");
        w.remember(ts(2), "c", "third headline about robotics");
        assert_eq!(w.recent_len(), 2);
        assert!(!w.is_duplicate(ts(3), "d", "first headline about lithium"));
    }

    #[test]
    fn disabled_never_blocks() {
        let cfg = DedupConfig {
            enabled: false,
            ..DedupConfig::default()
        };
        let mut w = DedupWindow::new(&cfg);
        w.remember(ts(0), "h", "t");
        assert!(!w.is_duplicate(ts(0), "h", "t"));
    }
}
