//! # Source reliability table
//!
//! Maps news outlets (e.g. "Reuters", "Seeking Alpha") to a priority in `1..=5`
//! and a category that scales the priority into a source weight.
//!
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - Aliases map alternative spellings/domains to canonical outlet names.
//! - Fallback order: aliases → exact match → substring match → defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Editorial category of a source; scales its priority into a weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Financial,
    Tech,
    General,
    Blog,
    Social,
}

impl SourceCategory {
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Financial => 1.2,
            Self::Tech => 1.1,
            Self::General => 1.0,
            Self::Blog => 0.8,
            Self::Social => 0.6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Financial => "financial",
            Self::Tech => "tech",
            Self::General => "general",
            Self::Blog => "blog",
            Self::Social => "social",
        }
    }
}

/// Resolved reliability of one source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub priority: u8,
    pub category: SourceCategory,
}

impl SourceProfile {
    pub fn weight(&self) -> f64 {
        f64::from(self.priority) * self.category.multiplier()
    }
}

/// `[ingest.sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceTable {
    /// When false, the minimum-priority filter is skipped.
    pub validation_enabled: bool,
    pub min_priority: u8,
    pub default_priority: u8,
    pub default_category: SourceCategory,
    pub priorities: HashMap<String, u8>,
    pub categories: HashMap<String, SourceCategory>,
    /// Non-canonical name → canonical name.
    pub aliases: HashMap<String, String>,
    /// Substrings that mark a source as low quality.
    pub low_quality_markers: Vec<String>,
}

impl Default for SourceTable {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceTable {
    /// Resolve priority and category for a source name.
    pub fn lookup(&self, source: &str) -> SourceProfile {
        let s = normalize(source);
        let canon = self
            .aliases
            .iter()
            .find(|(alias, _)| normalize(alias) == s)
            .map(|(_, c)| normalize(c))
            .unwrap_or(s);

        let priority = find_entry(&self.priorities, &canon)
            .copied()
            .unwrap_or(self.default_priority)
            .clamp(1, 5);
        let category = find_entry(&self.categories, &canon)
            .copied()
            .unwrap_or(self.default_category);

        SourceProfile { priority, category }
    }

    /// True if the source name contains any configured low-quality marker.
    pub fn is_low_quality(&self, source: &str) -> bool {
        let s = source.to_ascii_lowercase();
        self.low_quality_markers
            .iter()
            .any(|m| !m.is_empty() && s.contains(&m.to_ascii_lowercase()))
    }

    /// Built-in table with common financial and tech outlets.
    pub(crate) fn default_seed() -> Self {
        let mut priorities = HashMap::new();
        let mut categories = HashMap::new();
        let mut aliases = HashMap::new();

        for (name, prio, cat) in [
            ("reuters", 5, SourceCategory::Financial),
            ("bloomberg", 5, SourceCategory::Financial),
            ("financial times", 5, SourceCategory::Financial),
            ("wall street journal", 5, SourceCategory::Financial),
            ("cnbc", 4, SourceCategory::Financial),
            ("marketwatch", 4, SourceCategory::Financial),
            ("barrons", 4, SourceCategory::Financial),
            ("yahoo finance", 3, SourceCategory::Financial),
            ("seeking alpha", 3, SourceCategory::Financial),
            ("benzinga", 3, SourceCategory::Financial),
            ("techcrunch", 3, SourceCategory::Tech),
            ("ars technica", 2, SourceCategory::Tech),
            ("the verge", 2, SourceCategory::Tech),
            ("medium", 1, SourceCategory::Blog),
            ("reddit", 1, SourceCategory::Social),
        ] {
            priorities.insert(name.to_string(), prio);
            categories.insert(name.to_string(), cat);
        }

        for (a, c) in [
            ("reuters.com", "reuters"),
            ("bloomberg news", "bloomberg"),
            ("ft", "financial times"),
            ("ft.com", "financial times"),
            ("wsj", "wall street journal"),
            ("the wall street journal", "wall street journal"),
            ("market watch", "marketwatch"),
            ("yahoo", "yahoo finance"),
            ("finance.yahoo.com", "yahoo finance"),
            ("seekingalpha", "seeking alpha"),
            ("barron's", "barrons"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            validation_enabled: true,
            min_priority: 2,
            default_priority: 1,
            default_category: SourceCategory::General,
            priorities,
            categories,
            aliases,
            low_quality_markers: vec!["spam".into(), "clickbait".into(), "fake".into()],
        }
    }
}

/// Exact match on the normalized key first, then substring fallback
/// (e.g. "Reuters Breakingviews" → "reuters").
fn find_entry<'a, V>(map: &'a HashMap<String, V>, canon: &str) -> Option<&'a V> {
    if let Some((_, v)) = map.iter().find(|(k, _)| normalize(k) == canon) {
        return Some(v);
    }
    map.iter()
        .filter(|(k, _)| {
            let k = normalize(k);
            !k.is_empty() && canon.contains(&k)
        })
        // longest key wins so "yahoo finance" beats a hypothetical "yahoo"
        .max_by_key(|(k, _)| k.len())
        .map(|(_, v)| v)
}

/// Lowercase, replace punctuation/dashes with spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_ascii_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['\n', '\r', '\t', ',', '’'], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
