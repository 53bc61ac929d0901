// src/ingest/score.rs
use std::collections::HashSet;

/// Lexicon-hit sentiment: `(pos - neg) / (pos + neg)`, 0 when nothing matched.
#[derive(Debug, Clone)]
pub struct SentimentLexicon {
    positive: HashSet<String>,
    negative: HashSet<String>,
}

impl SentimentLexicon {
    pub fn new(positive: &[String], negative: &[String]) -> Self {
        let lower = |v: &[String]| -> HashSet<String> {
            v.iter()
                .map(|w| w.trim().to_ascii_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            positive: lower(positive),
            negative: lower(negative),
        }
    }

    /// Returns (score, positive hits, negative hits).
    pub fn score_text(&self, text: &str) -> (f64, usize, usize) {
        let mut pos = 0usize;
        let mut neg = 0usize;
        for tok in tokenize(text) {
            if self.positive.contains(&tok) {
                pos += 1;
            } else if self.negative.contains(&tok) {
                neg += 1;
            }
        }
        let total = pos + neg;
        if total == 0 {
            return (0.0, 0, 0);
        }
        ((pos as f64 - neg as f64) / total as f64, pos, neg)
    }
}

/// Alphanumeric lowercase tokens.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

/// Weighted ticker/keyword count normalized into [0,1] by a saturation ceiling.
pub fn relevance_score(
    tickers: usize,
    keywords: usize,
    ticker_weight: f64,
    keyword_weight: f64,
    saturation: f64,
) -> f64 {
    if saturation <= 0.0 {
        return 0.0;
    }
    let raw = tickers as f64 * ticker_weight + keywords as f64 * keyword_weight;
    (raw / saturation).clamp(0.0, 1.0)
}
