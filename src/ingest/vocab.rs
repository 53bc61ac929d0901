// src/ingest/vocab.rs
//! Ticker and keyword matching against the configured vocabulary.
//!
//! Tickers are case-sensitive symbols with an optional `$` prefix and possessive
//! or plural suffix (`$TAN`, `ICLN's`). Keywords are case-insensitive and accept
//! simple morphological variants: space/hyphen interchange and a plural tail
//! (`electric-vehicles`, `batteries`).

use anyhow::{Context, Result};
use regex::Regex;

/// One compiled vocabulary entry.
#[derive(Debug, Clone)]
struct Term {
    name: String,
    re: Regex,
}

#[derive(Debug, Clone)]
pub struct VocabMatcher {
    tickers: Vec<Term>,
    keywords: Vec<Term>,
}

impl VocabMatcher {
    pub fn new(tickers: &[String], keywords: &[String]) -> Result<Self> {
        let tickers = tickers
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| {
                let re = Regex::new(&ticker_pattern(t))
                    .with_context(|| format!("ticker pattern for `{t}`"))?;
                Ok(Term {
                    name: t.to_string(),
                    re,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let keywords = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| {
                let re = Regex::new(&keyword_pattern(k))
                    .with_context(|| format!("keyword pattern for `{k}`"))?;
                Ok(Term {
                    name: k.to_ascii_lowercase(),
                    re,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { tickers, keywords })
    }

    /// Matched tickers in order of first occurrence.
    pub fn tickers_in(&self, text: &str) -> Vec<String> {
        first_occurrence_order(&self.tickers, text)
    }

    /// Matched keywords (canonical lowercase form) in order of first occurrence.
    pub fn keywords_in(&self, text: &str) -> Vec<String> {
        first_occurrence_order(&self.keywords, text)
    }

    pub fn ticker_count(&self) -> usize {
        self.tickers.len()
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }
}

fn first_occurrence_order(terms: &[Term], text: &str) -> Vec<String> {
    let mut hits: Vec<(usize, &str)> = terms
        .iter()
        .filter_map(|t| t.re.find(text).map(|m| (m.start(), t.name.as_str())))
        .collect();
    hits.sort_by_key(|(pos, _)| *pos);

    let mut out: Vec<String> = Vec::with_capacity(hits.len());
    for (_, name) in hits {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

fn ticker_pattern(ticker: &str) -> String {
    format!(r"(?:\$|\b){}(?:'s|s)?\b", regex::escape(ticker))
}

fn keyword_pattern(keyword: &str) -> String {
    let words: Vec<String> = keyword
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect();

    let last = words.len().saturating_sub(1);
    let parts: Vec<String> = words
        .iter()
        .enumerate()
        .map(|(i, w)| if i == last { plural_variant(w) } else { regex::escape(w) })
        .collect();

    format!(r"(?i)\b{}\b", parts.join(r"[\s\-]+"))
}

/// `battery` → `batter(?:y|ies)`, `solar` → `solar(?:s|es)?`
fn plural_variant(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.is_empty() && !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{}(?:y|ies)", regex::escape(stem));
        }
    }
    format!("{}(?:s|es)?", regex::escape(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> VocabMatcher {
        VocabMatcher::new(
            &["TAN".into(), "ICLN".into(), "LIT".into()],
            &["electric vehicle".into(), "battery".into(), "solar".into()],
        )
        .unwrap()
    }

    #[test]
    fn tickers_are_case_sensitive_and_word_bounded() {
        let m = matcher();
        assert_eq!(m.tickers_in("$TAN and ICLN's rally"), vec!["TAN", "ICLN"]);
        assert!(m.tickers_in("tan lines and a LITANY of complaints").is_empty());
    }

    #[test]
    fn keywords_accept_plural_and_hyphen_variants() {
        let m = matcher();
        assert_eq!(
            m.keywords_in("Electric-vehicles need batteries"),
            vec!["electric vehicle", "battery"]
        );
        assert_eq!(m.keywords_in("SOLAR panels"), vec!["solar"]);
    }

    #[test]
    fn order_is_by_first_occurrence() {
        let m = matcher();
        assert_eq!(m.tickers_in("LIT up, TAN down, LIT again"), vec!["LIT", "TAN"]);
        assert_eq!(m.keywords_in("solar then battery"), vec!["solar", "battery"]);
    }
}
