// src/memory/patterns.rs
//! Heuristic pattern detection over one instrument's signal history.
//!
//! Input is expected in ascending timestamp order. Everything here is pure and
//! recomputable; persistence is the caller's concern.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::config::MemoryConfig;
use crate::signal::{Direction, Signal};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternDetail {
    Consecutive {
        direction: Direction,
        streak: usize,
        average_confidence: f64,
    },
    Reversal {
        from: Direction,
        to: Direction,
        from_confidence: u8,
        to_confidence: u8,
    },
    Volatility {
        changes: usize,
        window: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    pub etf: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(flatten)]
    pub detail: PatternDetail,
    /// [0,1]
    pub strength: f64,
    pub description: String,
}

impl Pattern {
    pub fn kind(&self) -> &'static str {
        match self.detail {
            PatternDetail::Consecutive { .. } => "consecutive",
            PatternDetail::Reversal { .. } => "reversal",
            PatternDetail::Volatility { .. } => "volatility",
        }
    }
}

/// All patterns for `etf`, in the order: streaks, reversals, volatility.
pub fn detect(etf: &str, signals: &[&Signal], cfg: &MemoryConfig) -> Vec<Pattern> {
    let mut out = consecutive(etf, signals, cfg);
    out.extend(reversals(etf, signals, cfg));
    out.extend(volatility(etf, signals, cfg));
    out
}

struct Run<'a> {
    direction: Direction,
    members: Vec<&'a Signal>,
}

/// Same-direction runs of Bullish/Bearish signals with no gap above `max_gap_secs`.
pub fn consecutive(etf: &str, signals: &[&Signal], cfg: &MemoryConfig) -> Vec<Pattern> {
    let max_gap = Duration::seconds(cfg.max_gap_secs);
    let mut out = Vec::new();
    let mut run: Option<Run<'_>> = None;

    for &s in signals {
        let extends = match &run {
            Some(r) => {
                let prev = r.members[r.members.len() - 1];
                s.direction == r.direction && s.timestamp - prev.timestamp <= max_gap
            }
            None => false,
        };
        if extends {
            if let Some(r) = run.as_mut() {
                r.members.push(s);
            }
            continue;
        }
        if let Some(r) = run.take() {
            close_run(etf, r, cfg, &mut out);
        }
        if s.direction != Direction::Neutral {
            run = Some(Run {
                direction: s.direction,
                members: vec![s],
            });
        }
    }
    if let Some(r) = run {
        close_run(etf, r, cfg, &mut out);
    }
    out
}

fn close_run(etf: &str, run: Run<'_>, cfg: &MemoryConfig, out: &mut Vec<Pattern>) {
    let streak = run.members.len();
    if streak < cfg.min_consecutive {
        return;
    }
    let avg = run.members.iter().map(|s| f64::from(s.confidence)).sum::<f64>() / streak as f64;
    let (first, last) = (run.members[0], run.members[streak - 1]);
    out.push(Pattern {
        etf: etf.to_string(),
        start_date: first.date,
        end_date: last.date,
        detail: PatternDetail::Consecutive {
            direction: run.direction,
            streak,
            average_confidence: avg,
        },
        strength: (avg / 10.0).clamp(0.0, 1.0),
        description: consecutive_description(etf, run.direction, streak, avg),
    });
}

/// Adjacent Bullish↔Bearish flips where both sides reach the confidence threshold.
pub fn reversals(etf: &str, signals: &[&Signal], cfg: &MemoryConfig) -> Vec<Pattern> {
    signals
        .windows(2)
        .filter(|w| {
            w[0].direction.opposes(w[1].direction)
                && w[0].confidence >= cfg.confidence_threshold
                && w[1].confidence >= cfg.confidence_threshold
        })
        .map(|w| {
            let (prev, curr) = (w[0], w[1]);
            Pattern {
                etf: etf.to_string(),
                start_date: prev.date,
                end_date: curr.date,
                detail: PatternDetail::Reversal {
                    from: prev.direction,
                    to: curr.direction,
                    from_confidence: prev.confidence,
                    to_confidence: curr.confidence,
                },
                strength: f64::from(prev.confidence.min(curr.confidence)) / 10.0,
                description: reversal_description(etf, prev.direction, curr.direction),
            }
        })
        .collect()
}

/// Direction changes within the most recent window.
pub fn volatility(etf: &str, signals: &[&Signal], cfg: &MemoryConfig) -> Vec<Pattern> {
    if signals.len() < cfg.min_volatility_samples.max(2) {
        return Vec::new();
    }
    let start = signals.len().saturating_sub(cfg.volatility_window);
    let recent = &signals[start..];
    let changes = recent
        .windows(2)
        .filter(|w| w[0].direction != w[1].direction)
        .count();
    if changes < cfg.min_consecutive {
        return Vec::new();
    }
    let window = recent.len();
    vec![Pattern {
        etf: etf.to_string(),
        start_date: recent[0].date,
        end_date: recent[window - 1].date,
        detail: PatternDetail::Volatility { changes, window },
        strength: (changes as f64 / (window - 1) as f64).clamp(0.0, 1.0),
        description: format!(
            "{etf} showing high volatility with {changes} signal changes in {window} signals. Market uncertainty detected."
        ),
    }]
}

fn confidence_word(avg: f64) -> &'static str {
    if avg >= 8.0 {
        "high"
    } else if avg >= 6.0 {
        "moderate"
    } else {
        "low"
    }
}

fn consecutive_description(etf: &str, direction: Direction, streak: usize, avg: f64) -> String {
    let conf = confidence_word(avg);
    match (direction, streak >= 3) {
        (Direction::Bearish, true) => format!(
            "{etf} has been in {streak} consecutive bearish alerts with {conf} confidence. Possible long-term sector drift forming; consider defensive positioning."
        ),
        (Direction::Bearish, false) => format!(
            "{etf} showing back-to-back bearish signals with {conf} confidence. Monitor for trend continuation."
        ),
        (Direction::Bullish, true) => format!(
            "{etf} has sustained {streak} consecutive bullish alerts with {conf} confidence. Strong momentum building; consider scaling positions."
        ),
        (Direction::Bullish, false) => format!(
            "{etf} showing consecutive bullish signals with {conf} confidence. Positive momentum developing."
        ),
        (Direction::Neutral, _) => format!("{etf} showing {streak} consecutive neutral signals."),
    }
}

fn reversal_description(etf: &str, from: Direction, to: Direction) -> String {
    match (from, to) {
        (Direction::Bearish, Direction::Bullish) => format!(
            "{etf} reversed from bearish to bullish, potential bottom formation. Consider entry opportunities."
        ),
        (Direction::Bullish, Direction::Bearish) => format!(
            "{etf} reversed from bullish to bearish, possible trend change. Review position sizing."
        ),
        _ => format!("{etf} signal reversal detected: {from} → {to}"),
    }
}
