// src/memory/mod.rs
//! Signal memory: durable signal history plus on-demand pattern detection.

pub mod patterns;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use metrics::counter;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::signal::{Direction, PriceSnapshot, Signal};
use crate::store::{parse_ts, ts_text, Store};
pub use patterns::{Pattern, PatternDetail};

#[derive(Debug, sqlx::FromRow)]
struct SignalRow {
    id: i64,
    date: String,
    signal_type: String,
    confidence: i64,
    etfs: String,
    reasoning: String,
    created_at: String,
    title: String,
    sector: String,
    market_impact: String,
    strategic_advice: String,
    coaching_tone: String,
    risk_factors: String,
    opportunity_thesis: String,
    price_snapshot: String,
    batch_id: Option<String>,
    article_url: String,
}

impl TryFrom<SignalRow> for Signal {
    type Error = anyhow::Error;

    fn try_from(r: SignalRow) -> Result<Self> {
        let direction = r
            .signal_type
            .parse::<Direction>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("signal {}", r.id))?;
        let price_snapshot: PriceSnapshot = if r.price_snapshot.trim().is_empty() {
            PriceSnapshot::new()
        } else {
            serde_json::from_str(&r.price_snapshot).unwrap_or_default()
        };
        Ok(Signal {
            id: Some(r.id),
            timestamp: parse_ts(&r.created_at)?,
            date: NaiveDate::parse_from_str(&r.date, "%Y-%m-%d")
                .with_context(|| format!("signal {} date `{}`", r.id, r.date))?,
            direction,
            confidence: r.confidence.clamp(1, 10) as u8,
            etfs: split_etfs(&r.etfs),
            reasoning: r.reasoning,
            title: r.title,
            sector: r.sector,
            market_impact: r.market_impact,
            strategic_advice: r.strategic_advice,
            coaching_tone: r.coaching_tone,
            risk_factors: r.risk_factors,
            opportunity_thesis: r.opportunity_thesis,
            article_url: r.article_url,
            batch_id: r.batch_id,
            price_snapshot,
        })
    }
}

fn split_etfs(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryStats {
    pub total_signals: i64,
    /// Count per direction label.
    pub signal_breakdown: BTreeMap<String, i64>,
    pub recent_signals: i64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted_signals: u64,
    pub deleted_patterns: u64,
    pub cutoff_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct SignalMemory {
    store: Store,
    cfg: MemoryConfig,
    tz: Tz,
}

impl SignalMemory {
    pub fn new(store: Store, cfg: &MemoryConfig, tz: Tz) -> Self {
        Self {
            store,
            cfg: cfg.clone(),
            tz,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.cfg
    }

    /// Persist a signal and return its row id.
    pub async fn store_signal(&self, signal: &Signal) -> Result<i64> {
        let snapshot = serde_json::to_string(&signal.price_snapshot).context("encoding price snapshot")?;
        let res = sqlx::query(
            r#"
            INSERT INTO signals (
                date, signal_type, confidence, etfs, reasoning, created_at, title, sector,
                market_impact, strategic_advice, coaching_tone, risk_factors,
                opportunity_thesis, price_snapshot, batch_id, article_url
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(signal.date.format("%Y-%m-%d").to_string())
        .bind(signal.direction.as_str())
        .bind(i64::from(signal.confidence))
        .bind(signal.etfs.join(","))
        .bind(&signal.reasoning)
        .bind(ts_text(signal.timestamp))
        .bind(&signal.title)
        .bind(&signal.sector)
        .bind(&signal.market_impact)
        .bind(&signal.strategic_advice)
        .bind(&signal.coaching_tone)
        .bind(&signal.risk_factors)
        .bind(&signal.opportunity_thesis)
        .bind(snapshot)
        .bind(signal.batch_id.as_deref())
        .bind(&signal.article_url)
        .execute(self.store.pool())
        .await
        .context("Failed to store signal")?;

        counter!("signals_stored_total").increment(1);
        let id = res.last_insert_rowid();
        debug!(id, direction = %signal.direction, confidence = signal.confidence, "signal stored");
        Ok(id)
    }

    /// Signals dated within the last `days` local days, newest first.
    pub async fn get_recent_signals(&self, days: i64, now: DateTime<Utc>) -> Result<Vec<Signal>> {
        let cutoff = self.local_date(now) - Duration::days(days);
        let rows = sqlx::query_as::<_, SignalRow>(
            "SELECT * FROM signals WHERE date >= ? ORDER BY created_at DESC, id DESC",
        )
        .bind(cutoff.format("%Y-%m-%d").to_string())
        .fetch_all(self.store.pool())
        .await
        .context("Failed to load recent signals")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match Signal::try_from(row) {
                Ok(s) => out.push(s),
                Err(e) => warn!(error = %e, "skipping unreadable signal row"),
            }
        }
        Ok(out)
    }

    /// Detect patterns over the lookback window and record them for audit.
    pub async fn detect_patterns(&self, etf: Option<&str>, now: DateTime<Utc>) -> Result<Vec<Pattern>> {
        let found = self.scan_patterns(etf, now).await?;
        for p in &found {
            self.store_pattern(p, now).await?;
        }
        if !found.is_empty() {
            debug!(count = found.len(), etf = etf.unwrap_or("*"), "patterns detected");
        }
        Ok(found)
    }

    async fn scan_patterns(&self, etf: Option<&str>, now: DateTime<Utc>) -> Result<Vec<Pattern>> {
        let mut recent = self.get_recent_signals(self.cfg.lookback_days, now).await?;
        recent.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let mut by_etf: BTreeMap<&str, Vec<&Signal>> = BTreeMap::new();
        for s in &recent {
            for e in &s.etfs {
                if etf.is_some_and(|want| want != e.as_str()) {
                    continue;
                }
                by_etf.entry(e.as_str()).or_default().push(s);
            }
        }

        Ok(by_etf
            .into_iter()
            .flat_map(|(e, signals)| patterns::detect(e, &signals, &self.cfg))
            .collect())
    }

    async fn store_pattern(&self, p: &Pattern, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO patterns (start_date, end_date, pattern_type, etfs, strength, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(p.start_date.format("%Y-%m-%d").to_string())
        .bind(p.end_date.format("%Y-%m-%d").to_string())
        .bind(p.kind())
        .bind(&p.etf)
        .bind(p.strength)
        .bind(&p.description)
        .bind(ts_text(now))
        .execute(self.store.pool())
        .await
        .context("Failed to store pattern")?;
        Ok(())
    }

    /// Narrative context for `etfs`.
    ///
    /// With `current` set, streaks only count when they point the same way;
    /// reversals and volatility always count. A weekly directional-bias sentence is added
    /// per instrument when one side dominates.
    pub async fn contextual_insight(
        &self,
        current: Option<Direction>,
        etfs: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let mut parts = Vec::new();
        for etf in etfs {
            for p in self.scan_patterns(Some(etf), now).await? {
                let include = match p.detail {
                    PatternDetail::Consecutive { direction, .. } => current.map_or(true, |c| c == direction),
                    PatternDetail::Reversal { .. } | PatternDetail::Volatility { .. } => true,
                };
                if include {
                    parts.push(p.description);
                }
            }
        }
        parts.extend(self.bias_sentences(etfs, now).await?);

        Ok(if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        })
    }

    async fn bias_sentences(&self, etfs: &[String], now: DateTime<Utc>) -> Result<Vec<String>> {
        let recent = self.get_recent_signals(self.cfg.bias_window_days, now).await?;
        // (bullish, bearish, total)
        let mut tally: HashMap<&str, (usize, usize, usize)> = HashMap::new();
        for s in &recent {
            for e in s.etfs.iter().filter(|e| etfs.contains(e)) {
                let t = tally.entry(e.as_str()).or_default();
                t.2 += 1;
                match s.direction {
                    Direction::Bullish => t.0 += 1,
                    Direction::Bearish => t.1 += 1,
                    Direction::Neutral => {}
                }
            }
        }

        let mut out = Vec::new();
        for etf in etfs {
            let Some(&(bull, bear, total)) = tally.get(etf.as_str()) else {
                continue;
            };
            if total < self.cfg.bias_min_signals {
                continue;
            }
            let ratio = |n: usize| n as f64 / total as f64;
            if ratio(bull) >= self.cfg.bias_ratio {
                out.push(format!(
                    "{etf} has been predominantly bullish this week ({bull}/{total} signals)."
                ));
            } else if ratio(bear) >= self.cfg.bias_ratio {
                out.push(format!(
                    "{etf} has been predominantly bearish this week ({bear}/{total} signals)."
                ));
            }
        }
        Ok(out)
    }

    pub async fn memory_stats(&self, now: DateTime<Utc>) -> Result<MemoryStats> {
        let pool = self.store.pool();
        let total_signals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signals")
            .fetch_one(pool)
            .await
            .context("counting signals")?;
        let breakdown: Vec<(String, i64)> =
            sqlx::query_as("SELECT signal_type, COUNT(*) FROM signals GROUP BY signal_type")
                .fetch_all(pool)
                .await
                .context("signal breakdown")?;
        let cutoff = self.local_date(now) - Duration::days(7);
        let recent_signals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signals WHERE date >= ?")
            .bind(cutoff.format("%Y-%m-%d").to_string())
            .fetch_one(pool)
            .await
            .context("counting recent signals")?;
        let (first_date, last_date): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT MIN(date), MAX(date) FROM signals")
                .fetch_one(pool)
                .await
                .context("signal date range")?;

        Ok(MemoryStats {
            total_signals,
            signal_breakdown: breakdown.into_iter().collect(),
            recent_signals,
            first_date,
            last_date,
        })
    }

    /// Delete signals and patterns older than the retention window. Safe to repeat.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let cutoff_date = self.local_date(now) - Duration::days(self.cfg.retention_days);
        let cutoff = cutoff_date.format("%Y-%m-%d").to_string();

        let deleted_signals = sqlx::query("DELETE FROM signals WHERE date < ?")
            .bind(&cutoff)
            .execute(self.store.pool())
            .await
            .context("Failed to delete old signals")?
            .rows_affected();
        let deleted_patterns = sqlx::query("DELETE FROM patterns WHERE end_date < ?")
            .bind(&cutoff)
            .execute(self.store.pool())
            .await
            .context("Failed to delete old patterns")?
            .rows_affected();

        if deleted_signals + deleted_patterns > 0 {
            info!(deleted_signals, deleted_patterns, cutoff = %cutoff, "signal memory cleaned up");
        } else {
            debug!(cutoff = %cutoff, "no signal memory rows past retention");
        }
        Ok(CleanupReport {
            deleted_signals,
            deleted_patterns,
            cutoff_date,
        })
    }

    fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }
}
