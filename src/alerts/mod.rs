// src/alerts/mod.rs
//! Alert batching engine.
//!
//! Candidate alerts are queued durably in `alerts`; each strategy decides on
//! its own pending set when to compose one summary and hand it to the
//! notifier. Delivery is retried a bounded number of times. Only a confirmed
//! delivery marks alerts processed, and the `batches` audit row and the alert
//! update commit in the same transaction.

pub mod strategy;
pub mod summary;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::AlertConfig;
use crate::ingest::hex;
use crate::notify::{Notification, Notifier};
use crate::signal::{Direction, Signal};
use crate::store::{parse_ts, ts_text, Store};
pub use strategy::Strategy;
pub use summary::{compose_notification, compose_summary};

/// A candidate notification derived from a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAlert {
    /// Stable identity derived from title, reasoning and timestamp.
    pub id: String,
    pub direction: Direction,
    pub confidence: u8,
    pub title: String,
    pub reasoning: String,
    pub etfs: Vec<String>,
    pub sector: String,
    pub article_url: String,
    pub search_term: String,
    pub timestamp: DateTime<Utc>,
}

impl PendingAlert {
    pub fn new(
        direction: Direction,
        confidence: u8,
        title: impl Into<String>,
        reasoning: impl Into<String>,
        etfs: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        let reasoning = reasoning.into();
        Self {
            id: alert_id(&title, &reasoning, timestamp),
            direction,
            confidence: confidence.clamp(1, 10),
            title,
            reasoning,
            etfs,
            sector: String::new(),
            article_url: String::new(),
            search_term: String::new(),
            timestamp,
        }
    }

    pub fn from_signal(signal: &Signal, search_term: impl Into<String>) -> Self {
        let mut a = Self::new(
            signal.direction,
            signal.confidence,
            signal.title.clone(),
            signal.reasoning.clone(),
            signal.etfs.clone(),
            signal.timestamp,
        );
        a.sector = signal.sector.clone();
        a.article_url = signal.article_url.clone();
        a.search_term = search_term.into();
        a
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = sector.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.article_url = url.into();
        self
    }
}

/// First 12 hex chars of SHA-256(title ‖ reasoning ‖ RFC 3339 timestamp).
pub fn alert_id(title: &str, reasoning: &str, timestamp: DateTime<Utc>) -> String {
    let mut h = Sha256::new();
    h.update(title.as_bytes());
    h.update(reasoning.as_bytes());
    h.update(timestamp.to_rfc3339().as_bytes());
    let mut id = hex(&h.finalize());
    id.truncate(12);
    id
}

/// A pending alert as read back from the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedAlert {
    pub alert: PendingAlert,
    pub strategy: Strategy,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: String,
    alert_type: String,
    content: String,
    created_at: String,
}

impl TryFrom<AlertRow> for QueuedAlert {
    type Error = anyhow::Error;

    fn try_from(r: AlertRow) -> Result<Self> {
        let alert: PendingAlert =
            serde_json::from_str(&r.content).with_context(|| format!("alert {} content", r.id))?;
        let strategy = r.alert_type.parse::<Strategy>().map_err(anyhow::Error::msg)?;
        Ok(Self {
            alert,
            strategy,
            enqueued_at: parse_ts(&r.created_at)?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StrategyBatchStats {
    pub total_batches: i64,
    pub successful: i64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct QueueStats {
    pub pending: BTreeMap<Strategy, i64>,
    /// Audit rows from the last 7 days.
    pub recent_batches: BTreeMap<Strategy, StrategyBatchStats>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AlertCleanupReport {
    /// Consumed alerts removed.
    pub deleted_alerts: u64,
    /// Pending alerts that were never sent within the window.
    pub expired_pending: u64,
    pub deleted_batches: u64,
}

pub struct AlertEngine {
    store: Store,
    cfg: AlertConfig,
    notifier: Arc<dyn Notifier>,
    seq: AtomicU64,
}

impl AlertEngine {
    pub fn new(store: Store, cfg: &AlertConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            cfg: cfg.clone(),
            notifier,
            seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.cfg
    }

    /// Queue an alert. Re-enqueuing an identical alert is a no-op; returns
    /// whether a new row was written.
    pub async fn enqueue(&self, alert: &PendingAlert, strategy: Strategy, now: DateTime<Utc>) -> Result<bool> {
        let content = serde_json::to_string(alert).context("encoding alert")?;
        let res = sqlx::query(
            r#"
            INSERT INTO alerts (id, timestamp, alert_type, content, processed, batch_id, created_at)
            VALUES (?, ?, ?, ?, 0, NULL, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&alert.id)
        .bind(ts_text(alert.timestamp))
        .bind(strategy.as_str())
        .bind(content)
        .bind(ts_text(now))
        .execute(self.store.pool())
        .await
        .context("Failed to enqueue alert")?;

        let inserted = res.rows_affected() > 0;
        if inserted {
            counter!("alerts_enqueued_total").increment(1);
            info!(
                alert_id = %alert.id,
                strategy = %strategy,
                confidence = alert.confidence,
                "alert enqueued"
            );
        } else {
            debug!(alert_id = %alert.id, "alert already queued");
        }
        Ok(inserted)
    }

    /// Unprocessed alerts for `strategy`, oldest first.
    pub async fn pending(&self, strategy: Strategy) -> Result<Vec<QueuedAlert>> {
        let rows: Vec<AlertRow> = sqlx::query_as(
            r#"
            SELECT id, alert_type, content, created_at FROM alerts
            WHERE processed = 0 AND alert_type = ?
            ORDER BY created_at ASC, timestamp ASC
            "#,
        )
        .bind(strategy.as_str())
        .fetch_all(self.store.pool())
        .await
        .context("Failed to load pending alerts")?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let id = r.id.clone();
                QueuedAlert::try_from(r)
                    .map_err(|e| warn!(alert_id = %id, error = ?e, "skipping unreadable queued alert"))
                    .ok()
            })
            .collect())
    }

    async fn last_sent(&self, strategy: Strategy) -> Result<Option<DateTime<Utc>>> {
        let last: Option<String> = sqlx::query_scalar(
            r#"
            SELECT processed_at FROM batches
            WHERE strategy = ? AND status = 'sent' AND processed_at IS NOT NULL
            ORDER BY processed_at DESC LIMIT 1
            "#,
        )
        .bind(strategy.as_str())
        .fetch_optional(self.store.pool())
        .await
        .context("Failed to read last sent batch")?;
        last.as_deref().map(parse_ts).transpose()
    }

    /// The alerts `strategy` would flush now, or an empty list if it is not ready.
    pub async fn ready_selection(&self, strategy: Strategy, now: DateTime<Utc>) -> Result<Vec<QueuedAlert>> {
        let pending = self.pending(strategy).await?;
        if pending.is_empty() {
            return Ok(pending);
        }
        let last_sent = if strategy == Strategy::DailyDigest {
            self.last_sent(strategy).await?
        } else {
            None
        };
        Ok(select_ready(strategy, pending, last_sent, now, &self.cfg))
    }

    /// Evaluate every strategy and flush the ready ones. The map holds one
    /// entry per strategy that attempted delivery.
    pub async fn flush_ready(&self, now: DateTime<Utc>) -> BTreeMap<Strategy, bool> {
        let mut results = BTreeMap::new();
        for strategy in Strategy::ALL {
            match self.flush_strategy(strategy, now).await {
                Ok(Some(ok)) => {
                    results.insert(strategy, ok);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(strategy = %strategy, error = ?e, "alert flush failed");
                    results.insert(strategy, false);
                }
            }
        }
        results
    }

    async fn flush_strategy(&self, strategy: Strategy, now: DateTime<Utc>) -> Result<Option<bool>> {
        let selection = self.ready_selection(strategy, now).await?;
        if selection.is_empty() {
            return Ok(None);
        }
        let alerts: Vec<PendingAlert> = selection.into_iter().map(|q| q.alert).collect();
        let note = compose_notification(&alerts, strategy, &self.cfg);
        let ids: Vec<String> = alerts.iter().map(|a| a.id.clone()).collect();
        let batch_id = self.batch_id(strategy, &ids, now);

        if self.deliver(&note, strategy).await {
            self.record_sent(&batch_id, strategy, &ids, &note.message, now).await?;
            counter!("alert_batches_sent_total", "strategy" => strategy.as_str()).increment(1);
            info!(strategy = %strategy, batch_id = %batch_id, alerts = ids.len(), "alert batch delivered");
            Ok(Some(true))
        } else {
            counter!("alert_delivery_failures_total", "strategy" => strategy.as_str()).increment(1);
            self.record_failed(&batch_id, strategy, &ids, &note.message, now).await?;
            warn!(strategy = %strategy, alerts = ids.len(), "alert batch not delivered, alerts stay pending");
            Ok(Some(false))
        }
    }

    async fn deliver(&self, note: &Notification, strategy: Strategy) -> bool {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.notifier.send(note).await {
                Ok(()) => return true,
                Err(e) if attempt < self.cfg.max_attempts => {
                    warn!(strategy = %strategy, attempt, error = %e, "delivery failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(self.cfg.retry_delay_ms)).await;
                }
                Err(e) => {
                    warn!(strategy = %strategy, attempt, error = %e, notifier = self.notifier.name(), "delivery gave up");
                    return false;
                }
            }
        }
    }

    fn batch_id(&self, strategy: Strategy, ids: &[String], now: DateTime<Utc>) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut h = Sha256::new();
        h.update(now.to_rfc3339().as_bytes());
        h.update(strategy.as_str().as_bytes());
        h.update(seq.to_le_bytes());
        for id in ids {
            h.update(id.as_bytes());
        }
        let mut digest = hex(&h.finalize());
        digest.truncate(12);
        format!("{}_{digest}", strategy.as_str())
    }

    async fn record_sent(
        &self,
        batch_id: &str,
        strategy: Strategy,
        ids: &[String],
        summary: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let ids_json = serde_json::to_string(ids).context("encoding alert ids")?;
        let mut tx = self.store.pool().begin().await.context("begin flush transaction")?;
        sqlx::query(
            r#"
            INSERT INTO batches (batch_id, strategy, status, alert_ids, summary, created_at, processed_at, success)
            VALUES (?, ?, 'sent', ?, ?, ?, ?, 1)
            "#,
        )
        .bind(batch_id)
        .bind(strategy.as_str())
        .bind(&ids_json)
        .bind(summary)
        .bind(ts_text(now))
        .bind(ts_text(now))
        .execute(&mut *tx)
        .await
        .context("Failed to record sent batch")?;

        let mut consumed = 0;
        for id in ids {
            consumed += sqlx::query("UPDATE alerts SET processed = 1, batch_id = ? WHERE id = ? AND processed = 0")
                .bind(batch_id)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to mark alerts processed")?
                .rows_affected();
        }
        tx.commit().await.context("commit flush transaction")?;

        if consumed < ids.len() as u64 {
            warn!(batch_id, expected = ids.len(), consumed, "some alerts were already consumed by another flush");
        }
        Ok(())
    }

    async fn record_failed(
        &self,
        batch_id: &str,
        strategy: Strategy,
        ids: &[String],
        summary: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let ids_json = serde_json::to_string(ids).context("encoding alert ids")?;
        sqlx::query(
            r#"
            INSERT INTO batches (batch_id, strategy, status, alert_ids, summary, created_at, processed_at, success)
            VALUES (?, ?, 'failed', ?, ?, ?, ?, 0)
            ON CONFLICT(batch_id) DO NOTHING
            "#,
        )
        .bind(batch_id)
        .bind(strategy.as_str())
        .bind(ids_json)
        .bind(summary)
        .bind(ts_text(now))
        .bind(ts_text(now))
        .execute(self.store.pool())
        .await
        .context("Failed to record failed batch")?;
        Ok(())
    }

    pub async fn queue_stats(&self, now: DateTime<Utc>) -> Result<QueueStats> {
        let mut stats = QueueStats::default();
        for s in Strategy::ALL {
            stats.pending.insert(s, 0);
        }
        let pending: Vec<(String, i64)> = sqlx::query_as(
            "SELECT alert_type, COUNT(*) FROM alerts WHERE processed = 0 GROUP BY alert_type",
        )
        .fetch_all(self.store.pool())
        .await
        .context("Failed to count pending alerts")?;
        for (kind, n) in pending {
            if let Ok(s) = kind.parse::<Strategy>() {
                stats.pending.insert(s, n);
            }
        }

        let since = ts_text(now - Duration::days(7));
        let recent: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT strategy, COUNT(*), COALESCE(SUM(success), 0) FROM batches
            WHERE created_at > ? GROUP BY strategy
            "#,
        )
        .bind(since)
        .fetch_all(self.store.pool())
        .await
        .context("Failed to summarize recent batches")?;
        for (kind, total, ok) in recent {
            if let Ok(s) = kind.parse::<Strategy>() {
                stats.recent_batches.insert(
                    s,
                    StrategyBatchStats {
                        total_batches: total,
                        successful: ok,
                        success_rate: if total > 0 { ok as f64 / total as f64 } else { 0.0 },
                    },
                );
            }
        }
        Ok(stats)
    }

    /// Drop audit rows, consumed alerts and stale pending alerts older than
    /// `days`.
    pub async fn cleanup(&self, days: i64, now: DateTime<Utc>) -> Result<AlertCleanupReport> {
        let cutoff = ts_text(now - Duration::days(days));
        let deleted_batches = sqlx::query("DELETE FROM batches WHERE created_at < ?")
            .bind(&cutoff)
            .execute(self.store.pool())
            .await
            .context("Failed to delete old batch records")?
            .rows_affected();
        let deleted_alerts = sqlx::query("DELETE FROM alerts WHERE processed = 1 AND created_at < ?")
            .bind(&cutoff)
            .execute(self.store.pool())
            .await
            .context("Failed to delete consumed alerts")?
            .rows_affected();
        let expired_pending = sqlx::query("DELETE FROM alerts WHERE processed = 0 AND created_at < ?")
            .bind(&cutoff)
            .execute(self.store.pool())
            .await
            .context("Failed to expire stale pending alerts")?
            .rows_affected();
        if expired_pending > 0 {
            warn!(expired_pending, days, "pending alerts expired without delivery");
        }
        if deleted_alerts + deleted_batches > 0 {
            info!(deleted_alerts, deleted_batches, "alert audit cleanup");
        }
        Ok(AlertCleanupReport {
            deleted_alerts,
            expired_pending,
            deleted_batches,
        })
    }
}

/// Readiness rule per strategy. `pending` is non-empty and oldest first.
pub fn select_ready(
    strategy: Strategy,
    pending: Vec<QueuedAlert>,
    last_sent: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cfg: &AlertConfig,
) -> Vec<QueuedAlert> {
    let waited = |q: &QueuedAlert| now - q.enqueued_at;
    let ready = match strategy {
        Strategy::Immediate => !pending.is_empty(),
        Strategy::TimeWindow => {
            pending.len() >= cfg.time_window_max_alerts
                || pending
                    .iter()
                    .any(|q| waited(q) > Duration::minutes(cfg.time_window_mins))
        }
        Strategy::DailyDigest => match last_sent {
            Some(t) => now - t > Duration::hours(cfg.digest_interval_hours),
            None => !pending.is_empty(),
        },
        Strategy::SmartBatch => {
            let eligible: Vec<QueuedAlert> = pending
                .into_iter()
                .filter(|q| q.alert.confidence >= cfg.medium_confidence)
                .collect();
            let critical = eligible
                .iter()
                .any(|q| q.alert.confidence >= cfg.critical_confidence);
            let medium: Vec<&QueuedAlert> = eligible
                .iter()
                .filter(|q| q.alert.confidence < cfg.critical_confidence)
                .collect();
            let ready = critical
                || medium.len() >= cfg.medium_batch_size
                || medium
                    .iter()
                    .any(|q| waited(q) >= Duration::minutes(cfg.medium_wait_mins));
            return if ready { eligible } else { Vec::new() };
        }
    };
    if ready {
        pending
    } else {
        Vec::new()
    }
}
