// src/pipeline.rs
//! One discrete cycle: filter → batch → analyze → store → enqueue → flush.
//!
//! Stages run strictly in order. Cancellation is checked between stages and
//! between batches; work that was cut short (accepted items not yet batched,
//! ready batches not yet analyzed) is carried into the next cycle. Deferred
//! ready batches are mirrored to the store, so a later process picks them up.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertCleanupReport, AlertEngine, PendingAlert, QueueStats, Strategy};
use crate::analyze::{AnalysisOutcome, AnalysisRequest, AnalysisResult, Analyzer};
use crate::batch::{Batch, BatchAssembler, BatchStats};
use crate::budget::{BudgetDecision, BudgetLedger, CostStats};
use crate::config::PipelineConfig;
use crate::ingest::{FilterStats, FilterStatus, IngestionFilter, NewsItem, RawNewsItem};
use crate::memory::{CleanupReport, MemoryStats, SignalMemory};
use crate::notify::Notifier;
use crate::quotes::{self, QuoteProvider};
use crate::signal::Signal;
use crate::store::{ts_text, Store};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub filter: FilterStats,
    pub batches_ready: usize,
    pub batches_analyzed: usize,
    pub signals_stored: usize,
    pub not_relevant: usize,
    pub analysis_failures: usize,
    /// Set when a budget cap stopped analysis early.
    pub budget_stop: Option<BudgetDecision>,
    /// Ready batches carried into the next cycle.
    pub batches_deferred: usize,
    /// Oldest deferred batches dropped to stay within `max_deferred_batches`.
    pub batches_dropped: usize,
    pub alerts_enqueued: usize,
    /// Strategies that attempted delivery, with the outcome.
    pub flush: BTreeMap<Strategy, bool>,
    /// Store failures; the cycle continued past them.
    pub errors: Vec<String>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub memory: Option<CleanupReport>,
    pub alerts: Option<AlertCleanupReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub filter: FilterStatus,
    pub batches: BatchStats,
    /// One line per batch still waiting to become ready.
    pub pending: Vec<String>,
    pub deferred_batches: usize,
    pub memory: MemoryStats,
    pub costs: CostStats,
    pub alerts: QueueStats,
}

pub struct Pipeline {
    cfg: PipelineConfig,
    filter: IngestionFilter,
    assembler: BatchAssembler,
    memory: SignalMemory,
    budget: BudgetLedger,
    alerts: AlertEngine,
    analyzer: Arc<dyn Analyzer>,
    quotes: Arc<dyn QuoteProvider>,
    store: Store,
    deferred_items: Vec<NewsItem>,
    deferred_batches: Vec<Batch>,
    deferred_restored: bool,
}

impl Pipeline {
    pub fn new(
        cfg: PipelineConfig,
        store: Store,
        analyzer: Arc<dyn Analyzer>,
        notifier: Arc<dyn Notifier>,
        quotes: Arc<dyn QuoteProvider>,
    ) -> Result<Self> {
        let tz = cfg.ingest.timezone;
        Ok(Self {
            filter: IngestionFilter::new(&cfg.ingest)?,
            assembler: BatchAssembler::new(&cfg.batching),
            memory: SignalMemory::new(store.clone(), &cfg.memory, tz),
            budget: BudgetLedger::new(store.clone(), &cfg.budget, tz),
            alerts: AlertEngine::new(store.clone(), &cfg.alerts, notifier),
            analyzer,
            quotes,
            store,
            deferred_items: Vec::new(),
            deferred_batches: Vec::new(),
            deferred_restored: false,
            cfg,
        })
    }

    pub fn memory(&self) -> &SignalMemory {
        &self.memory
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn budget(&self) -> &BudgetLedger {
        &self.budget
    }

    pub async fn run_cycle(&mut self, raw: &[RawNewsItem], now: DateTime<Utc>, cancel: &AtomicBool) -> CycleReport {
        let mut report = CycleReport {
            started_at: Some(now),
            ..CycleReport::default()
        };

        if !self.deferred_restored {
            match self.restore_deferred().await {
                Ok(()) => self.deferred_restored = true,
                Err(e) => note_error(&mut report, "restoring deferred batches", &e),
            }
        }

        // filter, with the headline budget shared through the store
        match self.budget.headlines_today(now).await {
            Ok(n) => self.filter.sync_daily_count(n, now),
            Err(e) => note_error(&mut report, "reading headline counter", &e),
        }
        let (accepted, stats) = self.filter.filter(raw, now);
        report.filter = stats;
        if let Err(e) = self.budget.record_headlines(accepted.len() as u32, now).await {
            note_error(&mut report, "recording headline counter", &e);
        }
        self.deferred_items.extend(accepted);
        if cancelled(cancel, &mut report, "filter") {
            return self.finish(report, now).await;
        }

        // batch
        let items = std::mem::take(&mut self.deferred_items);
        let ready = self.assembler.add_items(items, now);
        report.batches_ready = ready.len();
        self.deferred_batches.extend(ready);
        if cancelled(cancel, &mut report, "batch") {
            return self.finish(report, now).await;
        }

        // analyze → store → enqueue, one batch at a time
        let mut queue = std::mem::take(&mut self.deferred_batches).into_iter();
        for batch in queue.by_ref() {
            if cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                self.deferred_batches.push(batch);
                break;
            }
            match self.budget.reserve_call(now).await {
                Ok(BudgetDecision::Reserved { .. }) => {}
                Ok(stop) => {
                    info!(decision = ?stop, "analysis budget reached, deferring remaining batches");
                    report.budget_stop = Some(stop);
                    self.deferred_batches.push(batch);
                    break;
                }
                Err(e) => {
                    note_error(&mut report, "reserving analysis budget", &e);
                    self.deferred_batches.push(batch);
                    break;
                }
            }
            self.process_batch(batch, now, &mut report).await;
        }
        self.deferred_batches.extend(queue);
        if report.cancelled {
            info!(deferred = self.deferred_batches.len(), "cycle cancelled during analysis");
            return self.finish(report, now).await;
        }

        // flush
        report.flush = self.alerts.flush_ready(now).await;
        self.finish(report, now).await
    }

    async fn restore_deferred(&mut self) -> Result<()> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT batch_id, content FROM deferred_batches ORDER BY created_at ASC, batch_id ASC")
                .fetch_all(self.store.pool())
                .await
                .context("Failed to load deferred batches")?;
        let mut restored = 0;
        for (id, content) in rows {
            if self.deferred_batches.iter().any(|b| b.batch_id == id) {
                continue;
            }
            match serde_json::from_str::<Batch>(&content) {
                Ok(b) => {
                    self.deferred_batches.push(b);
                    restored += 1;
                }
                Err(e) => warn!(batch_id = %id, error = %e, "skipping unreadable deferred batch"),
            }
        }
        if restored > 0 {
            info!(restored, "deferred batches restored from store");
        }
        Ok(())
    }

    /// Cap the deferred queue (oldest first out) and mirror it to the store.
    async fn settle_deferred(&mut self, report: &mut CycleReport) -> Result<()> {
        let cap = self.cfg.batching.max_deferred_batches;
        if self.deferred_batches.len() > cap {
            let excess = self.deferred_batches.len() - cap;
            for b in self.deferred_batches.drain(..excess) {
                warn!(batch_id = %b.batch_id, items = b.size(), "deferred queue full, dropping batch");
            }
            report.batches_dropped = excess;
        }
        report.batches_deferred = self.deferred_batches.len();

        let mut tx = self.store.pool().begin().await.context("begin deferred batch transaction")?;
        sqlx::query("DELETE FROM deferred_batches")
            .execute(&mut *tx)
            .await
            .context("Failed to clear deferred batches")?;
        for b in &self.deferred_batches {
            let content = serde_json::to_string(b).context("encoding deferred batch")?;
            sqlx::query("INSERT INTO deferred_batches (batch_id, content, created_at) VALUES (?, ?, ?)")
                .bind(&b.batch_id)
                .bind(content)
                .bind(ts_text(b.created_at))
                .execute(&mut *tx)
                .await
                .context("Failed to store deferred batch")?;
        }
        tx.commit().await.context("commit deferred batches")?;
        Ok(())
    }

    async fn process_batch(&self, batch: Batch, now: DateTime<Utc>, report: &mut CycleReport) {
        let context = match self.memory.contextual_insight(None, &batch.tickers, now).await {
            Ok(c) => c,
            Err(e) => {
                note_error(report, "building memory context", &e);
                None
            }
        };
        // one lookup per batch; the signal snapshot reuses it
        let prices = quotes::snapshot(self.quotes.as_ref(), &batch.tickers).await;
        let req = AnalysisRequest {
            batch_id: batch.batch_id.clone(),
            text: batch.combined_text(),
            tickers: batch.tickers.clone(),
            keywords: batch.keywords.clone(),
            context,
            prices: prices.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        };

        counter!("analysis_calls_total").increment(1);
        report.batches_analyzed += 1;
        let result = match self.analyzer.analyze(&req).await {
            Ok(AnalysisOutcome::Signal(r)) => r,
            Ok(AnalysisOutcome::NotRelevant) => {
                debug!(batch_id = %batch.batch_id, "analysis: not relevant");
                report.not_relevant += 1;
                return;
            }
            Ok(AnalysisOutcome::Unusable(why)) => {
                warn!(batch_id = %batch.batch_id, reason = %why, "analysis produced no usable signal");
                counter!("analysis_failures_total").increment(1);
                report.analysis_failures += 1;
                return;
            }
            Err(e) => {
                warn!(batch_id = %batch.batch_id, analyzer = self.analyzer.name(), error = %e, "analysis call failed");
                counter!("analysis_failures_total").increment(1);
                report.analysis_failures += 1;
                return;
            }
        };

        let mut signal = self.build_signal(&batch, result, now);
        signal.price_snapshot = signal
            .etfs
            .iter()
            .filter_map(|e| prices.get(e).map(|p| (e.clone(), *p)))
            .collect();
        match self.memory.store_signal(&signal).await {
            Ok(id) => {
                signal.id = Some(id);
                report.signals_stored += 1;
            }
            Err(e) => {
                note_error(report, "storing signal", &e);
                return;
            }
        }

        if signal.confidence < self.cfg.alerts.min_confidence {
            debug!(confidence = signal.confidence, "signal below alert threshold");
            return;
        }
        let search_term = batch
            .keywords
            .first()
            .cloned()
            .unwrap_or_else(|| batch.group_key.clone());
        let alert = PendingAlert::from_signal(&signal, search_term);
        match self.alerts.enqueue(&alert, self.cfg.alerts.default_strategy, now).await {
            Ok(true) => report.alerts_enqueued += 1,
            Ok(false) => {}
            Err(e) => note_error(report, "enqueueing alert", &e),
        }
    }

    fn build_signal(&self, batch: &Batch, r: AnalysisResult, now: DateTime<Utc>) -> Signal {
        let etfs = if r.etfs.is_empty() {
            batch.tickers.clone()
        } else {
            r.etfs
        };
        let lead = batch.items.first();
        let mut s = Signal::new(now, self.cfg.ingest.timezone, r.direction, r.confidence, etfs, r.reasoning)
            .with_title(lead.map(|i| i.title.clone()).unwrap_or_default());
        s.sector = r.sector;
        s.market_impact = r.market_impact;
        s.strategic_advice = r.strategic_advice;
        s.coaching_tone = r.coaching_tone;
        s.risk_factors = r.risk_factors;
        s.opportunity_thesis = r.opportunity_thesis;
        s.article_url = lead.map(|i| i.url.clone()).unwrap_or_default();
        s.batch_id = Some(batch.batch_id.clone());
        s
    }

    async fn finish(&mut self, mut report: CycleReport, now: DateTime<Utc>) -> CycleReport {
        if let Err(e) = self.settle_deferred(&mut report).await {
            note_error(&mut report, "persisting deferred batches", &e);
        }
        gauge!("pipeline_last_cycle_ts").set(now.timestamp() as f64);
        info!(
            received = report.filter.total_received,
            accepted = report.filter.accepted,
            batches_ready = report.batches_ready,
            signals = report.signals_stored,
            alerts = report.alerts_enqueued,
            deferred = report.batches_deferred,
            dropped = report.batches_dropped,
            cancelled = report.cancelled,
            errors = report.errors.len(),
            "cycle finished"
        );
        report
    }

    /// Retention cleanup for signal memory and the alert audit trail.
    pub async fn maintenance(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let memory = self
            .memory
            .cleanup(now)
            .await
            .map_err(|e| error!(error = ?e, "signal memory cleanup failed"))
            .ok();
        let alerts = self
            .alerts
            .cleanup(self.cfg.alerts.audit_retention_days, now)
            .await
            .map_err(|e| error!(error = ?e, "alert audit cleanup failed"))
            .ok();
        MaintenanceReport { memory, alerts }
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Result<PipelineStatus> {
        Ok(PipelineStatus {
            filter: self.filter.status(),
            batches: self.assembler.stats(),
            pending: self.assembler.pending_batches().iter().map(|b| b.summary()).collect(),
            deferred_batches: self.deferred_batches.len(),
            memory: self.memory.memory_stats(now).await?,
            costs: self.budget.cost_stats(now).await?,
            alerts: self.alerts.queue_stats(now).await?,
        })
    }
}

fn cancelled(cancel: &AtomicBool, report: &mut CycleReport, after: &str) -> bool {
    if cancel.load(Ordering::SeqCst) {
        info!(stage = after, "cycle cancelled");
        report.cancelled = true;
        return true;
    }
    false
}

fn note_error(report: &mut CycleReport, what: &str, e: &anyhow::Error) {
    error!(error = ?e, "{what} failed");
    report.errors.push(format!("{what}: {e:#}"));
}
