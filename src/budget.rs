// src/budget.rs
//! Durable usage ledger: daily analysis calls, monthly spend and daily accepted
//! headlines, keyed by period in the reference timezone.
//!
//! Rows: `day:YYYY-MM-DD`, `month:YYYY-MM`, `headlines:YYYY-MM-DD`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::BudgetConfig;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum BudgetDecision {
    Reserved { calls_today: u32, month_cost: f64 },
    DailyCallsExhausted,
    MonthlyBudgetExhausted,
}

impl BudgetDecision {
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostStats {
    pub day: String,
    pub calls_today: u32,
    pub max_daily_calls: u32,
    pub remaining_calls: u32,
    pub month: String,
    pub month_cost: f64,
    pub max_monthly_cost: f64,
    pub remaining_budget: f64,
    pub headlines_today: u32,
}

#[derive(Debug, Clone)]
pub struct BudgetLedger {
    store: Store,
    cfg: BudgetConfig,
    tz: Tz,
    // one reservation at a time within this process; the transaction covers other processes
    lock: Arc<Mutex<()>>,
}

impl BudgetLedger {
    pub fn new(store: Store, cfg: &BudgetConfig, tz: Tz) -> Self {
        Self {
            store,
            cfg: cfg.clone(),
            tz,
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn day_key(&self, now: DateTime<Utc>) -> String {
        format!("day:{}", now.with_timezone(&self.tz).format("%Y-%m-%d"))
    }

    fn month_key(&self, now: DateTime<Utc>) -> String {
        format!("month:{}", now.with_timezone(&self.tz).format("%Y-%m"))
    }

    fn headlines_key(&self, now: DateTime<Utc>) -> String {
        format!("headlines:{}", now.with_timezone(&self.tz).format("%Y-%m-%d"))
    }

    /// Check both caps and, if there is room, count one analysis call.
    pub async fn reserve_call(&self, now: DateTime<Utc>) -> Result<BudgetDecision> {
        let _guard = self.lock.lock().await;
        let day = self.day_key(now);
        let month = self.month_key(now);

        let mut tx = self.store.pool().begin().await.context("begin budget transaction")?;

        let (calls, _): (i64, f64) = read_counter(&mut *tx, &day).await?;
        if calls >= i64::from(self.cfg.max_daily_ai_calls) {
            info!(calls, max = self.cfg.max_daily_ai_calls, "daily analysis call budget exhausted");
            return Ok(BudgetDecision::DailyCallsExhausted);
        }
        let (_, month_cost) = read_counter(&mut *tx, &month).await?;
        if month_cost + self.cfg.cost_per_call > self.cfg.max_monthly_cost + 1e-9 {
            info!(month_cost, max = self.cfg.max_monthly_cost, "monthly analysis budget exhausted");
            return Ok(BudgetDecision::MonthlyBudgetExhausted);
        }

        for period in [&day, &month] {
            sqlx::query(
                r#"
                INSERT INTO usage_counters (period, calls, cost) VALUES (?, 1, ?)
                ON CONFLICT(period) DO UPDATE SET calls = calls + 1, cost = cost + excluded.cost
                "#,
            )
            .bind(period)
            .bind(self.cfg.cost_per_call)
            .execute(&mut *tx)
            .await
            .context("Failed to update usage counters")?;
        }
        tx.commit().await.context("commit budget transaction")?;

        let decision = BudgetDecision::Reserved {
            calls_today: (calls + 1) as u32,
            month_cost: month_cost + self.cfg.cost_per_call,
        };
        debug!(?decision, "analysis call reserved");
        Ok(decision)
    }

    /// Accepted headlines recorded for the local day of `now`.
    pub async fn headlines_today(&self, now: DateTime<Utc>) -> Result<u32> {
        let mut conn = self.store.pool().acquire().await.context("acquire connection")?;
        let (calls, _) = read_counter(&mut *conn, &self.headlines_key(now)).await?;
        Ok(calls.max(0) as u32)
    }

    pub async fn record_headlines(&self, n: u32, now: DateTime<Utc>) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO usage_counters (period, calls, cost) VALUES (?, ?, 0)
            ON CONFLICT(period) DO UPDATE SET calls = calls + excluded.calls
            "#,
        )
        .bind(self.headlines_key(now))
        .bind(i64::from(n))
        .execute(self.store.pool())
        .await
        .context("Failed to record accepted headlines")?;
        Ok(())
    }

    pub async fn cost_stats(&self, now: DateTime<Utc>) -> Result<CostStats> {
        let mut conn = self.store.pool().acquire().await.context("acquire connection")?;
        let day = self.day_key(now);
        let month = self.month_key(now);
        let (calls, _) = read_counter(&mut *conn, &day).await?;
        let (_, month_cost) = read_counter(&mut *conn, &month).await?;
        let (headlines, _) = read_counter(&mut *conn, &self.headlines_key(now)).await?;

        let calls_today = calls.max(0) as u32;
        Ok(CostStats {
            day: day.trim_start_matches("day:").to_string(),
            calls_today,
            max_daily_calls: self.cfg.max_daily_ai_calls,
            remaining_calls: self.cfg.max_daily_ai_calls.saturating_sub(calls_today),
            month: month.trim_start_matches("month:").to_string(),
            month_cost,
            max_monthly_cost: self.cfg.max_monthly_cost,
            remaining_budget: (self.cfg.max_monthly_cost - month_cost).max(0.0),
            headlines_today: headlines.max(0) as u32,
        })
    }
}

async fn read_counter(conn: &mut sqlx::SqliteConnection, period: &str) -> Result<(i64, f64)> {
    let row: Option<(i64, f64)> =
        sqlx::query_as("SELECT calls, cost FROM usage_counters WHERE period = ?")
            .bind(period)
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("reading usage counter {period}"))?;
    Ok(row.unwrap_or((0, 0.0)))
}
