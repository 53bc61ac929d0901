// src/store.rs
//! Embedded SQLite store shared by signal memory, the alert queue and the
//! usage ledger. Timestamps are RFC 3339 UTC text (`...Z`), so string order
//! is time order.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS signals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL,
        signal_type TEXT NOT NULL,
        confidence INTEGER NOT NULL,
        etfs TEXT NOT NULL,
        reasoning TEXT NOT NULL,
        created_at TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        sector TEXT NOT NULL DEFAULT '',
        market_impact TEXT NOT NULL DEFAULT '',
        strategic_advice TEXT NOT NULL DEFAULT '',
        coaching_tone TEXT NOT NULL DEFAULT '',
        risk_factors TEXT NOT NULL DEFAULT '',
        opportunity_thesis TEXT NOT NULL DEFAULT '',
        price_snapshot TEXT NOT NULL DEFAULT '{}',
        batch_id TEXT,
        article_url TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_signals_created ON signals(created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS patterns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        pattern_type TEXT NOT NULL,
        etfs TEXT NOT NULL,
        strength REAL NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alerts (
        id TEXT PRIMARY KEY,
        timestamp TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        content TEXT NOT NULL,
        processed INTEGER NOT NULL DEFAULT 0,
        batch_id TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_alerts_pending ON alerts(processed, alert_type)",
    r#"
    CREATE TABLE IF NOT EXISTS batches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        batch_id TEXT NOT NULL UNIQUE,
        strategy TEXT NOT NULL,
        status TEXT NOT NULL,
        alert_ids TEXT NOT NULL,
        summary TEXT NOT NULL,
        created_at TEXT NOT NULL,
        processed_at TEXT,
        success INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_batches_strategy ON batches(strategy, status, processed_at)",
    r#"
    CREATE TABLE IF NOT EXISTS deferred_batches (
        batch_id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS usage_counters (
        period TEXT PRIMARY KEY,
        calls INTEGER NOT NULL DEFAULT 0,
        cost REAL NOT NULL DEFAULT 0
    )
    "#,
];

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the SQLite file at `path`; `:memory:` gives a
    /// private in-memory database.
    pub async fn open(path: &str) -> Result<Self> {
        if path == ":memory:" {
            return Self::in_memory().await;
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating store directory {}", parent.display()))?;
            }
        }
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .with_context(|| format!("opening sqlite store at {path}"))?;
        let store = Self { pool };
        store.initialize().await?;
        info!(path, "store opened");
        Ok(store)
    }

    /// Single-connection in-memory database (each connection would otherwise
    /// see its own empty database).
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("in-memory sqlite options")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .context("opening in-memory sqlite store")?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("Failed to create store tables")?;
        }
        Ok(())
    }
}

/// Canonical text form for stored timestamps.
pub fn ts_text(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| anyhow!("bad stored timestamp `{s}`: {e}"))
}
