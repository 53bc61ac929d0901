// src/config/mod.rs
//! Typed pipeline configuration loaded from TOML.
//!
//! Every section rejects unknown keys and every field has a documented default,
//! so a typo fails at load time instead of silently falling back deep inside a stage.

pub mod sources;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::alerts::Strategy;
pub use sources::{SourceCategory, SourceProfile, SourceTable};

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
/// Upper bound for `analysis.max_retries`; backoff doubles per attempt.
pub const MAX_ANALYSIS_RETRIES: u8 = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub batching: BatchingConfig,
    pub budget: BudgetConfig,
    pub memory: MemoryConfig,
    pub alerts: AlertConfig,
    pub analysis: AnalysisConfig,
    pub notify: NotifyConfig,
    pub store: StoreConfig,
}

/// `[ingest]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Reference timezone: naive timestamps are read in it, market hours and
    /// the daily rollover are evaluated in it.
    pub timezone: Tz,
    /// Hard cap on accepted items per local day.
    pub max_daily_headlines: u32,
    pub tracked_tickers: Vec<String>,
    pub keywords: Vec<String>,
    pub positive_words: Vec<String>,
    pub negative_words: Vec<String>,
    pub market_hours: MarketHoursConfig,
    pub dedup: DedupConfig,
    pub thresholds: ThresholdConfig,
    pub sources: SourceTable,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            max_daily_headlines: 20,
            tracked_tickers: strings(&[
                "ICLN", "TAN", "LIT", "URA", "ITA", "XAR", "BOTZ", "DRIV", "XLE", "QQQ",
            ]),
            keywords: strings(&[
                "clean energy",
                "solar",
                "lithium",
                "uranium",
                "nuclear",
                "defense",
                "robotics",
                "electric vehicle",
                "battery",
                "oil",
            ]),
            positive_words: strings(&[
                "surge", "rally", "gain", "up", "positive", "bullish", "growth", "profit",
                "earnings", "beat",
            ]),
            negative_words: strings(&[
                "drop", "fall", "decline", "down", "negative", "bearish", "loss", "miss", "crash",
                "plunge",
            ]),
            market_hours: MarketHoursConfig::default(),
            dedup: DedupConfig::default(),
            thresholds: ThresholdConfig::default(),
            sources: SourceTable::default(),
        }
    }
}

/// `[ingest.market_hours]`: inclusive `start..=end` window in the reference timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketHoursConfig {
    pub enabled: bool,
    /// "HH:MM"
    pub start: String,
    /// "HH:MM"
    pub end: String,
}

impl Default for MarketHoursConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start: "09:30".into(),
            end: "16:00".into(),
        }
    }
}

impl MarketHoursConfig {
    pub fn window(&self) -> Result<(NaiveTime, NaiveTime)> {
        let start = parse_hhmm(&self.start).context("market_hours.start")?;
        let end = parse_hhmm(&self.end).context("market_hours.end")?;
        Ok((start, end))
    }
}

/// `[ingest.dedup]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupConfig {
    pub enabled: bool,
    /// Title similarity in [0,1] at or above which an item is a near-duplicate.
    pub similarity_threshold: f64,
    /// Recent titles older than this are forgotten.
    pub window_hours: i64,
    /// Capacity of the recent-titles window.
    pub recent_capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.8,
            window_hours: 24,
            recent_capacity: 100,
        }
    }
}

/// `[ingest.thresholds]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    pub min_relevance_score: f64,
    pub min_sentiment_strength: f64,
    pub min_ticker_count: usize,
    pub min_title_len: usize,
    pub min_body_len: usize,
    pub ticker_weight: f64,
    pub keyword_weight: f64,
    /// Raw weighted score that maps to relevance 1.0.
    pub relevance_saturation: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_relevance_score: 0.3,
            min_sentiment_strength: 0.2,
            min_ticker_count: 1,
            min_title_len: 10,
            min_body_len: 20,
            ticker_weight: 0.6,
            keyword_weight: 0.4,
            relevance_saturation: 10.0,
        }
    }
}

/// `[batching]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchingConfig {
    pub max_headlines_per_batch: usize,
    pub min_batch_size: usize,
    pub max_batch_wait_secs: i64,
    /// Ready batches kept for a later cycle when analysis stops early; the
    /// oldest beyond this are dropped.
    pub max_deferred_batches: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_headlines_per_batch: 5,
            min_batch_size: 2,
            max_batch_wait_secs: 300,
            max_deferred_batches: 20,
        }
    }
}

/// `[budget]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    pub max_daily_ai_calls: u32,
    /// Monthly spend ceiling in USD.
    pub max_monthly_cost: f64,
    /// Estimated cost per analysis call in USD.
    pub cost_per_call: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_daily_ai_calls: 50,
            max_monthly_cost: 20.0,
            cost_per_call: 0.02,
        }
    }
}

/// `[memory]`: pattern detection and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    pub lookback_days: i64,
    pub bias_window_days: i64,
    /// Largest gap between two signals that still continues a streak.
    pub max_gap_secs: i64,
    /// Both sides of a reversal must reach this confidence.
    pub confidence_threshold: u8,
    pub volatility_window: usize,
    /// Minimum streak length, also the minimum direction-change count for volatility.
    pub min_consecutive: usize,
    /// Volatility is only evaluated once an instrument has this many signals.
    pub min_volatility_samples: usize,
    pub bias_ratio: f64,
    pub bias_min_signals: usize,
    pub retention_days: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            lookback_days: 14,
            bias_window_days: 7,
            max_gap_secs: 3 * 86_400,
            confidence_threshold: 6,
            volatility_window: 7,
            min_consecutive: 2,
            min_volatility_samples: 4,
            bias_ratio: 0.7,
            bias_min_signals: 3,
            retention_days: 90,
        }
    }
}

/// `[alerts]`: readiness parameters per strategy and delivery retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    pub default_strategy: Strategy,
    /// Signals below this confidence are never enqueued by the pipeline.
    pub min_confidence: u8,
    pub time_window_mins: i64,
    pub time_window_max_alerts: usize,
    pub digest_interval_hours: i64,
    pub critical_confidence: u8,
    pub medium_confidence: u8,
    pub medium_batch_size: usize,
    pub medium_wait_mins: i64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub title_prefix: String,
    pub audit_retention_days: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::SmartBatch,
            min_confidence: 7,
            time_window_mins: 30,
            time_window_max_alerts: 3,
            digest_interval_hours: 20,
            critical_confidence: 9,
            medium_confidence: 7,
            medium_batch_size: 2,
            medium_wait_mins: 45,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            title_prefix: "Signals".into(),
            audit_retention_days: 7,
        }
    }
}

/// `[analysis]`: OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u8,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            model: "gpt-4o-mini".into(),
            timeout_secs: 20,
            connect_timeout_secs: 4,
            max_retries: 2,
            temperature: 0.2,
            max_tokens: 700,
        }
    }
}

/// `[notify]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.pushover.net/1/messages.json".into(),
            timeout_secs: 10,
        }
    }
}

/// `[store]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite file path, or `:memory:`.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "data/signals.db".into(),
        }
    }
}

impl PipelineConfig {
    /// Load from `$PIPELINE_CONFIG_PATH`, or `config/pipeline.toml`.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that would make a stage misbehave.
    pub fn validate(&self) -> Result<()> {
        let ing = &self.ingest;
        if ing.tracked_tickers.iter().all(|t| t.trim().is_empty()) {
            bail!("ingest.tracked_tickers must not be empty");
        }
        let (open, close) = ing.market_hours.window()?;
        if open > close {
            bail!(
                "ingest.market_hours.start ({}) is after end ({}); overnight windows are not supported",
                ing.market_hours.start,
                ing.market_hours.end
            );
        }
        unit_interval("ingest.dedup.similarity_threshold", ing.dedup.similarity_threshold)?;
        unit_interval(
            "ingest.thresholds.min_relevance_score",
            ing.thresholds.min_relevance_score,
        )?;
        unit_interval(
            "ingest.thresholds.min_sentiment_strength",
            ing.thresholds.min_sentiment_strength,
        )?;
        if ing.thresholds.relevance_saturation <= 0.0 {
            bail!("ingest.thresholds.relevance_saturation must be positive");
        }
        if ing.dedup.recent_capacity == 0 {
            bail!("ingest.dedup.recent_capacity must be at least 1");
        }

        let b = &self.batching;
        if b.min_batch_size == 0 || b.max_headlines_per_batch == 0 {
            bail!("batching sizes must be at least 1");
        }
        if b.min_batch_size > b.max_headlines_per_batch {
            bail!(
                "batching.min_batch_size ({}) exceeds max_headlines_per_batch ({})",
                b.min_batch_size,
                b.max_headlines_per_batch
            );
        }
        if b.max_deferred_batches == 0 {
            bail!("batching.max_deferred_batches must be at least 1");
        }
        if b.max_batch_wait_secs < 0 {
            bail!("batching.max_batch_wait_secs must not be negative");
        }

        if self.budget.max_monthly_cost < 0.0 || self.budget.cost_per_call < 0.0 {
            bail!("budget amounts must not be negative");
        }

        let m = &self.memory;
        if !(1..=10).contains(&m.confidence_threshold) {
            bail!("memory.confidence_threshold must be within 1..=10");
        }
        if m.volatility_window < 2 || m.min_consecutive < 2 {
            bail!("memory.volatility_window and memory.min_consecutive must be at least 2");
        }
        unit_interval("memory.bias_ratio", m.bias_ratio)?;

        let a = &self.alerts;
        if a.max_attempts == 0 {
            bail!("alerts.max_attempts must be at least 1");
        }
        if a.medium_confidence > a.critical_confidence {
            bail!("alerts.medium_confidence must not exceed alerts.critical_confidence");
        }
        // smart batching never flushes below medium_confidence
        if a.min_confidence < a.medium_confidence {
            bail!(
                "alerts.min_confidence ({}) is below alerts.medium_confidence ({})",
                a.min_confidence,
                a.medium_confidence
            );
        }
        if a.time_window_mins < 0 || a.digest_interval_hours < 0 || a.medium_wait_mins < 0 {
            bail!("alerts wait windows must not be negative");
        }
        if a.audit_retention_days < 1 {
            bail!("alerts.audit_retention_days must be at least 1");
        }

        if self.analysis.max_retries > MAX_ANALYSIS_RETRIES {
            bail!("analysis.max_retries must be at most {MAX_ANALYSIS_RETRIES}");
        }
        Ok(())
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|e| anyhow!("invalid HH:MM `{s}`: {e}"))
}

fn unit_interval(name: &str, v: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&v) {
        bail!("{name} must be within [0, 1], got {v}");
    }
    Ok(())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
