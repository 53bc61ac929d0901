//! Scheduled-cycle entrypoint.
//!
//! Runs one pipeline cycle over `PIPELINE_INPUT` (a JSON array of raw news
//! items) and exits. With `CYCLE_INTERVAL_SECS` set it keeps cycling, re-reading
//! the input each time, and serves the status router on `STATUS_ADDR`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{error, info, warn};

use news_signal_pipeline::analyze::ai_adapter::ENV_API_KEY;
use news_signal_pipeline::analyze::{AnalysisOutcome, AnalysisRequest, Analyzer, OpenAiAnalyzer};
use news_signal_pipeline::api::{self, AppState};
use news_signal_pipeline::config::PipelineConfig;
use news_signal_pipeline::ingest::providers::JsonFileSource;
use news_signal_pipeline::ingest::{NewsSource, RawNewsItem};
use news_signal_pipeline::metrics::Metrics;
use news_signal_pipeline::notify::{LogNotifier, Notifier, PushoverNotifier};
use news_signal_pipeline::pipeline::Pipeline;
use news_signal_pipeline::quotes::NoQuotes;
use news_signal_pipeline::store::Store;
use news_signal_pipeline::{error::CollaboratorError, telemetry};

const DEFAULT_STATUS_ADDR: &str = "127.0.0.1:9090";

/// Stand-in analyzer when no API key is configured: every call fails, so
/// batches are counted as analysis failures instead of producing signals.
struct Unconfigured;

#[async_trait::async_trait]
impl Analyzer for Unconfigured {
    async fn analyze(&self, _req: &AnalysisRequest) -> Result<AnalysisOutcome, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(ENV_API_KEY))
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}

async fn read_input(source: Option<&JsonFileSource>) -> Vec<RawNewsItem> {
    let Some(src) = source else {
        return Vec::new();
    };
    match src.fetch_latest().await {
        Ok(items) => items,
        Err(e) => {
            error!(error = ?e, source = src.name(), "reading pipeline input failed");
            Vec::new()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init();

    let cfg = PipelineConfig::load_default()?;
    let store = Store::open(&cfg.store.path).await?;
    let metrics = Metrics::init()
        .map_err(|e| warn!(error = ?e, "prometheus recorder unavailable"))
        .ok();

    let analyzer: Arc<dyn Analyzer> = match OpenAiAnalyzer::from_env(&cfg.analysis)? {
        Some(a) => Arc::new(a),
        None => {
            warn!("OPENAI_API_KEY not set; batches will not be analyzed");
            Arc::new(Unconfigured)
        }
    };
    let notifier: Arc<dyn Notifier> = match PushoverNotifier::from_env(&cfg.notify) {
        Some(n) => Arc::new(n),
        None => {
            warn!("PUSHOVER_TOKEN/PUSHOVER_USER not set; notifications are logged only");
            Arc::new(LogNotifier)
        }
    };

    let source = std::env::var("PIPELINE_INPUT").ok().map(JsonFileSource::from_path);
    if source.is_none() {
        warn!("PIPELINE_INPUT not set; cycles run with no new items");
    }
    let interval = std::env::var("CYCLE_INTERVAL_SECS")
        .ok()
        .map(|v| v.trim().parse::<u64>())
        .transpose()
        .context("CYCLE_INTERVAL_SECS must be a number of seconds")?;

    let pipeline = Pipeline::new(cfg, store, analyzer, notifier, Arc::new(NoQuotes))?;
    let cancel = Arc::new(AtomicBool::new(false));

    let Some(secs) = interval else {
        let mut pipeline = pipeline;
        let raw = read_input(source.as_ref()).await;
        let report = pipeline.run_cycle(&raw, Utc::now(), &cancel).await;
        let maintenance = pipeline.maintenance(Utc::now()).await;
        info!(report = %serde_json::to_string(&report)?, "cycle report");
        info!(maintenance = %serde_json::to_string(&maintenance)?, "maintenance report");
        return Ok(());
    };

    let state = AppState {
        pipeline: Arc::new(Mutex::new(pipeline)),
        last_report: Arc::new(RwLock::new(None)),
        metrics: metrics.map(|m| m.handle),
    };

    let addr = std::env::var("STATUS_ADDR").unwrap_or_else(|_| DEFAULT_STATUS_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding status listener on {addr}"))?;
    info!(%addr, interval_secs = secs, "status router listening");
    let app = api::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = ?e, "status server stopped");
        }
    });

    let shutdown = Arc::new(Notify::new());
    {
        let cancel = cancel.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested; finishing current stage");
                cancel.store(true, Ordering::SeqCst);
                shutdown.notify_one();
            }
        });
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    while !cancel.load(Ordering::SeqCst) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.notified() => break,
        }
        let raw = read_input(source.as_ref()).await;
        let report = {
            let mut pipeline = state.pipeline.lock().await;
            let report = pipeline.run_cycle(&raw, Utc::now(), &cancel).await;
            pipeline.maintenance(Utc::now()).await;
            report
        };
        *state.last_report.write().await = Some(report);
    }
    info!("cycle loop stopped");
    Ok(())
}
