// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use http::{Request, StatusCode};
use tokio::sync::{Mutex, RwLock};
use tower::ServiceExt;

use news_signal_pipeline::analyze::{AnalysisOutcome, AnalysisRequest, Analyzer};
use news_signal_pipeline::api::{self, AppState};
use news_signal_pipeline::error::CollaboratorError;
use news_signal_pipeline::metrics::Metrics;
use news_signal_pipeline::notify::LogNotifier;
use news_signal_pipeline::quotes::NoQuotes;
use news_signal_pipeline::store::Store;
use news_signal_pipeline::{Pipeline, PipelineConfig};

struct Silent;

#[async_trait::async_trait]
impl Analyzer for Silent {
    async fn analyze(&self, _req: &AnalysisRequest) -> Result<AnalysisOutcome, CollaboratorError> {
        Ok(AnalysisOutcome::NotRelevant)
    }

    fn name(&self) -> &'static str {
        "silent"
    }
}

#[tokio::test]
async fn recorder_installs_once_and_is_served_on_metrics() {
    let _first = Metrics::init().expect("install recorder");
    // a second init reuses the installed recorder
    let second = Metrics::init().expect("reuse recorder");

    metrics::counter!("signals_stored_total").increment(2);
    metrics::counter!("ingest_rejected_total", "reason" => "duplicate_content").increment(1);

    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        Store::in_memory().await.unwrap(),
        Arc::new(Silent),
        Arc::new(LogNotifier),
        Arc::new(NoQuotes),
    )
    .unwrap();
    let app = api::router(AppState {
        pipeline: Arc::new(Mutex::new(pipeline)),
        last_report: Arc::new(RwLock::new(None)),
        metrics: Some(second.handle.clone()),
    });

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    for needle in [
        "signals_stored_total 2",
        "ingest_rejected_total{reason=\"duplicate_content\"} 1",
        "pipeline_last_cycle_ts",
        "# HELP signals_stored_total Signals persisted to memory.",
    ] {
        assert!(text.contains(needle), "exposition missing '{needle}'\n{text}");
    }
}
