// tests/api_http.rs
//
// Status router exercised in-process via tower::ServiceExt::oneshot.

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value as Json;
use tokio::sync::{Mutex, RwLock};
use tower::ServiceExt as _;

use news_signal_pipeline::analyze::{AnalysisOutcome, AnalysisRequest, Analyzer};
use news_signal_pipeline::api::{self, AppState};
use news_signal_pipeline::error::CollaboratorError;
use news_signal_pipeline::notify::LogNotifier;
use news_signal_pipeline::quotes::NoQuotes;
use news_signal_pipeline::store::Store;
use news_signal_pipeline::{CycleReport, Pipeline, PipelineConfig};

const BODY_LIMIT: usize = 1024 * 1024;

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

async fn test_router(last: Option<CycleReport>) -> Router {
    let store = Store::in_memory().await.unwrap();
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        store,
        Arc::new(Silent),
        Arc::new(LogNotifier),
        Arc::new(NoQuotes),
    )
    .unwrap();
    api::router(AppState {
        pipeline: Arc::new(Mutex::new(pipeline)),
        last_report: Arc::new(RwLock::new(last)),
        metrics: None,
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let resp = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn health_returns_ok() {
    let (status, body) = get(test_router(None).await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn stats_reports_stage_snapshots() {
    let (status, body) = get(test_router(None).await, "/stats").await;
    assert_eq!(status, StatusCode::OK);

    let v: Json = serde_json::from_str(&body).unwrap();
    let s = &v["status"];
    assert_eq!(s["filter"]["max_daily_headlines"], 20);
    assert_eq!(s["batches"]["pending_batches"], 0);
    assert_eq!(s["pending"], serde_json::json!([]));
    assert_eq!(s["deferred_batches"], 0);
    assert_eq!(s["memory"]["total_signals"], 0);
    assert_eq!(s["costs"]["max_daily_calls"], 50);
    assert_eq!(s["alerts"]["pending"]["smart_batch"], 0);
    assert!(v["last_cycle"].is_null());
}

#[tokio::test]
async fn stats_includes_last_cycle_when_present() {
    let report = CycleReport {
        batches_ready: 3,
        ..CycleReport::default()
    };
    let (status, body) = get(test_router(Some(report)).await, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(v["last_cycle"]["batches_ready"], 3);
    assert_eq!(v["last_cycle"]["cancelled"], false);
}

#[tokio::test]
async fn metrics_is_404_without_a_recorder() {
    let (status, _) = get(test_router(None).await, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
