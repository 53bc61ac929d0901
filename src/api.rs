// src/api.rs
//! Read-only status endpoints served next to the cycle loop.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::pipeline::{CycleReport, Pipeline, PipelineStatus};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Mutex<Pipeline>>,
    pub last_report: Arc<RwLock<Option<CycleReport>>>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Serialize)]
struct StatsResp {
    status: PipelineStatus,
    last_cycle: Option<CycleReport>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResp>, StatusCode> {
    let status = {
        let pipeline = state.pipeline.lock().await;
        pipeline.status(Utc::now()).await.map_err(|e| {
            error!(error = ?e, "status snapshot failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
    };
    let last_cycle = state.last_report.read().await.clone();
    Ok(Json(StatsResp { status, last_cycle }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(h) => (StatusCode::OK, h.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}
