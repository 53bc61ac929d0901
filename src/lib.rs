// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod alerts;
pub mod analyze;
pub mod api;
pub mod batch;
pub mod budget;
pub mod config;
pub mod error;
pub mod ingest;
pub mod memory;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod quotes;
pub mod signal;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::PipelineConfig;
pub use crate::pipeline::{CycleReport, Pipeline};
