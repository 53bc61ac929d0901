use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static DESCRIBED: OnceCell<()> = OnceCell::new();
static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Register descriptions for every pipeline metric. Safe to call repeatedly.
pub fn ensure_metrics_described() {
    DESCRIBED.get_or_init(|| {
        describe_counter!("ingest_items_total", "Raw news items received by the filter.");
        describe_counter!("ingest_accepted_total", "News items accepted by the filter.");
        describe_counter!("ingest_rejected_total", "News items rejected, labelled by reason.");
        describe_counter!("ingest_errored_total", "Malformed raw items skipped.");
        describe_counter!("ingest_events_total", "Raw items read from a source.");
        describe_histogram!("ingest_parse_ms", Unit::Milliseconds, "Time to read and parse a source.");
        describe_counter!("batches_ready_total", "Batches released to analysis.");
        describe_counter!("analysis_calls_total", "Analysis collaborator calls made.");
        describe_counter!("analysis_failures_total", "Analysis calls that failed or returned nothing usable.");
        describe_counter!("signals_stored_total", "Signals persisted to memory.");
        describe_counter!("alerts_enqueued_total", "Alerts newly queued for delivery.");
        describe_counter!("alert_batches_sent_total", "Alert batches delivered, by strategy.");
        describe_counter!(
            "alert_delivery_failures_total",
            "Alert batches that exhausted delivery retries, by strategy."
        );
        describe_gauge!("pipeline_last_cycle_ts", Unit::Seconds, "Unix time of the last completed cycle.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process and describe all metrics.
    pub fn init() -> Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("installing prometheus recorder")
            })?
            .clone();
        ensure_metrics_described();
        gauge!("pipeline_last_cycle_ts").set(0.0);
        Ok(Self { handle })
    }
}
