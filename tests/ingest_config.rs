// tests/ingest_config.rs
use news_signal_pipeline::alerts::Strategy;
use news_signal_pipeline::config::{PipelineConfig, SourceCategory};
use std::fs;
use std::path::Path;

#[test]
fn shipped_config_loads_and_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/pipeline.toml");
    let cfg = PipelineConfig::load_from_file(&path).unwrap();

    assert_eq!(cfg.ingest.timezone, chrono_tz::America::New_York);
    assert_eq!(cfg.ingest.max_daily_headlines, 20);
    assert_eq!(cfg.ingest.tracked_tickers.len(), 10);
    assert_eq!(cfg.batching.max_headlines_per_batch, 5);
    assert_eq!(cfg.alerts.default_strategy, Strategy::SmartBatch);
    assert_eq!(cfg.memory.lookback_days, 14);

    let reuters = cfg.ingest.sources.lookup("Reuters");
    assert_eq!(reuters.priority, 5);
    assert_eq!(reuters.category, SourceCategory::Financial);
}

#[test]
fn broken_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("pipeline.toml");
    fs::write(&p, "[batching]\nmin_batch_size = \"two\"\n").unwrap();

    let err = PipelineConfig::load_from_file(&p).unwrap_err();
    assert!(format!("{err:#}").contains("pipeline.toml"));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(PipelineConfig::load_from_file(&dir.path().join("absent.toml")).is_err());
}
