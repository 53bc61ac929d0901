// src/ingest/providers/json_file.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::path::{Path, PathBuf};

use crate::ingest::types::{NewsSource, RawNewsItem};

/// Reads an ordered JSON array of raw news items, either from a file on each
/// fetch or from an inline fixture.
pub struct JsonFileSource {
    path: Option<PathBuf>,
    fixture: Option<String>,
}

impl JsonFileSource {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            fixture: None,
        }
    }

    pub fn from_fixture(content: &str) -> Self {
        Self {
            path: None,
            fixture: Some(content.to_string()),
        }
    }

    async fn read_content(&self) -> Result<String> {
        if let Some(s) = &self.fixture {
            return Ok(s.clone());
        }
        match &self.path {
            Some(p) => tokio::fs::read_to_string(p)
                .await
                .with_context(|| format!("reading news input {}", p.display())),
            None => Ok("[]".to_string()),
        }
    }
}

#[async_trait]
impl NewsSource for JsonFileSource {
    async fn fetch_latest(&self) -> Result<Vec<RawNewsItem>> {
        let t0 = std::time::Instant::now();

        let content = self.read_content().await?;
        let items: Vec<RawNewsItem> =
            serde_json::from_str(&content).context("parsing news input json")?;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_events_total").increment(items.len() as u64);

        Ok(items)
    }

    fn name(&self) -> &'static str {
        "json_file"
    }
}
