// src/batch.rs
//! Batch assembler: groups accepted news items that share a ticker or keyword
//! so one analysis call can cover several headlines.
//!
//! State per group key: pending → ready → flushed (handed to the caller and
//! dropped from pending). A batch is ready when it is full, or when it has at
//! least the minimum size and has waited at least `max_batch_wait_secs`.
//! Every call sweeps all pending batches for the age condition.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::BatchingConfig;
use crate::ingest::NewsItem;

/// Multi-source validation metrics of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchQuality {
    pub source_diversity: usize,
    pub avg_source_weight: f64,
    pub avg_relevance: f64,
    pub avg_sentiment: f64,
    /// 1 − std-dev of the non-trivial sentiments (|s| > 0.1); 1.0 with fewer than two.
    pub sentiment_consistency: f64,
    /// Both clearly positive and clearly negative items are present.
    pub contradiction: bool,
    /// Mean of five factors, in [0,1].
    pub quality_score: f64,
}

impl BatchQuality {
    pub fn compute(items: &[NewsItem]) -> Self {
        if items.is_empty() {
            return Self::default();
        }
        let n = items.len() as f64;

        let mut sources: Vec<&str> = items.iter().map(|i| i.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();
        let source_diversity = sources.len();

        let avg_source_weight = items.iter().map(NewsItem::source_weight).sum::<f64>() / n;
        let avg_relevance = items.iter().map(|i| i.relevance_score).sum::<f64>() / n;
        let avg_sentiment = items.iter().map(|i| i.sentiment_score).sum::<f64>() / n;

        let sentiments: Vec<f64> = items
            .iter()
            .map(|i| i.sentiment_score)
            .filter(|s| s.abs() > 0.1)
            .collect();
        let sentiment_consistency = if sentiments.len() > 1 {
            let m = sentiments.iter().sum::<f64>() / sentiments.len() as f64;
            let var = sentiments.iter().map(|s| (s - m).powi(2)).sum::<f64>() / sentiments.len() as f64;
            (1.0 - var.sqrt()).max(0.0)
        } else {
            1.0
        };
        let contradiction =
            sentiments.iter().any(|s| *s > 0.2) && sentiments.iter().any(|s| *s < -0.2);

        let factors = [
            (avg_source_weight / 5.0).min(1.0),
            avg_relevance,
            sentiment_consistency,
            (source_diversity as f64 / 3.0).min(1.0),
            if contradiction { 0.5 } else { 1.0 },
        ];
        let quality_score = factors.iter().sum::<f64>() / factors.len() as f64;

        Self {
            source_diversity,
            avg_source_weight,
            avg_relevance,
            avg_sentiment,
            sentiment_consistency,
            contradiction,
            quality_score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    pub group_key: String,
    pub items: Vec<NewsItem>,
    pub created_at: DateTime<Utc>,
    /// Union over items, first-seen order.
    pub tickers: Vec<String>,
    pub keywords: Vec<String>,
    pub quality: BatchQuality,
}

impl Batch {
    fn new(batch_id: String, group_key: String, items: Vec<NewsItem>, created_at: DateTime<Utc>) -> Self {
        let mut b = Self {
            batch_id,
            group_key,
            items,
            created_at,
            tickers: Vec::new(),
            keywords: Vec::new(),
            quality: BatchQuality::default(),
        };
        b.refresh();
        b
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    fn refresh(&mut self) {
        self.tickers = union(self.items.iter().map(|i| i.tickers.as_slice()));
        self.keywords = union(self.items.iter().map(|i| i.keywords.as_slice()));
        self.quality = BatchQuality::compute(&self.items);
    }

    /// Item texts plus source metadata, as handed to the analysis collaborator.
    pub fn combined_text(&self) -> String {
        let mut out = Vec::with_capacity(self.items.len() * 7);
        for item in &self.items {
            out.push(format!(
                "Source: {} (Priority: {}, Category: {})",
                item.source,
                item.source_profile.priority,
                item.source_profile.category.as_str()
            ));
            out.push(format!("Title: {}", item.title));
            out.push(format!("Content: {}", item.content));
            out.push(format!("Tickers: {}", item.tickers.join(", ")));
            out.push(format!("Keywords: {}", item.keywords.join(", ")));
            out.push(format!(
                "Sentiment: {:.2}, Relevance: {:.2}",
                item.sentiment_score, item.relevance_score
            ));
            out.push("---".to_string());
        }
        out.join("\n")
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        let mut tickers = self.tickers.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
        if self.tickers.len() > 3 {
            tickers.push_str(&format!(" (+{} more)", self.tickers.len() - 3));
        }
        let mut validation = format!(
            "quality {:.2}, sources {}",
            self.quality.quality_score, self.quality.source_diversity
        );
        if self.quality.contradiction {
            validation.push_str(", contradictions");
        }
        format!(
            "batch {}: {} items, tickers: {} ({})",
            self.batch_id,
            self.size(),
            tickers,
            validation
        )
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchStats {
    pub pending_batches: usize,
    pub pending_items: usize,
    pub max_batch_size: usize,
    pub min_batch_size: usize,
    pub max_wait_secs: i64,
}

#[derive(Debug)]
pub struct BatchAssembler {
    cfg: BatchingConfig,
    pending: HashMap<String, Batch>,
    seq: u64,
}

impl BatchAssembler {
    pub fn new(cfg: &BatchingConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            pending: HashMap::new(),
            seq: 0,
        }
    }

    /// Grouping key: primary ticker, else primary keyword, else a generic bucket.
    pub fn group_key(item: &NewsItem) -> String {
        if let Some(t) = item.tickers.first() {
            format!("ticker_{t}")
        } else if let Some(k) = item.keywords.first() {
            format!("keyword_{k}")
        } else {
            "general".to_string()
        }
    }

    /// Add items observed at `now` and return every batch that became ready.
    pub fn add_items(&mut self, items: Vec<NewsItem>, now: DateTime<Utc>) -> Vec<Batch> {
        let incoming = items.len();
        let mut ready = Vec::new();

        // group, keeping first-seen key order
        let mut groups: Vec<(String, Vec<NewsItem>)> = Vec::new();
        for item in items {
            let key = Self::group_key(&item);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, v)) => v.push(item),
                None => groups.push((key, vec![item])),
            }
        }

        for (key, items) in groups {
            match self.pending.get_mut(&key) {
                Some(batch) => {
                    debug!(group = %key, added = items.len(), "merging into pending batch");
                    batch.items.extend(items);
                    batch.refresh();
                }
                None => {
                    let id = self.next_id(&key, now);
                    self.pending.insert(key.clone(), Batch::new(id, key.clone(), items, now));
                }
            }
            self.release_full(&key, now, &mut ready);
        }

        ready.extend(self.sweep(now));

        if !ready.is_empty() || incoming > 0 {
            info!(ready = ready.len(), items = incoming, pending = self.pending.len(), "batching pass");
        }
        counter!("batches_ready_total").increment(ready.len() as u64);
        ready
    }

    /// Promote every pending batch that meets the minimum size and has waited long enough.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<Batch> {
        let mut keys: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, b)| self.is_ready(b, now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();

        let mut out = Vec::with_capacity(keys.len());
        for k in keys {
            if let Some(b) = self.pending.remove(&k) {
                debug!(batch_id = %b.batch_id, size = b.size(), "pending batch aged out");
                out.push(b);
            }
        }
        out
    }

    /// Full (size ≥ max) or minimum-size-and-aged.
    pub fn is_ready(&self, batch: &Batch, now: DateTime<Utc>) -> bool {
        let size = batch.size();
        if size >= self.cfg.max_headlines_per_batch {
            return true;
        }
        size >= self.cfg.min_batch_size
            && now - batch.created_at >= Duration::seconds(self.cfg.max_batch_wait_secs)
    }

    pub fn pending_batches(&self) -> Vec<&Batch> {
        let mut v: Vec<&Batch> = self.pending.values().collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.batch_id.cmp(&b.batch_id)));
        v
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            pending_batches: self.pending.len(),
            pending_items: self.pending.values().map(Batch::size).sum(),
            max_batch_size: self.cfg.max_headlines_per_batch,
            min_batch_size: self.cfg.min_batch_size,
            max_wait_secs: self.cfg.max_batch_wait_secs,
        }
    }

    /// Cut full chunks off the pending batch for `key`; the remainder stays pending.
    fn release_full(&mut self, key: &str, now: DateTime<Utc>, ready: &mut Vec<Batch>) {
        let max = self.cfg.max_headlines_per_batch.max(1);
        loop {
            let Some(batch) = self.pending.get_mut(key) else {
                return;
            };
            if batch.size() < max {
                return;
            }
            if batch.size() == max {
                if let Some(b) = self.pending.remove(key) {
                    ready.push(b);
                }
                return;
            }

            let rest = batch.items.split_off(max);
            batch.refresh();
            let created_at = batch.created_at;
            let id = self.next_id(key, now);
            if let Some(full) = self.pending.insert(
                key.to_string(),
                Batch::new(id, key.to_string(), rest, created_at),
            ) {
                ready.push(full);
            }
        }
    }

    fn next_id(&mut self, key: &str, now: DateTime<Utc>) -> String {
        self.seq += 1;
        format!("{key}_{}_{}", now.timestamp(), self.seq)
    }
}

fn union<'a>(lists: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for list in lists {
        for s in list {
            if !out.contains(s) {
                out.push(s.clone());
            }
        }
    }
    out
}
