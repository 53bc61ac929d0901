// src/quotes.rs
//! Price-quote collaborator. Quotes only decorate a signal, so a failed
//! lookup degrades to an empty snapshot instead of failing the cycle.

use async_trait::async_trait;
use tracing::warn;

use crate::error::CollaboratorError;
use crate::signal::PriceSnapshot;

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Latest price for each symbol the provider knows; unknown symbols are omitted.
    async fn quotes(&self, symbols: &[String]) -> Result<PriceSnapshot, CollaboratorError>;
    fn name(&self) -> &'static str;
}

/// Provider used when no quote source is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoQuotes;

#[async_trait]
impl QuoteProvider for NoQuotes {
    async fn quotes(&self, _symbols: &[String]) -> Result<PriceSnapshot, CollaboratorError> {
        Ok(PriceSnapshot::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Fixed prices, handy for fixtures and dry runs.
#[derive(Debug, Default, Clone)]
pub struct StaticQuotes(pub PriceSnapshot);

#[async_trait]
impl QuoteProvider for StaticQuotes {
    async fn quotes(&self, symbols: &[String]) -> Result<PriceSnapshot, CollaboratorError> {
        Ok(symbols
            .iter()
            .filter_map(|s| self.0.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Snapshot for `symbols`, empty on any provider failure.
pub async fn snapshot(provider: &dyn QuoteProvider, symbols: &[String]) -> PriceSnapshot {
    if symbols.is_empty() {
        return PriceSnapshot::new();
    }
    match provider.quotes(symbols).await {
        Ok(s) => s,
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "price snapshot unavailable");
            PriceSnapshot::new()
        }
    }
}
