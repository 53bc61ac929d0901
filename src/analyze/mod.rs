// src/analyze/mod.rs
//! Analysis collaborator boundary: a ready batch goes in, a structured signal
//! (or an explicit "not relevant") comes out.

pub mod ai_adapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CollaboratorError;
use crate::signal::Direction;

pub use ai_adapter::OpenAiAnalyzer;

/// What the analysis collaborator receives for one batch.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub batch_id: String,
    /// Combined item texts with source metadata.
    pub text: String,
    pub tickers: Vec<String>,
    pub keywords: Vec<String>,
    /// Narrative from signal memory, if any.
    pub context: Option<String>,
    /// Latest price per instrument, if any.
    pub prices: Vec<(String, f64)>,
}

/// Structured analysis of a relevant batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub direction: Direction,
    /// 1..=10
    pub confidence: u8,
    pub etfs: Vec<String>,
    pub reasoning: String,
    pub sector: String,
    pub market_impact: String,
    pub strategic_advice: String,
    pub coaching_tone: String,
    pub risk_factors: String,
    pub opportunity_thesis: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Signal(AnalysisResult),
    NotRelevant,
    /// The response could not be turned into a signal.
    Unusable(String),
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, req: &AnalysisRequest) -> Result<AnalysisOutcome, CollaboratorError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct WireAnalysis {
    #[serde(default)]
    relevance: Option<String>,
    #[serde(default)]
    signal: Option<String>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    affected_etfs: Vec<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    sector: String,
    #[serde(default)]
    market_impact: String,
    #[serde(default)]
    strategic_advice: String,
    #[serde(default)]
    coaching_tone: String,
    #[serde(default)]
    risk_factors: String,
    #[serde(default)]
    opportunity_thesis: String,
}

/// Parse the collaborator's text reply. Code fences and prose around the JSON
/// object are tolerated; anything else is `Unusable`.
pub fn parse_response(content: &str) -> AnalysisOutcome {
    let cleaned = content.replace("```json", "").replace("```", "");
    let json = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(a), Some(b)) if a < b => &cleaned[a..=b],
        _ => {
            if cleaned.to_ascii_lowercase().contains("not_financial") {
                return AnalysisOutcome::NotRelevant;
            }
            return AnalysisOutcome::Unusable("no json object in response".into());
        }
    };

    let wire: WireAnalysis = match serde_json::from_str(json) {
        Ok(w) => w,
        Err(e) => return AnalysisOutcome::Unusable(format!("invalid json: {e}")),
    };

    if wire
        .relevance
        .as_deref()
        .is_some_and(|r| r.eq_ignore_ascii_case("not_financial"))
    {
        return AnalysisOutcome::NotRelevant;
    }

    let Some(direction) = wire.signal.as_deref().and_then(|s| s.parse::<Direction>().ok()) else {
        return AnalysisOutcome::Unusable("missing or unknown signal direction".into());
    };
    let confidence = match wire.confidence.as_ref().and_then(confidence_value) {
        Some(c) => c,
        None => return AnalysisOutcome::Unusable("missing confidence".into()),
    };

    let etfs = wire
        .affected_etfs
        .iter()
        .map(|e| e.trim().to_ascii_uppercase())
        .filter(|e| !e.is_empty())
        .fold(Vec::new(), |mut acc: Vec<String>, e| {
            if !acc.contains(&e) {
                acc.push(e);
            }
            acc
        });

    debug!(%direction, confidence, etfs = ?etfs, "analysis parsed");
    AnalysisOutcome::Signal(AnalysisResult {
        direction,
        confidence,
        etfs,
        reasoning: wire.reasoning,
        sector: wire.sector,
        market_impact: wire.market_impact,
        strategic_advice: wire.strategic_advice,
        coaching_tone: wire.coaching_tone,
        risk_factors: wire.risk_factors,
        opportunity_thesis: wire.opportunity_thesis,
    })
}

/// Numbers or numeric strings, rounded and clamped into 1..=10.
fn confidence_value(v: &serde_json::Value) -> Option<u8> {
    let f = match v {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !f.is_finite() {
        return None;
    }
    Some(f.round().clamp(1.0, 10.0) as u8)
}

/// Prompt sent to a chat-completions analyzer.
pub fn build_prompt(req: &AnalysisRequest) -> String {
    let prices = if req.prices.is_empty() {
        "No price data".to_string()
    } else {
        req.prices
            .iter()
            .map(|(s, p)| format!("- {s}: ${p:.2}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        r#"You are a tactical ETF strategist. Turn the news batch below into one ETF positioning signal.

PATTERN MEMORY:
{context}

MARKET SNAPSHOT:
{prices}

TRACKED TICKERS: {tickers}
KEYWORDS: {keywords}

NEWS BATCH:
{text}

If this content is NOT relevant to thematic ETF investing, return:
{{"relevance": "not_financial", "confidence": 0}}

Otherwise return only this JSON object:
{{
  "relevance": "financial",
  "sector": "Defense|AI|CleanTech|Volatility|Uranium|Broad Market",
  "signal": "Bullish|Bearish|Neutral",
  "confidence": 1-10,
  "affected_etfs": ["ITA", "ICLN"],
  "reasoning": "Short rationale for signal",
  "market_impact": "Brief on broader ETF strategy",
  "strategic_advice": "Tactical recommendations",
  "coaching_tone": "Professional insight with momentum focus",
  "risk_factors": "Key risks to monitor",
  "opportunity_thesis": "Thematic investment thesis"
}}"#,
        context = req.context.as_deref().unwrap_or("None"),
        prices = prices,
        tickers = req.tickers.join(", "),
        keywords = req.keywords.join(", "),
        text = req.text,
    )
}
