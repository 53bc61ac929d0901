//! OpenAI-compatible chat-completions analyzer.
//!
//! Connect and request timeouts come from `[analysis]`; transient failures
//! (timeouts, 429, 5xx, transport) are retried with exponential backoff up to
//! `max_retries` extra attempts. The API key is read from `OPENAI_API_KEY`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{build_prompt, parse_response, AnalysisOutcome, AnalysisRequest, Analyzer};
use crate::config::{AnalysisConfig, MAX_ANALYSIS_RETRIES};
use crate::error::CollaboratorError;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";

const SYSTEM_PROMPT: &str =
    "You are an ETF signal analyst. Reply with a single JSON object and nothing else.";

pub struct OpenAiAnalyzer {
    http: Client,
    api_key: String,
    cfg: AnalysisConfig,
    backoff_base: Duration,
}

impl OpenAiAnalyzer {
    pub fn new(cfg: &AnalysisConfig, api_key: impl Into<String>) -> Result<Self, CollaboratorError> {
        let http = Client::builder()
            .user_agent(concat!("news-signal-pipeline/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            cfg: cfg.clone(),
            backoff_base: Duration::from_millis(500),
        })
    }

    /// Build from `OPENAI_API_KEY`; `None` when the key is absent.
    pub fn from_env(cfg: &AnalysisConfig) -> Result<Option<Self>, CollaboratorError> {
        match std::env::var(ENV_API_KEY) {
            Ok(k) if !k.trim().is_empty() => Self::new(cfg, k.trim()).map(Some),
            _ => Ok(None),
        }
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    async fn call_once(&self, prompt: &str) -> Result<String, CollaboratorError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.cfg.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.cfg.temperature,
            max_tokens: self.cfg.max_tokens,
        };

        let resp = self
            .http
            .post(&self.cfg.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CollaboratorError::Http {
                status: status.as_u16(),
            });
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse(e.to_string()))?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn classify(&self, e: reqwest::Error) -> CollaboratorError {
        if e.is_timeout() {
            CollaboratorError::Timeout(self.cfg.timeout_secs)
        } else {
            CollaboratorError::from(e)
        }
    }
}

/// `base * 2^(attempt-1)`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(&self, req: &AnalysisRequest) -> Result<AnalysisOutcome, CollaboratorError> {
        if self.api_key.is_empty() {
            return Err(CollaboratorError::NotConfigured(ENV_API_KEY));
        }
        let prompt = build_prompt(req);

        let max_retries = u32::from(self.cfg.max_retries.min(MAX_ANALYSIS_RETRIES));
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.call_once(&prompt).await {
                Ok(content) => {
                    debug!(batch_id = %req.batch_id, attempt, "analysis response received");
                    return Ok(parse_response(&content));
                }
                Err(e) if e.is_transient() && attempt <= max_retries => {
                    warn!(batch_id = %req.batch_id, attempt, error = %e, "analysis call failed, retrying");
                    tokio::time::sleep(backoff_delay(self.backoff_base, attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
