//! Error taxonomy shared by the pipeline stages.
//!
//! Application seams (config loading, the store, `main`) use `anyhow` with context.
//! The enums here cover the failures that callers branch on.

use thiserror::Error;

/// A raw item that cannot be turned into a `NewsItem`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unparseable timestamp `{0}`")]
    InvalidTimestamp(String),
}

/// Failure talking to an external collaborator (analysis, delivery, quotes).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("http status {status}")]
    Http { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unusable response: {0}")]
    Parse(String),
    #[error("collaborator not configured: {0}")]
    NotConfigured(&'static str),
}

impl CollaboratorError {
    /// Timeouts, 5xx, 429 and transport failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Http { status } => *status == 429 || *status >= 500,
            Self::Parse(_) | Self::NotConfigured(_) => false,
        }
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(0);
        }
        if let Some(status) = e.status() {
            return Self::Http {
                status: status.as_u16(),
            };
        }
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CollaboratorError::Timeout(5).is_transient());
        assert!(CollaboratorError::Http { status: 503 }.is_transient());
        assert!(CollaboratorError::Http { status: 429 }.is_transient());
        assert!(!CollaboratorError::Http { status: 400 }.is_transient());
        assert!(!CollaboratorError::Parse("x".into()).is_transient());
    }
}
