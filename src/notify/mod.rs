//! Delivery collaborator boundary. A notifier reports success or failure only;
//! retry policy belongs to the alert engine.

pub mod pushover;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CollaboratorError;

pub use pushover::PushoverNotifier;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// 0 = normal, 1 = high.
    pub priority: i8,
    pub url: Option<String>,
    pub url_title: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, n: &Notification) -> Result<(), CollaboratorError>;
    fn name(&self) -> &'static str;
}

/// Logs notifications instead of delivering them. Used when no push
/// credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, n: &Notification) -> Result<(), CollaboratorError> {
        tracing::info!(title = %n.title, priority = n.priority, "notification (log only)\n{}", n.message);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
