use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{Notification, Notifier};
use crate::config::NotifyConfig;
use crate::error::CollaboratorError;

pub const ENV_TOKEN: &str = "PUSHOVER_TOKEN";
pub const ENV_USER: &str = "PUSHOVER_USER";

// Pushover rejects longer messages.
const MAX_MESSAGE_CHARS: usize = 1024;

#[derive(Clone)]
pub struct PushoverNotifier {
    endpoint: String,
    token: String,
    user: String,
    client: Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct PushoverForm<'a> {
    token: &'a str,
    user: &'a str,
    title: &'a str,
    message: &'a str,
    priority: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url_title: Option<&'a str>,
}

impl PushoverNotifier {
    pub fn new(cfg: &NotifyConfig, token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            token: token.into(),
            user: user.into(),
            client: Client::new(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    /// `None` unless both `PUSHOVER_TOKEN` and `PUSHOVER_USER` are set.
    pub fn from_env(cfg: &NotifyConfig) -> Option<Self> {
        let token = std::env::var(ENV_TOKEN).ok().filter(|s| !s.trim().is_empty())?;
        let user = std::env::var(ENV_USER).ok().filter(|s| !s.trim().is_empty())?;
        Some(Self::new(cfg, token.trim(), user.trim()))
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn send(&self, n: &Notification) -> Result<(), CollaboratorError> {
        let message: String = n.message.chars().take(MAX_MESSAGE_CHARS).collect();
        let form = PushoverForm {
            token: &self.token,
            user: &self.user,
            title: &n.title,
            message: &message,
            priority: n.priority,
            url: n.url.as_deref(),
            url_title: n.url_title.as_deref(),
        };

        let rsp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout(self.timeout.as_secs())
                } else {
                    CollaboratorError::from(e)
                }
            })?;

        if let Err(e) = rsp.error_for_status_ref() {
            return Err(e.into());
        }
        debug!(title = %n.title, "pushover notification delivered");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pushover"
    }
}
