//! Generic webhook channel
//!
//! POSTs a fixed JSON shape to one configured URL.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::errors::AgentError;
use crate::models::notification::{NotificationEvent, NotificationKind};
use crate::notify::Channel;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    message: &'a str,
    kind: NotificationKind,
    timestamp: String,
    deployment: PayloadDeployment<'a>,
}

#[derive(Debug, Serialize)]
struct PayloadDeployment<'a> {
    project: &'a str,
    commit: &'a str,
    branch: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<&'static str>,
}

impl<'a> WebhookPayload<'a> {
    fn from_event(event: &'a NotificationEvent) -> Self {
        Self {
            title: &event.title,
            message: &event.message,
            kind: event.kind,
            timestamp: Utc::now().to_rfc3339(),
            deployment: PayloadDeployment {
                project: &event.deployment.project,
                commit: &event.deployment.commit,
                branch: &event.deployment.branch,
                status: &event.deployment.status,
                phase: event.deployment.phase.map(|p| p.as_str()),
            },
        }
    }
}

/// Render the body POSTed for `event`
pub fn payload(event: &NotificationEvent) -> serde_json::Value {
    serde_json::to_value(WebhookPayload::from_event(event)).unwrap_or_default()
}

pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), AgentError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload::from_event(event))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Webhook notification to {} returned {}", self.url, status);
            return Err(AgentError::NotifyError(format!(
                "webhook responded with {}",
                status
            )));
        }
        Ok(())
    }
}
