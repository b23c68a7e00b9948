//! Business messaging channel
//!
//! Sends a pre-approved template first. If the template send fails for any
//! reason the channel falls back to a plain text message carrying the same
//! fields, and that send decides the outcome.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::models::notification::{NotificationEvent, NotificationKind};
use crate::notify::{extract_primary_link, Channel};
use crate::utils::short_sha;

/// Fields shared by the template and the text fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFields {
    pub project: String,
    pub commit: String,
    pub branch: String,
    pub link: Option<String>,
}

impl MessageFields {
    pub fn from_event(event: &NotificationEvent) -> Self {
        Self {
            project: event.deployment.project.clone(),
            commit: short_sha(&event.deployment.commit).to_string(),
            branch: event.deployment.branch.clone(),
            link: extract_primary_link(&event.deployment, event.kind).map(str::to_string),
        }
    }

    /// Template parameters, in template order
    pub fn parameters(&self) -> Vec<String> {
        vec![
            self.project.clone(),
            self.commit.clone(),
            self.branch.clone(),
            self.link.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct TemplateMessage {
    pub to: String,
    pub template: String,
    pub language: String,
    pub parameters: Vec<String>,
}

/// Transport to the messaging provider
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    async fn send_template(&self, message: &TemplateMessage) -> Result<(), AgentError>;

    async fn send_text(&self, to: &str, body: &str) -> Result<(), AgentError>;
}

#[derive(Debug, Clone)]
pub struct MessagingOptions {
    pub recipient: String,
    pub success_template: String,
    pub failure_template: String,
    pub language: String,
}

pub struct MessagingChannel {
    transport: Arc<dyn MessagingTransport>,
    options: MessagingOptions,
}

impl MessagingChannel {
    pub fn new(transport: Arc<dyn MessagingTransport>, options: MessagingOptions) -> Self {
        Self { transport, options }
    }

    fn template_for(&self, event: &NotificationEvent) -> TemplateMessage {
        let template = match event.kind {
            NotificationKind::Error => &self.options.failure_template,
            _ => &self.options.success_template,
        };
        TemplateMessage {
            to: self.options.recipient.clone(),
            template: template.clone(),
            language: self.options.language.clone(),
            parameters: MessageFields::from_event(event).parameters(),
        }
    }
}

/// Plain text body used when the template send fails
pub fn fallback_text(event: &NotificationEvent) -> String {
    let fields = MessageFields::from_event(event);
    let mut text = format!(
        "{}\n{}\nproject: {}\ncommit: {}\nbranch: {}",
        event.title, event.message, fields.project, fields.commit, fields.branch
    );
    if let Some(link) = fields.link {
        text.push('\n');
        text.push_str(&link);
    }
    text
}

#[async_trait]
impl Channel for MessagingChannel {
    fn name(&self) -> &str {
        "messaging"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), AgentError> {
        let template = self.template_for(event);
        match self.transport.send_template(&template).await {
            Ok(()) => {
                debug!("Template {} sent", template.template);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Template {} failed, falling back to text: {}",
                    template.template, e
                );
                self.transport
                    .send_text(&self.options.recipient, &fallback_text(event))
                    .await
            }
        }
    }
}

/// Cloud API style transport over HTTPS
pub struct HttpMessagingTransport {
    client: reqwest::Client,
    api_url: String,
    token: SecretString,
    product: String,
}

impl HttpMessagingTransport {
    pub fn new(
        api_url: impl Into<String>,
        token: SecretString,
        product: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            token,
            product: product.into(),
        })
    }

    async fn post(&self, body: serde_json::Value) -> Result<(), AgentError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        Err(AgentError::NotifyError(format!(
            "messaging provider responded with {}: {}",
            status, detail
        )))
    }
}

#[async_trait]
impl MessagingTransport for HttpMessagingTransport {
    async fn send_template(&self, message: &TemplateMessage) -> Result<(), AgentError> {
        let parameters: Vec<_> = message
            .parameters
            .iter()
            .map(|p| json!({ "type": "text", "text": p }))
            .collect();
        self.post(json!({
            "messaging_product": self.product,
            "to": message.to,
            "type": "template",
            "template": {
                "name": message.template,
                "language": { "code": message.language },
                "components": [{ "type": "body", "parameters": parameters }],
            },
        }))
        .await
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<(), AgentError> {
        self.post(json!({
            "messaging_product": self.product,
            "to": to,
            "type": "text",
            "text": { "body": body },
        }))
        .await
    }
}
