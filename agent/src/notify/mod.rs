//! Notification fan-out
//!
//! Every enabled channel receives each event concurrently. The router waits
//! for all of them and returns one [`ChannelResult`] per channel; a failing,
//! slow or panicking channel never shortens the result set or delays the
//! others beyond the per-channel timeout.

pub mod console;
pub mod desktop;
pub mod messaging;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::models::notification::{
    ChannelResult, DeploymentInfo, NotificationEvent, NotificationKind,
};

/// One delivery mechanism
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &NotificationEvent) -> Result<(), AgentError>;
}

/// Fans events out to every enabled channel
pub struct NotificationRouter {
    channels: Vec<Arc<dyn Channel>>,
    timeout: Duration,
}

impl NotificationRouter {
    pub fn new(channels: Vec<Arc<dyn Channel>>, timeout: Duration) -> Self {
        Self { channels, timeout }
    }

    /// Names of the enabled channels, in dispatch order
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Dispatch to all channels and wait for every outcome
    pub async fn send(&self, event: &NotificationEvent) -> Vec<ChannelResult> {
        let event = Arc::new(event.clone());
        let timeout = self.timeout;

        let handles = self.channels.iter().map(|channel| {
            let channel = channel.clone();
            let event = event.clone();
            let name = channel.name().to_string();
            let handle = tokio::spawn(async move {
                match tokio::time::timeout(timeout, channel.send(&event)).await {
                    Ok(Ok(())) => ChannelResult::ok(channel.name()),
                    Ok(Err(e)) => ChannelResult::failed(channel.name(), e.to_string()),
                    Err(_) => ChannelResult::failed(
                        channel.name(),
                        format!("timed out after {:?}", timeout),
                    ),
                }
            });
            async move {
                handle.await.unwrap_or_else(|e| {
                    ChannelResult::failed(name, format!("channel panicked: {}", e))
                })
            }
        });

        let results = join_all(handles).await;
        for result in &results {
            match &result.error {
                None => debug!("Notification delivered via {}", result.channel),
                Some(e) => warn!("Notification via {} failed: {}", result.channel, e),
            }
        }
        results
    }
}

/// The single actionable link for channels that render one
pub fn extract_primary_link(deployment: &DeploymentInfo, kind: NotificationKind) -> Option<&str> {
    match kind {
        NotificationKind::Success => deployment.production_url.as_deref(),
        NotificationKind::Error => deployment.logs_url.as_deref(),
        NotificationKind::Warning | NotificationKind::Info => deployment.commit_url.as_deref(),
    }
}
