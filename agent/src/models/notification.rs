//! Notification models

use serde::{Deserialize, Serialize};

use crate::deploy::fsm::Phase;
use crate::models::deployment::DeploymentAttempt;
use crate::models::project::ProjectConfig;
use crate::utils::short_sha;

/// Severity of a notification; drives link selection and the desktop sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }
}

/// Deployment context carried by every notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub project: String,
    pub commit: String,
    pub branch: String,
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub deployment: DeploymentInfo,
}

impl NotificationEvent {
    /// Success or failure framing for a finished attempt
    pub fn deployment_outcome(attempt: &DeploymentAttempt, project: &ProjectConfig) -> Self {
        let deployment = DeploymentInfo {
            project: attempt.project.clone(),
            commit: attempt.commit.clone(),
            branch: attempt.branch.clone(),
            status: if attempt.is_success() { "success" } else { "failed" }.to_string(),
            phase: Some(attempt.phase),
            trace_id: Some(attempt.id.clone()),
            production_url: project.urls.production.clone(),
            logs_url: project.urls.logs.clone(),
            commit_url: project.commit_url(&attempt.commit),
        };

        if attempt.is_success() {
            Self {
                title: format!("Deployed {}", attempt.project),
                message: format!(
                    "{} ({}) is live on {}",
                    attempt.project,
                    short_sha(&attempt.commit),
                    attempt.branch
                ),
                kind: NotificationKind::Success,
                deployment,
            }
        } else {
            let reason = attempt
                .error
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string());
            Self {
                title: format!("Deployment failed: {}", attempt.project),
                message: format!(
                    "{} ({}) on {} failed: {}",
                    attempt.project,
                    short_sha(&attempt.commit),
                    attempt.branch,
                    reason
                ),
                kind: NotificationKind::Error,
                deployment,
            }
        }
    }
}

/// Outcome of one channel dispatch; failures are data, not errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChannelResult {
    pub fn ok(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(channel: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}
