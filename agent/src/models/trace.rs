//! Trace ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::Phase;
use crate::models::deployment::{Step, StepStatus};

/// What opened the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Webhook,
    Manual,
}

/// Terminal state of a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Running,
    Succeeded,
    Failed,
    /// Nothing to do: unconfigured project, ignored branch, busy project
    Skipped,
}

/// One recorded attempt and its step log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub id: String,
    pub kind: TraceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Value,

    pub started_at: DateTime<Utc>,
    pub status: TraceStatus,

    /// Last phase reported by the orchestrator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Trace {
    pub fn new(
        id: String,
        kind: TraceKind,
        project: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id,
            kind,
            project,
            metadata,
            started_at: Utc::now(),
            status: TraceStatus::Running,
            phase: None,
            steps: Vec::new(),
            completed_at: None,
        }
    }

    /// Tri-state outcome: `None` while running or when skipped
    pub fn success(&self) -> Option<bool> {
        match self.status {
            TraceStatus::Succeeded => Some(true),
            TraceStatus::Failed => Some(false),
            TraceStatus::Running | TraceStatus::Skipped => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn has_failed_step(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }
}
