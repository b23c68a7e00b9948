//! Deployment attempt models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::Phase;
use crate::models::trace::TraceKind;

/// Status of one recorded step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
    Skipped,
}

/// One entry in the append-only decision trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn new(name: impl Into<String>, status: StepStatus, detail: Option<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// One execution of the orchestrator for one push or manual trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentAttempt {
    pub id: String,
    pub project: String,
    pub commit: String,
    pub branch: String,
    pub trigger: TraceKind,
    pub started_at: DateTime<Utc>,

    /// Current phase
    pub phase: Phase,

    /// Every phase entered, in order
    pub phases: Vec<Phase>,

    pub steps: Vec<Step>,

    /// `None` while running
    pub success: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Revision captured before production was touched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_marker: Option<String>,

    /// Reason the attempt failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentAttempt {
    pub fn new(
        id: impl Into<String>,
        project: impl Into<String>,
        commit: impl Into<String>,
        branch: impl Into<String>,
        trigger: TraceKind,
    ) -> Self {
        Self {
            id: id.into(),
            project: project.into(),
            commit: commit.into(),
            branch: branch.into(),
            trigger,
            started_at: Utc::now(),
            phase: Phase::Validating,
            phases: vec![Phase::Validating],
            steps: Vec::new(),
            success: None,
            completed_at: None,
            rollback_marker: None,
            error: None,
        }
    }

    /// Move to `phase`; the state machine has already validated the edge
    pub fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.phases.push(phase);
    }

    /// Append a step
    pub fn record(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Stamp the terminal outcome from the current phase
    pub fn finish(&mut self) {
        self.success = Some(self.phase == Phase::Succeeded);
        self.completed_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.success == Some(true)
    }

    /// Whether a step with this name was recorded
    pub fn has_step(&self, name: &str) -> bool {
        self.steps.iter().any(|s| s.name == name)
    }

    /// Position of the first step with this name and status
    pub fn step_index(&self, name: &str, status: StepStatus) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.name == name && s.status == status)
    }

    /// The first failed step, which identifies the offending command
    pub fn failed_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}
