//! Finite State Machine for deployment phases
//!
//! ```text
//! Validating -> Building -> Staging -> PreProductionChecks
//!            -> ApplyingProduction -> Monitoring -> Succeeded
//!
//! Validating --fail--> Failed
//! any later phase --fail--> RollingBack -> Failed
//! any non-terminal phase --interrupt--> Failed
//! ```
//!
//! The machine only decides edges. The orchestrator performs the work for
//! each phase and feeds the outcome back in as a [`PhaseEvent`].

use serde::{Deserialize, Serialize};

/// Deployment phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Toolchain and environment checks
    Validating,

    /// Test suite and build
    Building,

    /// Validation, tests and build against the staging context
    Staging,

    /// Env vars, dependency reachability, certificates
    PreProductionChecks,

    /// Capture rollback marker, then apply deploy commands
    ApplyingProduction,

    /// Health polling window
    Monitoring,

    /// Restore the rollback marker
    RollingBack,

    Succeeded,

    Failed,
}

/// Phases visited by a run with no failures, in order
pub const HAPPY_PATH: [Phase; 6] = [
    Phase::Validating,
    Phase::Building,
    Phase::Staging,
    Phase::PreProductionChecks,
    Phase::ApplyingProduction,
    Phase::Monitoring,
];

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Validating => "validating",
            Phase::Building => "building",
            Phase::Staging => "staging",
            Phase::PreProductionChecks => "pre_production_checks",
            Phase::ApplyingProduction => "applying_production",
            Phase::Monitoring => "monitoring",
            Phase::RollingBack => "rolling_back",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the work done in the current phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Gating checks passed
    Passed,

    /// A gating check failed
    Failed(String),

    /// Shutdown requested while the phase was waiting
    Interrupted,
}

/// Compute the next phase without side effects
pub fn next_phase(phase: Phase, event: &PhaseEvent) -> Result<Phase, String> {
    let next = match (phase, event) {
        (Phase::Validating, PhaseEvent::Passed) => Phase::Building,
        (Phase::Building, PhaseEvent::Passed) => Phase::Staging,
        (Phase::Staging, PhaseEvent::Passed) => Phase::PreProductionChecks,
        (Phase::PreProductionChecks, PhaseEvent::Passed) => Phase::ApplyingProduction,
        (Phase::ApplyingProduction, PhaseEvent::Passed) => Phase::Monitoring,
        (Phase::Monitoring, PhaseEvent::Passed) => Phase::Succeeded,

        // Nothing has been touched yet, so there is nothing to roll back
        (Phase::Validating, PhaseEvent::Failed(_)) => Phase::Failed,

        (
            Phase::Building
            | Phase::Staging
            | Phase::PreProductionChecks
            | Phase::ApplyingProduction
            | Phase::Monitoring,
            PhaseEvent::Failed(_),
        ) => Phase::RollingBack,

        // Rollback is best-effort; the attempt failed either way
        (Phase::RollingBack, PhaseEvent::Passed | PhaseEvent::Failed(_)) => Phase::Failed,

        (state, PhaseEvent::Interrupted) if !state.is_terminal() => Phase::Failed,

        (state, event) => {
            return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
        }
    };
    Ok(next)
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: Phase,
    history: Vec<Phase>,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in the validating state
    pub fn new() -> Self {
        Self {
            state: Phase::Validating,
            history: vec![Phase::Validating],
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> Phase {
        self.state
    }

    /// Every state entered, in order
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// First failure reason, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: PhaseEvent) -> Result<Phase, String> {
        let next = next_phase(self.state, &event)?;

        if self.error.is_none() {
            match &event {
                PhaseEvent::Failed(reason) => self.error = Some(reason.clone()),
                PhaseEvent::Interrupted => self.error = Some("interrupted".to_string()),
                PhaseEvent::Passed => {}
            }
        }

        self.state = next;
        self.history.push(next);
        Ok(next)
    }

    /// Force the terminal failed state, e.g. after an invalid transition
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(reason.into());
        }
        if self.state != Phase::Failed {
            self.state = Phase::Failed;
            self.history.push(Phase::Failed);
        }
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
