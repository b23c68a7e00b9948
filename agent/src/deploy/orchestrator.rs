//! Deployment orchestrator
//!
//! Drives one [`DeploymentAttempt`] through the phase machine in
//! [`crate::deploy::fsm`]. Every step is appended both to the attempt and to
//! the trace ledger, so an interrupted process still leaves a legible trail.
//! Phase failures never surface as `Err`: they end the attempt in
//! [`Phase::Failed`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::deploy::command::{CommandOutcome, CommandRunner, Invocation};
use crate::deploy::fsm::{DeploymentFsm, Phase, PhaseEvent};
use crate::deploy::probe::EnvironmentProbe;
use crate::models::deployment::{DeploymentAttempt, Step, StepStatus};
use crate::models::project::ProjectConfig;
use crate::models::trace::TraceKind;
use crate::tracer::recorder::TraceRecorder;

/// Health polling settings for the monitoring window
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Delay before each probe
    pub interval: Duration,

    /// Length of the monitoring window
    pub window: Duration,

    /// Consecutive healthy responses needed to succeed
    pub required_healthy: u32,
}

impl MonitorSettings {
    /// Upper bound on probes in one window
    pub const MAX_ATTEMPTS_CEILING: u32 = 1_000;

    /// Probes per window: enough to cover the window, never fewer than the
    /// required healthy count, never more than the ceiling
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let per_window = self.window.as_millis().div_ceil(interval);
        let per_window = u32::try_from(per_window).unwrap_or(u32::MAX);
        per_window
            .max(self.required_healthy)
            .clamp(1, Self::MAX_ATTEMPTS_CEILING)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            window: Duration::from_secs(30),
            required_healthy: 3,
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Timeout applied to every external command
    pub command_timeout: Duration,

    /// Commands that must succeed before anything else runs
    pub toolchain_checks: Vec<String>,

    /// Treat test failures in the building phase as hard failures
    pub strict_tests: bool,

    pub monitor: MonitorSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(600),
            toolchain_checks: vec!["git --version".to_string()],
            strict_tests: false,
            monitor: MonitorSettings::default(),
        }
    }
}

/// What to deploy
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    /// Trace opened by the caller; also the attempt id
    pub trace_id: String,
    pub commit: String,
    pub branch: String,
    pub trigger: TraceKind,
}

/// Context a command runs in, exported as `DEPLOY_STAGE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Staging,
    Production,
    Rollback,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Staging => "staging",
            Stage::Production => "production",
            Stage::Rollback => "rollback",
        }
    }
}

/// State threaded through the phases of one attempt
pub(super) struct Run<'a> {
    pub project: &'a ProjectConfig,
    pub attempt: DeploymentAttempt,
}

/// Deployment orchestrator
pub struct DeploymentOrchestrator {
    pub(super) settings: OrchestratorSettings,
    pub(super) runner: Arc<dyn CommandRunner>,
    pub(super) probe: Arc<dyn EnvironmentProbe>,
    pub(super) tracer: Arc<TraceRecorder>,
    interrupt: watch::Receiver<bool>,
}

impl DeploymentOrchestrator {
    /// Create an orchestrator; flipping `interrupt` to `true` cuts short any
    /// health polling in progress
    pub fn new(
        settings: OrchestratorSettings,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn EnvironmentProbe>,
        tracer: Arc<TraceRecorder>,
        interrupt: watch::Receiver<bool>,
    ) -> Self {
        Self {
            settings,
            runner,
            probe,
            tracer,
            interrupt,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run every phase for `project` and return the finished attempt
    pub async fn execute(
        &self,
        project: &ProjectConfig,
        request: DeploymentRequest,
    ) -> DeploymentAttempt {
        info!(
            "Deploying {} at {} (trace {})",
            project.name, request.commit, request.trace_id
        );

        let attempt = DeploymentAttempt::new(
            request.trace_id,
            project.name.clone(),
            request.commit,
            request.branch,
            request.trigger,
        );
        let mut run = Run { project, attempt };
        let mut fsm = DeploymentFsm::new();

        while !fsm.state().is_terminal() {
            let phase = fsm.state();
            self.tracer.set_phase(&run.attempt.id, phase).await;

            let event = match phase {
                Phase::Validating => self.validate(&mut run).await,
                Phase::Building => self.build(&mut run).await,
                Phase::Staging => self.stage(&mut run).await,
                Phase::PreProductionChecks => self.pre_production_checks(&mut run).await,
                Phase::ApplyingProduction => self.apply_production(&mut run).await,
                Phase::Monitoring => self.monitor(&mut run).await,
                Phase::RollingBack => self.roll_back(&mut run).await,
                Phase::Succeeded | Phase::Failed => break,
            };

            if event == PhaseEvent::Interrupted {
                self.step(&mut run, phase.as_str(), StepStatus::Failed, Some("interrupted".into()))
                    .await;
            }

            match fsm.process(event) {
                Ok(next) => run.attempt.enter(next),
                Err(e) => {
                    error!("Deployment {}: {}", run.attempt.id, e);
                    fsm.abort(e);
                    run.attempt.enter(Phase::Failed);
                }
            }
        }

        run.attempt.error = fsm.error().map(str::to_string);
        run.attempt.finish();
        self.tracer.set_phase(&run.attempt.id, run.attempt.phase).await;

        if run.attempt.is_success() {
            self.step(&mut run, "deployment", StepStatus::Completed, None).await;
            info!("Deployment {} of {} succeeded", run.attempt.id, project.name);
        } else {
            let reason = run.attempt.error.clone();
            self.step(&mut run, "deployment", StepStatus::Failed, reason).await;
            warn!(
                "Deployment {} of {} failed: {}",
                run.attempt.id,
                project.name,
                run.attempt.error.as_deref().unwrap_or("unknown")
            );
        }

        run.attempt
    }

    /// Append a step to the attempt and the trace
    pub(super) async fn step(
        &self,
        run: &mut Run<'_>,
        name: &str,
        status: StepStatus,
        detail: Option<String>,
    ) {
        self.tracer
            .log_step(&run.attempt.id, name, status, detail.clone())
            .await;
        run.attempt.record(Step::new(name, status, detail));
    }

    /// Run one command, recording a started step and its outcome
    pub(super) async fn run_command(
        &self,
        run: &mut Run<'_>,
        name: &str,
        command: &str,
        stage: Stage,
    ) -> CommandOutcome {
        self.run_invocation(run, name, self.invocation(run, command, stage)).await
    }

    pub(super) async fn run_invocation(
        &self,
        run: &mut Run<'_>,
        name: &str,
        invocation: Invocation,
    ) -> CommandOutcome {
        self.step(run, name, StepStatus::Started, Some(invocation.command.clone())).await;

        let outcome = self.runner.run(&invocation).await;

        let (status, detail) = if outcome.success {
            (StepStatus::Completed, invocation.command.clone())
        } else {
            (
                StepStatus::Failed,
                format!("{} ({})", invocation.command, outcome.summary()),
            )
        };
        self.step(run, name, status, Some(detail)).await;
        outcome
    }

    /// Build an invocation carrying the deployment context
    pub(super) fn invocation(&self, run: &Run<'_>, command: &str, stage: Stage) -> Invocation {
        Invocation::new(command, self.settings.command_timeout)
            .with_cwd(run.project.path.clone())
            .with_env("DEPLOY_PROJECT", run.project.name.clone())
            .with_env("DEPLOY_BRANCH", run.attempt.branch.clone())
            .with_env("DEPLOY_COMMIT", run.attempt.commit.clone())
            .with_env("DEPLOY_STAGE", stage.as_str())
    }

    /// Sleep for `duration`; `true` if shutdown was requested meanwhile
    pub(super) async fn pause(&self, duration: Duration) -> bool {
        let mut interrupt = self.interrupt.clone();
        if *interrupt.borrow_and_update() {
            return true;
        }

        tokio::select! {
            changed = interrupt.changed() => match changed {
                Ok(()) => *interrupt.borrow(),
                // Sender gone: nobody can interrupt us any more
                Err(_) => {
                    tokio::time::sleep(duration).await;
                    false
                }
            },
            _ = tokio::time::sleep(duration) => false,
        }
    }

    pub(super) fn is_interrupted(&self) -> bool {
        *self.interrupt.borrow()
    }
}
