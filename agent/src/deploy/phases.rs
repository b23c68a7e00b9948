//! Work performed in each deployment phase

use tracing::{debug, info, warn};

use crate::deploy::command::shell_quote;
use crate::deploy::fsm::{Phase, PhaseEvent};
use crate::deploy::orchestrator::{DeploymentOrchestrator, Run, Stage};
use crate::models::deployment::StepStatus;

const MARKER_COMMAND: &str = "git rev-parse HEAD";

impl DeploymentOrchestrator {
    /// Working directory and toolchain checks; any failure aborts before
    /// anything else runs
    pub(super) async fn validate(&self, run: &mut Run<'_>) -> PhaseEvent {
        self.begin(run, Phase::Validating).await;

        match run.project.path.clone() {
            Some(path) if path.is_absolute() => {
                let detail = path.display().to_string();
                self.step(run, "workdir", StepStatus::Completed, Some(detail)).await;
            }
            _ => {
                let reason = format!("project {} has no absolute path", run.project.name);
                self.step(run, "workdir", StepStatus::Failed, Some(reason.clone())).await;
                return self.fail(run, Phase::Validating, reason).await;
            }
        }

        if let Err(reason) = self.run_checks(run, "toolchain", Stage::Build).await {
            return self.fail(run, Phase::Validating, reason).await;
        }
        self.pass(run, Phase::Validating).await
    }

    /// Tests, then build. Test failures are tolerated unless `strict_tests`
    /// is set; build failures always block.
    pub(super) async fn build(&self, run: &mut Run<'_>) -> PhaseEvent {
        self.begin(run, Phase::Building).await;

        let tests = run.project.commands.test.clone();
        for command in &tests {
            let outcome = self.run_command(run, "test", command, Stage::Build).await;
            if outcome.success {
                continue;
            }
            if self.settings.strict_tests {
                let reason = format!("test suite failed: {}", outcome.summary());
                return self.fail(run, Phase::Building, reason).await;
            }
            warn!(
                "Tests failed for {} but continuing: {}",
                run.project.name,
                outcome.summary()
            );
            self.step(
                run,
                "test",
                StepStatus::Skipped,
                Some("test failure tolerated".into()),
            )
            .await;
        }

        for command in run.project.build_commands().to_vec() {
            let outcome = self.run_command(run, "build", &command, Stage::Build).await;
            if !outcome.success {
                let reason = format!("build failed: {}", outcome.summary());
                return self.fail(run, Phase::Building, reason).await;
            }
        }

        self.pass(run, Phase::Building).await
    }

    /// Validation, tests and build again in the staging context, all blocking
    pub(super) async fn stage(&self, run: &mut Run<'_>) -> PhaseEvent {
        self.begin(run, Phase::Staging).await;

        if let Err(reason) = self.run_checks(run, "staging_validate", Stage::Staging).await {
            return self.fail(run, Phase::Staging, reason).await;
        }

        let commands: Vec<(&str, String)> = run
            .project
            .commands
            .test
            .iter()
            .map(|c| ("staging_test", c.clone()))
            .chain(
                run.project
                    .build_commands()
                    .iter()
                    .map(|c| ("staging_build", c.clone())),
            )
            .collect();

        for (name, command) in commands {
            let outcome = self.run_command(run, name, &command, Stage::Staging).await;
            if !outcome.success {
                let reason = format!("staging {} failed: {}", command, outcome.summary());
                return self.fail(run, Phase::Staging, reason).await;
            }
        }

        self.pass(run, Phase::Staging).await
    }

    /// Env vars, dependency reachability and certificate validity. Every
    /// check runs so the trail lists all problems at once.
    pub(super) async fn pre_production_checks(&self, run: &mut Run<'_>) -> PhaseEvent {
        self.begin(run, Phase::PreProductionChecks).await;
        let mut failures = Vec::new();

        for name in run.project.checks.env.clone() {
            if self.probe.env_present(&name) {
                self.step(run, "env", StepStatus::Completed, Some(name)).await;
            } else {
                let detail = format!("{} is not set", name);
                self.step(run, "env", StepStatus::Failed, Some(detail.clone())).await;
                failures.push(detail);
            }
        }

        for address in run.project.checks.dependencies.clone() {
            match self.probe.tcp_reachable(&address).await {
                Ok(()) => {
                    self.step(run, "dependency", StepStatus::Completed, Some(address)).await
                }
                Err(e) => {
                    let detail = format!("{} unreachable: {}", address, e);
                    self.step(run, "dependency", StepStatus::Failed, Some(detail.clone())).await;
                    failures.push(detail);
                }
            }
        }

        match run.project.production_url().map(str::to_string) {
            Some(url) if url.starts_with("https://") => {
                match self.probe.certificate_valid(&url).await {
                    Ok(()) => {
                        self.step(run, "certificate", StepStatus::Completed, Some(url)).await
                    }
                    Err(e) => {
                        let detail = format!("certificate for {} invalid: {}", url, e);
                        self.step(run, "certificate", StepStatus::Failed, Some(detail.clone()))
                            .await;
                        failures.push(detail);
                    }
                }
            }
            _ => {
                self.step(
                    run,
                    "certificate",
                    StepStatus::Skipped,
                    Some("no https production url".into()),
                )
                .await
            }
        }

        if !failures.is_empty() {
            let reason = format!("pre-production checks failed: {}", failures.join("; "));
            return self.fail(run, Phase::PreProductionChecks, reason).await;
        }
        self.pass(run, Phase::PreProductionChecks).await
    }

    /// Capture the rollback marker, then deploy and restart. Nothing is
    /// mutated if the marker cannot be captured.
    pub(super) async fn apply_production(&self, run: &mut Run<'_>) -> PhaseEvent {
        self.begin(run, Phase::ApplyingProduction).await;

        let outcome = self
            .run_command(run, "rollback_marker", MARKER_COMMAND, Stage::Production)
            .await;
        let marker = outcome.stdout.trim().to_string();
        if !outcome.success || marker.is_empty() {
            let reason = format!(
                "could not capture rollback marker: {}",
                if outcome.success {
                    "empty revision".to_string()
                } else {
                    outcome.summary()
                }
            );
            return self.fail(run, Phase::ApplyingProduction, reason).await;
        }
        debug!("Captured rollback marker {} for {}", marker, run.project.name);
        run.attempt.rollback_marker = Some(marker);

        for command in run.project.deploy_commands().to_vec() {
            let outcome = self.run_command(run, "deploy", &command, Stage::Production).await;
            if !outcome.success {
                let reason = format!("deploy failed: {}", outcome.summary());
                return self.fail(run, Phase::ApplyingProduction, reason).await;
            }
        }

        if let Some(restart) = run.project.commands.restart.clone() {
            let outcome = self.run_command(run, "restart", &restart, Stage::Production).await;
            if !outcome.success {
                let reason = format!("restart failed: {}", outcome.summary());
                return self.fail(run, Phase::ApplyingProduction, reason).await;
            }
        }

        self.pass(run, Phase::ApplyingProduction).await
    }

    /// Poll the health endpoint across the monitoring window. Any unhealthy
    /// response fails the phase, and so does having nothing to poll.
    pub(super) async fn monitor(&self, run: &mut Run<'_>) -> PhaseEvent {
        self.begin(run, Phase::Monitoring).await;

        let Some(url) = run.project.health_check_url().map(str::to_string) else {
            let reason = "no health check url configured".to_string();
            self.step(run, "health_check", StepStatus::Failed, Some(reason.clone())).await;
            return self.fail(run, Phase::Monitoring, reason).await;
        };

        let monitor = self.settings.monitor.clone();
        let max_attempts = monitor.max_attempts();
        let mut consecutive = 0u32;

        for attempt in 1..=max_attempts {
            if self.pause(monitor.interval).await {
                return PhaseEvent::Interrupted;
            }

            match self.probe.http_healthy(&url).await {
                Ok(()) => {
                    consecutive += 1;
                    let detail = format!("attempt {}/{}: healthy", attempt, max_attempts);
                    self.step(run, "health_check", StepStatus::Completed, Some(detail)).await;
                }
                Err(e) => {
                    let detail = format!("attempt {}/{}: unhealthy ({})", attempt, max_attempts, e);
                    self.step(run, "health_check", StepStatus::Failed, Some(detail)).await;
                    let reason = format!("health check failed: {}", e);
                    return self.fail(run, Phase::Monitoring, reason).await;
                }
            }
        }

        if consecutive < monitor.required_healthy {
            let reason = format!(
                "only {} of {} required healthy responses",
                consecutive, monitor.required_healthy
            );
            return self.fail(run, Phase::Monitoring, reason).await;
        }
        self.pass(run, Phase::Monitoring).await
    }

    /// Best-effort restore of the rollback marker, a restart and one health
    /// probe. The trail distinguishes "rollback attempted" from "rollback
    /// verified".
    pub(super) async fn roll_back(&self, run: &mut Run<'_>) -> PhaseEvent {
        self.begin(run, Phase::RollingBack).await;

        let Some(marker) = run.attempt.rollback_marker.clone() else {
            self.step(
                run,
                "rollback_restore",
                StepStatus::Skipped,
                Some("no production changes applied".into()),
            )
            .await;
            return self.pass(run, Phase::RollingBack).await;
        };

        info!("Rolling back {} to {}", run.project.name, marker);
        let command = match run.project.rollback_command() {
            Some(command) => command.to_string(),
            None => format!("git reset --hard {}", shell_quote(&marker)),
        };
        let invocation = self
            .invocation(run, &command, Stage::Rollback)
            .with_env("ROLLBACK_REVISION", marker.clone());
        let restored = self.run_invocation(run, "rollback_restore", invocation).await;
        self.step(
            run,
            "rollback",
            if restored.success {
                StepStatus::Completed
            } else {
                StepStatus::Failed
            },
            Some(format!("rollback attempted to {}", marker)),
        )
        .await;

        if let Some(restart) = run.project.commands.restart.clone() {
            let invocation = self
                .invocation(run, &restart, Stage::Rollback)
                .with_env("ROLLBACK_REVISION", marker.clone());
            self.run_invocation(run, "rollback_restart", invocation).await;
        }

        let verified = match run.project.health_check_url().map(str::to_string) {
            Some(url) => {
                if self.is_interrupted() {
                    return PhaseEvent::Interrupted;
                }
                match self.probe.http_healthy(&url).await {
                    Ok(()) => {
                        self.step(
                            run,
                            "rollback_verify",
                            StepStatus::Completed,
                            Some("rollback verified".into()),
                        )
                        .await;
                        true
                    }
                    Err(e) => {
                        self.step(
                            run,
                            "rollback_verify",
                            StepStatus::Failed,
                            Some(format!("rollback attempted, health check failed: {}", e)),
                        )
                        .await;
                        false
                    }
                }
            }
            None => {
                self.step(
                    run,
                    "rollback_verify",
                    StepStatus::Skipped,
                    Some("rollback unverified: no health check url".into()),
                )
                .await;
                false
            }
        };

        if restored.success && verified {
            self.pass(run, Phase::RollingBack).await
        } else {
            let reason = "rollback not verified".to_string();
            self.fail(run, Phase::RollingBack, reason).await
        }
    }

    /// Run the configured toolchain checks plus the project's own validate
    /// commands
    async fn run_checks(&self, run: &mut Run<'_>, name: &str, stage: Stage) -> Result<(), String> {
        let checks: Vec<String> = self
            .settings
            .toolchain_checks
            .iter()
            .chain(run.project.commands.validate.iter())
            .cloned()
            .collect();

        for command in checks {
            let outcome = self.run_command(run, name, &command, stage).await;
            if !outcome.success {
                return Err(format!("{} failed: {}", command, outcome.summary()));
            }
        }
        Ok(())
    }

    async fn begin(&self, run: &mut Run<'_>, phase: Phase) {
        self.step(run, phase.as_str(), StepStatus::Started, None).await;
    }

    async fn pass(&self, run: &mut Run<'_>, phase: Phase) -> PhaseEvent {
        self.step(run, phase.as_str(), StepStatus::Completed, None).await;
        PhaseEvent::Passed
    }

    async fn fail(&self, run: &mut Run<'_>, phase: Phase, reason: String) -> PhaseEvent {
        warn!("{} {} failed: {}", run.project.name, phase, reason);
        self.step(run, phase.as_str(), StepStatus::Failed, Some(reason.clone())).await;
        PhaseEvent::Failed(reason)
    }
}
