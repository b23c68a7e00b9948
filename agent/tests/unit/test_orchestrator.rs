//! Orchestrator tests against fake commands and probes

use serde_json::json;

use shipd::deploy::fsm::{Phase, HAPPY_PATH};
use shipd::deploy::orchestrator::DeploymentRequest;
use shipd::models::deployment::{DeploymentAttempt, StepStatus};
use shipd::models::project::ProjectConfig;
use shipd::models::trace::{TraceKind, TraceStatus};

use crate::support::{demo_project, fast_settings, FakeProbe, FakeRunner, Harness, MARKER};

async fn deploy(harness: &Harness, project: &ProjectConfig) -> DeploymentAttempt {
    let trace_id = harness
        .tracer
        .start_trace(TraceKind::Webhook, Some(&project.name), json!({}))
        .await;
    let request = DeploymentRequest {
        trace_id,
        commit: "abc123de".to_string(),
        branch: "main".to_string(),
        trigger: TraceKind::Webhook,
    };
    harness.orchestrator.execute(project, request).await
}

fn failed_path(until: Phase) -> Vec<Phase> {
    let mut phases: Vec<Phase> = HAPPY_PATH
        .iter()
        .copied()
        .take_while(|p| *p != until)
        .collect();
    phases.extend([until, Phase::RollingBack, Phase::Failed]);
    phases
}

#[tokio::test]
async fn test_happy_path_visits_every_phase_in_order() {
    let harness = Harness::new(FakeRunner::new(), FakeProbe::healthy());
    let attempt = deploy(&harness, &demo_project()).await;

    let mut expected = HAPPY_PATH.to_vec();
    expected.push(Phase::Succeeded);
    assert_eq!(attempt.phases, expected);
    assert!(attempt.is_success());
    assert_eq!(attempt.phase, Phase::Succeeded);
    assert!(attempt.error.is_none());
    assert_eq!(attempt.rollback_marker.as_deref(), Some(MARKER));
    assert_eq!(harness.probe.health_calls(), 3);

    let trace = harness.tracer.get_trace(&attempt.id).unwrap();
    assert_eq!(trace.phase, Some(Phase::Succeeded));
    assert_eq!(trace.steps.len(), attempt.steps.len());
    // Completion is the gateway's job
    assert_eq!(trace.status, TraceStatus::Running);
}

#[tokio::test]
async fn test_marker_captured_before_production_is_touched() {
    let harness = Harness::new(FakeRunner::new(), FakeProbe::healthy());
    let attempt = deploy(&harness, &demo_project()).await;

    let marker = attempt
        .step_index("rollback_marker", StepStatus::Completed)
        .unwrap();
    let deploy = attempt.step_index("deploy", StepStatus::Started).unwrap();
    assert!(marker < deploy);

    let invocation = harness
        .runner
        .invocations()
        .into_iter()
        .find(|i| i.command == "./deploy.sh")
        .unwrap();
    assert_eq!(invocation.env_var("DEPLOY_STAGE"), Some("production"));
    assert_eq!(invocation.env_var("DEPLOY_PROJECT"), Some("demo"));
    assert_eq!(invocation.env_var("DEPLOY_COMMIT"), Some("abc123de"));
    assert_eq!(invocation.cwd.as_deref(), Some(std::path::Path::new("/srv/demo")));
}

#[tokio::test]
async fn test_validation_failure_fails_without_rollback() {
    let runner = FakeRunner::new();
    runner.fail_on("git --version");
    let harness = Harness::new(runner, FakeProbe::healthy());

    let attempt = deploy(&harness, &demo_project()).await;

    assert_eq!(attempt.phases, vec![Phase::Validating, Phase::Failed]);
    assert!(!attempt.is_success());
    assert!(attempt.error.as_deref().unwrap().contains("git --version"));
    assert_eq!(harness.runner.commands(), vec!["git --version".to_string()]);
}

#[tokio::test]
async fn test_test_failure_is_tolerated_while_building() {
    let runner = FakeRunner::new();
    runner.fail_on("npm test");
    let harness = Harness::new(runner, FakeProbe::healthy());

    let attempt = deploy(&harness, &demo_project()).await;

    assert!(attempt
        .steps
        .iter()
        .any(|s| s.name == "test" && s.status == StepStatus::Skipped));
    assert!(attempt.step_index("build", StepStatus::Completed).is_some());
    // The staging re-run is hard-blocking
    assert_eq!(attempt.phases, failed_path(Phase::Staging));
    assert!(attempt
        .error
        .unwrap()
        .starts_with("staging npm test failed"));
}

#[tokio::test]
async fn test_strict_tests_block_the_build() {
    let runner = FakeRunner::new();
    runner.fail_on("npm test");
    let mut settings = fast_settings();
    settings.strict_tests = true;
    let harness = Harness::with_settings(runner, FakeProbe::healthy(), settings);

    let attempt = deploy(&harness, &demo_project()).await;

    assert_eq!(attempt.phases, failed_path(Phase::Building));
    assert!(!attempt.has_step("build"));
}

#[tokio::test]
async fn test_build_failure_rolls_back_with_nothing_to_restore() {
    let runner = FakeRunner::new();
    runner.fail_on("npm run build");
    let harness = Harness::new(runner, FakeProbe::healthy());

    let attempt = deploy(&harness, &demo_project()).await;

    assert_eq!(attempt.phases, failed_path(Phase::Building));
    assert!(attempt.rollback_marker.is_none());
    let restore = attempt
        .steps
        .iter()
        .find(|s| s.name == "rollback_restore")
        .unwrap();
    assert_eq!(restore.status, StepStatus::Skipped);
    assert!(!harness.runner.commands().iter().any(|c| c.contains("git reset")));
}

#[tokio::test]
async fn test_pre_production_checks_report_every_problem() {
    let mut project = demo_project();
    project.checks.env = vec!["DATABASE_URL".to_string(), "SECRET_KEY".to_string()];
    project.checks.dependencies = vec!["127.0.0.1:5432".to_string()];
    let probe = FakeProbe {
        env: vec!["SECRET_KEY".to_string()],
        unreachable: vec!["127.0.0.1:5432".to_string()],
        ..FakeProbe::healthy()
    };
    let harness = Harness::new(FakeRunner::new(), probe);

    let attempt = deploy(&harness, &project).await;

    assert_eq!(attempt.phases, failed_path(Phase::PreProductionChecks));
    let error = attempt.error.unwrap();
    assert!(error.contains("DATABASE_URL is not set"));
    assert!(error.contains("127.0.0.1:5432 unreachable"));
    assert!(!error.contains("SECRET_KEY"));
    assert!(!harness.runner.commands().contains(&"./deploy.sh".to_string()));
}

#[tokio::test]
async fn test_marker_capture_failure_aborts_before_deploy() {
    let runner = FakeRunner::new();
    runner.fail_on("git rev-parse");
    let harness = Harness::new(runner, FakeProbe::healthy());

    let attempt = deploy(&harness, &demo_project()).await;

    assert_eq!(attempt.phases, failed_path(Phase::ApplyingProduction));
    assert!(!attempt.has_step("deploy"));
    assert!(!harness.runner.commands().contains(&"./deploy.sh".to_string()));
    assert!(attempt
        .error
        .unwrap()
        .starts_with("could not capture rollback marker"));
}

#[tokio::test]
async fn test_apply_failure_restores_marker() {
    let runner = FakeRunner::new();
    runner.fail_on("./deploy.sh");
    let harness = Harness::new(runner, FakeProbe::healthy());

    let attempt = deploy(&harness, &demo_project()).await;

    assert_eq!(attempt.phases, failed_path(Phase::ApplyingProduction));
    let restore = harness
        .runner
        .invocations()
        .into_iter()
        .find(|i| i.command.starts_with("git reset --hard"))
        .unwrap();
    assert!(restore.command.contains(MARKER));
    assert_eq!(restore.env_var("ROLLBACK_REVISION"), Some(MARKER));
    assert_eq!(restore.env_var("DEPLOY_STAGE"), Some("rollback"));

    let attempted = attempt.steps.iter().find(|s| s.name == "rollback").unwrap();
    assert_eq!(
        attempted.detail.as_deref(),
        Some(format!("rollback attempted to {}", MARKER).as_str())
    );
}

#[tokio::test]
async fn test_unhealthy_monitoring_triggers_rollback() {
    let probe = FakeProbe::scripted(&[true, false], true);
    let harness = Harness::new(FakeRunner::new(), probe);

    let attempt = deploy(&harness, &demo_project()).await;

    assert_eq!(attempt.phases, failed_path(Phase::Monitoring));
    assert!(!attempt.is_success());

    let trace = harness.tracer.get_trace(&attempt.id).unwrap();
    let restore = trace
        .steps
        .iter()
        .position(|s| s.name == "rollback_restore" && s.status == StepStatus::Completed)
        .unwrap();
    let failure = trace
        .steps
        .iter()
        .position(|s| s.name == "deployment" && s.status == StepStatus::Failed)
        .unwrap();
    assert!(restore < failure);

    let verify = attempt
        .steps
        .iter()
        .find(|s| s.name == "rollback_verify")
        .unwrap();
    assert_eq!(verify.status, StepStatus::Completed);
    assert_eq!(verify.detail.as_deref(), Some("rollback verified"));
}

#[tokio::test]
async fn test_unverified_rollback_still_fails() {
    let harness = Harness::new(FakeRunner::new(), FakeProbe::scripted(&[], false));

    let attempt = deploy(&harness, &demo_project()).await;

    assert_eq!(attempt.phases, failed_path(Phase::Monitoring));
    assert!(attempt.has_step("rollback"));
    let verify = attempt
        .steps
        .iter()
        .find(|s| s.name == "rollback_verify")
        .unwrap();
    assert_eq!(verify.status, StepStatus::Failed);
    assert!(attempt.error.unwrap().starts_with("health check failed"));
}

#[tokio::test]
async fn test_interrupt_during_monitoring_is_recorded() {
    let harness = Harness::new(FakeRunner::new(), FakeProbe::healthy());
    harness.interrupt.send_replace(true);

    let attempt = deploy(&harness, &demo_project()).await;

    assert_eq!(attempt.phase, Phase::Failed);
    assert_eq!(
        &attempt.phases[attempt.phases.len() - 2..],
        &[Phase::Monitoring, Phase::Failed]
    );
    assert_eq!(attempt.error.as_deref(), Some("interrupted"));
    assert!(attempt.steps.iter().any(|s| s.name == "monitoring"
        && s.status == StepStatus::Failed
        && s.detail.as_deref() == Some("interrupted")));
    assert_eq!(harness.probe.health_calls(), 0);
}

#[tokio::test]
async fn test_missing_health_url_fails_monitoring_and_rolls_back() {
    let mut project = demo_project();
    project.urls.health = None;
    let harness = Harness::new(FakeRunner::new(), FakeProbe::healthy());

    let attempt = deploy(&harness, &project).await;

    assert!(!attempt.is_success());
    assert_eq!(attempt.phases, failed_path(Phase::Monitoring));
    assert_eq!(harness.probe.health_calls(), 0);
    assert_eq!(
        attempt.error.as_deref(),
        Some("no health check url configured")
    );
    assert!(attempt
        .steps
        .iter()
        .any(|s| s.name == "health_check" && s.status == StepStatus::Failed));
    assert!(attempt
        .steps
        .iter()
        .any(|s| s.name == "rollback_restore" && s.status == StepStatus::Completed));
}

#[tokio::test]
async fn test_project_without_path_fails_before_any_command() {
    let mut project = demo_project();
    project.path = None;
    let runner = FakeRunner::new();
    runner.fail_on("./deploy.sh");
    let harness = Harness::new(runner, FakeProbe::healthy());

    let attempt = deploy(&harness, &project).await;

    assert_eq!(attempt.phases, vec![Phase::Validating, Phase::Failed]);
    assert!(attempt.error.as_deref().unwrap().contains("has no absolute path"));
    assert!(attempt
        .steps
        .iter()
        .any(|s| s.name == "workdir" && s.status == StepStatus::Failed));
    assert!(harness.runner.commands().is_empty());
    assert!(attempt.rollback_marker.is_none());
}
