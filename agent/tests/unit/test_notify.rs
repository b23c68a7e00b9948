//! Notification fan-out tests

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use shipd::deploy::fsm::Phase;
use shipd::errors::AgentError;
use shipd::models::deployment::DeploymentAttempt;
use shipd::models::notification::{NotificationEvent, NotificationKind};
use shipd::models::trace::TraceKind;
use shipd::notify::console::ConsoleChannel;
use shipd::notify::desktop::{DesktopChannel, Platform};
use shipd::notify::messaging::{
    MessagingChannel, MessagingOptions, MessagingTransport, TemplateMessage,
};
use shipd::notify::{Channel, NotificationRouter};

use crate::support::{demo_project, FakeRunner, RecordingChannel};

fn finished_attempt(phase: Phase, error: Option<&str>) -> DeploymentAttempt {
    let mut attempt =
        DeploymentAttempt::new("trace-1", "demo", "abc123def456", "main", TraceKind::Webhook);
    attempt.enter(phase);
    attempt.error = error.map(str::to_string);
    attempt.finish();
    attempt
}

fn success_event() -> NotificationEvent {
    let attempt = finished_attempt(Phase::Succeeded, None);
    NotificationEvent::deployment_outcome(&attempt, &demo_project())
}

#[test]
fn test_outcome_framing() {
    let success = success_event();
    assert_eq!(success.kind, NotificationKind::Success);
    assert_eq!(success.title, "Deployed demo");
    assert!(success.message.contains("abc123de"));
    assert_eq!(success.deployment.status, "success");
    assert_eq!(
        success.deployment.commit_url.as_deref(),
        Some("https://git.example.com/acme/demo/commit/abc123def456")
    );

    let failure = NotificationEvent::deployment_outcome(
        &finished_attempt(Phase::Failed, Some("deploy failed: exit code 1")),
        &demo_project(),
    );
    assert_eq!(failure.kind, NotificationKind::Error);
    assert_eq!(failure.title, "Deployment failed: demo");
    assert!(failure.message.contains("deploy failed: exit code 1"));
    assert_eq!(failure.deployment.phase, Some(Phase::Failed));
}

#[tokio::test]
async fn test_failing_channel_does_not_shorten_results() {
    let failing = Arc::new(RecordingChannel::failing("a"));
    let healthy = Arc::new(RecordingChannel::ok("b"));
    let router = NotificationRouter::new(
        vec![failing.clone(), healthy.clone()],
        Duration::from_secs(1),
    );

    let results = router.send(&success_event()).await;

    assert_eq!(results.len(), router.len());
    assert_eq!(results[0].channel, "a");
    assert!(!results[0].success);
    assert_eq!(results[0].error.as_deref(), Some("Notification error: a is down"));
    assert_eq!(results[1].channel, "b");
    assert!(results[1].success);
    assert_eq!(healthy.events().len(), 1);
}

#[tokio::test]
async fn test_slow_channel_times_out_without_delaying_others() {
    let slow = Arc::new(RecordingChannel::slow("slow", Duration::from_secs(30)));
    let fast = Arc::new(RecordingChannel::ok("fast"));
    let router = NotificationRouter::new(
        vec![slow.clone(), fast.clone()],
        Duration::from_millis(50),
    );

    let started = Instant::now();
    let results = router.send(&success_event()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert!(results[0].error.as_deref().unwrap().starts_with("timed out"));
    assert!(results[1].success);
    assert_eq!(fast.events().len(), 1);
}

struct PanickingChannel;

#[async_trait]
impl Channel for PanickingChannel {
    fn name(&self) -> &str {
        "panics"
    }

    async fn send(&self, _event: &NotificationEvent) -> Result<(), AgentError> {
        panic!("channel bug");
    }
}

#[tokio::test]
async fn test_panicking_channel_is_a_failed_result() {
    let healthy = Arc::new(RecordingChannel::ok("ok"));
    let router = NotificationRouter::new(
        vec![Arc::new(PanickingChannel), healthy.clone(), Arc::new(ConsoleChannel::new())],
        Duration::from_secs(1),
    );

    let results = router.send(&success_event()).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].channel, "panics");
    assert!(!results[0].success);
    assert!(results[1].success);
    assert!(results[2].success);
}

#[tokio::test]
async fn test_desktop_failure_is_reported() {
    let runner = Arc::new(FakeRunner::new());
    runner.fail_on("notify-send");
    let channel = DesktopChannel::new(Platform::Linux, runner.clone());

    let result = channel.send(&success_event()).await;

    assert!(result.is_err());
    let commands = runner.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].contains("--urgency=critical"));
    assert!(commands[0].contains("sound-name:complete"));
}

struct RejectingTemplates {
    texts: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl MessagingTransport for RejectingTemplates {
    async fn send_template(&self, _message: &TemplateMessage) -> Result<(), AgentError> {
        Err(AgentError::NotifyError("template not approved".into()))
    }

    async fn send_text(&self, _to: &str, body: &str) -> Result<(), AgentError> {
        self.texts.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_messaging_fallback_decides_the_result() {
    let transport = Arc::new(RejectingTemplates {
        texts: std::sync::Mutex::new(Vec::new()),
    });
    let channel = MessagingChannel::new(
        transport.clone(),
        MessagingOptions {
            recipient: "15550001111".into(),
            success_template: "deployment_success".into(),
            failure_template: "deployment_failure".into(),
            language: "en_US".into(),
        },
    );
    let router = NotificationRouter::new(vec![Arc::new(channel)], Duration::from_secs(1));

    let results = router.send(&success_event()).await;

    assert!(results[0].success);
    let texts = transport.texts.lock().unwrap().clone();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("project: demo"));
    assert!(texts[0].contains("commit: abc123de"));
    assert!(texts[0].contains("branch: main"));
    assert!(texts[0].contains("https://demo.example.com"));
}
