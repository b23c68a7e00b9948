//! Gateway tests: routing, single-flight and end-to-end runs

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, StatusCode};

use shipd::models::deployment::StepStatus;
use shipd::models::notification::NotificationKind;
use shipd::models::trace::{Trace, TraceKind, TraceStatus};
use shipd::notify::Channel;
use shipd::tracer::recorder::TraceRecorder;
use shipd::webhook::gateway::{GatewayResponse, WebhookGateway};
use shipd::webhook::signature::sign;

use crate::support::{
    demo_project, push_body, FakeProbe, FakeRunner, Harness, RecordingChannel, SECRET,
};

fn headers(event: &str, body: &[u8], secret: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-github-event", HeaderValue::from_str(event).unwrap());
    headers.insert("x-github-delivery", HeaderValue::from_static("delivery-1"));
    if let Some(secret) = secret {
        let signature = sign(body, secret.as_bytes());
        headers.insert(
            "x-hub-signature-256",
            HeaderValue::from_str(&signature).unwrap(),
        );
    }
    headers
}

async fn push(gateway: &WebhookGateway, repository: &str, git_ref: &str) -> GatewayResponse {
    let body = push_body(repository, git_ref, "abc123de");
    gateway
        .handle(&body, &headers("push", &body, Some(SECRET)))
        .await
}

fn trace_of(tracer: &TraceRecorder, response: &GatewayResponse) -> Trace {
    let id = response.body["traceId"].as_str().unwrap();
    tracer.get_trace(id).unwrap()
}

struct Setup {
    harness: Harness,
    gateway: WebhookGateway,
    channels: Vec<Arc<RecordingChannel>>,
}

fn setup(runner: FakeRunner, probe: FakeProbe) -> Setup {
    let harness = Harness::new(runner, probe);
    let channels = vec![
        Arc::new(RecordingChannel::ok("console")),
        Arc::new(RecordingChannel::failing("webhook")),
    ];
    let dyn_channels: Vec<Arc<dyn Channel>> = channels
        .iter()
        .map(|c| c.clone() as Arc<dyn Channel>)
        .collect();
    let gateway = harness.gateway(vec![demo_project()], dyn_channels);
    Setup {
        harness,
        gateway,
        channels,
    }
}

#[tokio::test]
async fn test_end_to_end_success() {
    let Setup {
        harness,
        gateway,
        channels,
    } = setup(FakeRunner::new(), FakeProbe::healthy());

    let response = push(&gateway, "demo", "refs/heads/main").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["deployment"]["success"], true);
    assert_eq!(response.body["deployment"]["commit"], "abc123de");
    // A failing channel does not turn a good deployment into an error
    assert_eq!(response.body["notifications"][1]["success"], false);

    for channel in &channels {
        let events = channel.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, NotificationKind::Success);
    }

    let trace = trace_of(&harness.tracer, &response);
    assert_eq!(trace.status, TraceStatus::Succeeded);
    assert_eq!(trace.project.as_deref(), Some("demo"));
    assert_eq!(trace.metadata["delivery"], "delivery-1");
    assert!(trace
        .steps
        .iter()
        .any(|s| s.name == "notify" && s.detail.as_deref() == Some("1/2 channels delivered")));
    assert!(gateway.in_flight().is_empty());
}

#[tokio::test]
async fn test_end_to_end_apply_failure() {
    let runner = FakeRunner::new();
    runner.fail_on("./deploy.sh");
    let Setup {
        harness,
        gateway,
        channels,
    } = setup(runner, FakeProbe::healthy());

    let response = push(&gateway, "demo", "refs/heads/main").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["deployment"]["success"], false);
    assert_eq!(response.body["deployment"]["phase"], "failed");

    for channel in &channels {
        let events = channel.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, NotificationKind::Error);
    }

    let trace = trace_of(&harness.tracer, &response);
    assert_eq!(trace.status, TraceStatus::Failed);
    assert!(trace
        .steps
        .iter()
        .any(|s| s.name == "rollback"
            && s.detail.as_deref().unwrap_or("").starts_with("rollback attempted")));
}

#[tokio::test]
async fn test_unconfigured_project_is_informational() {
    let Setup {
        harness,
        gateway,
        channels,
    } = setup(FakeRunner::new(), FakeProbe::healthy());

    let response = push(&gateway, "unknown-repo", "refs/heads/main").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["availableProjects"], serde_json::json!(["demo"]));
    let trace = trace_of(&harness.tracer, &response);
    assert_eq!(trace.status, TraceStatus::Skipped);
    assert!(!trace.has_failed_step());
    assert!(harness.runner.commands().is_empty());
    assert!(channels[0].events().is_empty());
}

#[tokio::test]
async fn test_branch_mismatch_is_skipped() {
    let Setup {
        harness, gateway, ..
    } = setup(FakeRunner::new(), FakeProbe::healthy());

    let response = push(&gateway, "demo", "refs/heads/other").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "branch ignored");
    let trace = trace_of(&harness.tracer, &response);
    assert_eq!(trace.status, TraceStatus::Skipped);
    assert!(trace
        .steps
        .iter()
        .any(|s| s.name == "branch" && s.status == StepStatus::Skipped));
    assert!(harness.runner.commands().is_empty());
}

#[tokio::test]
async fn test_tag_push_never_matches() {
    let Setup {
        harness, gateway, ..
    } = setup(FakeRunner::new(), FakeProbe::healthy());

    let response = push(&gateway, "demo", "refs/tags/main").await;

    assert_eq!(response.body["message"], "branch ignored");
    assert!(harness.runner.commands().is_empty());
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let Setup {
        harness, gateway, ..
    } = setup(FakeRunner::new(), FakeProbe::healthy());
    let body = push_body("demo", "refs/heads/main", "abc123de");

    for secret in [Some("wrong-secret"), None] {
        let response = gateway.handle(&body, &headers("push", &body, secret)).await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        let trace = trace_of(&harness.tracer, &response);
        assert_eq!(trace.status, TraceStatus::Failed);
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].name, "signature");
        assert_eq!(trace.steps[0].status, StepStatus::Failed);
    }
    assert!(harness.runner.commands().is_empty());
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let Setup {
        harness, gateway, ..
    } = setup(FakeRunner::new(), FakeProbe::healthy());
    let body = br#"{"ref": "refs/heads/main"}"#.to_vec();

    let response = gateway
        .handle(&body, &headers("push", &body, Some(SECRET)))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let trace = trace_of(&harness.tracer, &response);
    assert_eq!(trace.steps.len(), 1);
    assert_eq!(trace.steps[0].name, "parse");
}

#[tokio::test]
async fn test_ping_and_other_events() {
    let Setup {
        harness, gateway, ..
    } = setup(FakeRunner::new(), FakeProbe::healthy());
    let body = br#"{"zen": "Keep it logically awesome."}"#.to_vec();

    let response = gateway
        .handle(&body, &headers("ping", &body, Some(SECRET)))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "pong");

    let response = gateway
        .handle(&body, &headers("issues", &body, Some(SECRET)))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(trace_of(&harness.tracer, &response).status, TraceStatus::Skipped);
}

#[tokio::test]
async fn test_second_delivery_while_deploying_is_rejected() {
    let Setup {
        harness, gateway, ..
    } = setup(
        FakeRunner::with_delay(Duration::from_millis(20)),
        FakeProbe::healthy(),
    );

    let (first, second) = tokio::join!(
        push(&gateway, "demo", "refs/heads/main"),
        push(&gateway, "demo", "refs/heads/main"),
    );

    let mut statuses = vec![first.status, second.status];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    let rejected = if first.status == StatusCode::CONFLICT {
        first
    } else {
        second
    };
    assert_eq!(rejected.body["error"], "deployment in progress");
    assert_eq!(
        trace_of(&harness.tracer, &rejected).status,
        TraceStatus::Skipped
    );
    assert!(gateway.in_flight().is_empty());
}

#[tokio::test]
async fn test_manual_trigger() {
    let Setup {
        harness, gateway, ..
    } = setup(FakeRunner::new(), FakeProbe::healthy());

    let response = gateway.trigger_manual("demo").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["deployment"]["commit"], "HEAD");
    assert_eq!(response.body["deployment"]["trigger"], "manual");
    assert_eq!(trace_of(&harness.tracer, &response).kind, TraceKind::Manual);

    let response = gateway.trigger_manual("nope").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["availableProjects"], serde_json::json!(["demo"]));
}
