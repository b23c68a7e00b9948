//! Webhook gateway
//!
//! Turns one inbound request into at most one deployment attempt:
//! signature, event filtering, payload parsing, project and branch routing,
//! single-flight, orchestration, notification and trace completion. Every
//! outcome is a [`GatewayResponse`]; nothing here returns an error to the
//! HTTP layer.

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{HeaderMap, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::deploy::flight::InFlight;
use crate::deploy::orchestrator::{DeploymentOrchestrator, DeploymentRequest};
use crate::models::deployment::StepStatus;
use crate::models::notification::NotificationEvent;
use crate::models::project::ProjectConfig;
use crate::models::push::PushEvent;
use crate::models::trace::TraceKind;
use crate::notify::NotificationRouter;
use crate::projects::registry::ProjectSource;
use crate::tracer::recorder::TraceRecorder;
use crate::webhook::signature;

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Commit recorded for manual deployments
pub const MANUAL_COMMIT: &str = "HEAD";

/// Status code plus JSON body
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl GatewayResponse {
    fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub struct WebhookGateway {
    secret: SecretString,
    projects: ProjectSource,
    tracer: Arc<TraceRecorder>,
    orchestrator: Arc<DeploymentOrchestrator>,
    notifier: Arc<NotificationRouter>,
    flights: InFlight,
}

impl WebhookGateway {
    pub fn new(
        secret: SecretString,
        projects: ProjectSource,
        tracer: Arc<TraceRecorder>,
        orchestrator: Arc<DeploymentOrchestrator>,
        notifier: Arc<NotificationRouter>,
    ) -> Self {
        Self {
            secret,
            projects,
            tracer,
            orchestrator,
            notifier,
            flights: InFlight::new(),
        }
    }

    /// Projects with a deployment running
    pub fn in_flight(&self) -> Vec<String> {
        self.flights.active()
    }

    pub fn notifier(&self) -> &NotificationRouter {
        &self.notifier
    }

    pub fn has_secret(&self) -> bool {
        !self.secret.expose_secret().is_empty()
    }

    /// Handle one signed webhook delivery
    pub async fn handle(&self, body: &[u8], headers: &HeaderMap) -> GatewayResponse {
        // Deliveries without an event header are treated as pushes
        let event = header(headers, EVENT_HEADER).unwrap_or("push").to_string();
        let delivery = header(headers, DELIVERY_HEADER).map(str::to_string);

        let supplied = header(headers, SIGNATURE_HEADER);
        if !signature::verify(body, supplied, self.secret.expose_secret().as_bytes()) {
            let trace_id = self
                .tracer
                .start_trace(
                    TraceKind::Webhook,
                    None,
                    json!({ "event": event, "delivery": delivery }),
                )
                .await;
            let detail = if supplied.is_some() {
                "signature mismatch"
            } else {
                "signature missing"
            };
            warn!("Rejected webhook delivery {:?}: {} (trace {})", delivery, detail, trace_id);
            self.tracer
                .log_step(&trace_id, "signature", StepStatus::Failed, Some(detail.into()))
                .await;
            self.tracer.complete_trace(&trace_id, false).await;
            return GatewayResponse::new(
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "error": "invalid signature", "traceId": trace_id }),
            );
        }

        match event.as_str() {
            "ping" => {
                debug!("Ping delivery {:?}", delivery);
                return GatewayResponse::ok(json!({ "ok": true, "message": "pong" }));
            }
            "push" => {}
            other => {
                let trace_id = self
                    .tracer
                    .start_trace(
                        TraceKind::Webhook,
                        None,
                        json!({ "event": other, "delivery": delivery }),
                    )
                    .await;
                info!("Ignoring {} event (trace {})", other, trace_id);
                self.tracer
                    .log_step(
                        &trace_id,
                        "event",
                        StepStatus::Skipped,
                        Some(format!("{} events are not deployed", other)),
                    )
                    .await;
                self.tracer.skip_trace(&trace_id).await;
                return GatewayResponse::ok(json!({
                    "skipped": true,
                    "message": "event ignored",
                    "event": other,
                    "traceId": trace_id,
                }));
            }
        }

        let push = match PushEvent::parse(body) {
            Ok(push) => push,
            Err(e) => {
                let trace_id = self
                    .tracer
                    .start_trace(
                        TraceKind::Webhook,
                        None,
                        json!({ "event": event, "delivery": delivery }),
                    )
                    .await;
                warn!("Malformed push payload (trace {}): {}", trace_id, e);
                self.tracer
                    .log_step(&trace_id, "parse", StepStatus::Failed, Some(e.to_string()))
                    .await;
                self.tracer.complete_trace(&trace_id, false).await;
                return GatewayResponse::new(
                    StatusCode::BAD_REQUEST,
                    json!({
                        "success": false,
                        "error": format!("invalid payload: {}", e),
                        "traceId": trace_id,
                    }),
                );
            }
        };

        let repository = push.repository.name.clone();
        let trace_id = self
            .tracer
            .start_trace(
                TraceKind::Webhook,
                Some(&repository),
                json!({
                    "event": event,
                    "delivery": delivery,
                    "repository": repository,
                    "ref": push.git_ref,
                    "commit": push.commit_sha(),
                    "message": push.commit_message(),
                    "author": push.author(),
                }),
            )
            .await;
        self.tracer
            .log_step(&trace_id, "signature", StepStatus::Completed, None)
            .await;

        let registry = match self.projects.load().await {
            Ok(registry) => registry,
            Err(e) => {
                error!("Cannot load projects (trace {}): {}", trace_id, e);
                self.tracer
                    .log_step(&trace_id, "projects", StepStatus::Failed, Some(e.to_string()))
                    .await;
                self.tracer.complete_trace(&trace_id, false).await;
                return internal_error(e.to_string(), &trace_id);
            }
        };

        let Some(project) = registry.resolve(&repository).cloned() else {
            let available = registry.list_available();
            info!("Repository {} is not configured (trace {})", repository, trace_id);
            self.tracer
                .log_step(
                    &trace_id,
                    "resolve",
                    StepStatus::Skipped,
                    Some(format!("{} is not configured", repository)),
                )
                .await;
            self.tracer.skip_trace(&trace_id).await;
            return GatewayResponse::ok(json!({
                "skipped": true,
                "message": "project not configured",
                "project": repository,
                "availableProjects": available,
                "traceId": trace_id,
            }));
        };

        if push.branch() != Some(project.branch.as_str()) {
            info!(
                "Ignoring {} on {}: deploys from {} (trace {})",
                push.git_ref, project.name, project.branch, trace_id
            );
            self.tracer
                .log_step(
                    &trace_id,
                    "branch",
                    StepStatus::Skipped,
                    Some(format!("{} does not match {}", push.git_ref, project.branch)),
                )
                .await;
            self.tracer.skip_trace(&trace_id).await;
            return GatewayResponse::ok(json!({
                "skipped": true,
                "message": "branch ignored",
                "project": project.name,
                "ref": push.git_ref,
                "branch": project.branch,
                "traceId": trace_id,
            }));
        }

        let request = DeploymentRequest {
            trace_id,
            commit: push.commit_sha().to_string(),
            branch: project.branch.clone(),
            trigger: TraceKind::Webhook,
        };
        self.deploy(project, request).await
    }

    /// Operator-triggered deployment of the project's current checkout. No
    /// signature is checked.
    pub async fn trigger_manual(&self, name: &str) -> GatewayResponse {
        let registry = match self.projects.load().await {
            Ok(registry) => registry,
            Err(e) => {
                error!("Cannot load projects: {}", e);
                return GatewayResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "error": e.to_string() }),
                );
            }
        };

        let Some(project) = registry.resolve(name).cloned() else {
            return GatewayResponse::new(
                StatusCode::NOT_FOUND,
                json!({
                    "success": false,
                    "error": "project not configured",
                    "project": name,
                    "availableProjects": registry.list_available(),
                }),
            );
        };

        let trace_id = self
            .tracer
            .start_trace(
                TraceKind::Manual,
                Some(&project.name),
                json!({ "trigger": "manual", "commit": MANUAL_COMMIT }),
            )
            .await;
        info!("Manual deployment of {} (trace {})", project.name, trace_id);

        let request = DeploymentRequest {
            trace_id,
            commit: MANUAL_COMMIT.to_string(),
            branch: project.branch.clone(),
            trigger: TraceKind::Manual,
        };
        self.deploy(project, request).await
    }

    /// Single-flight, orchestration, notification and trace completion.
    ///
    /// The run happens on its own task holding the flight guard, so a caller
    /// that goes away does not abandon the attempt or release the project
    /// early.
    async fn deploy(&self, project: ProjectConfig, request: DeploymentRequest) -> GatewayResponse {
        let trace_id = request.trace_id.clone();

        let Some(guard) = self.flights.try_acquire(&project.name) else {
            warn!("{} is already deploying (trace {})", project.name, trace_id);
            self.tracer
                .log_step(
                    &trace_id,
                    "single_flight",
                    StepStatus::Skipped,
                    Some("deployment in progress".into()),
                )
                .await;
            self.tracer.skip_trace(&trace_id).await;
            return GatewayResponse::new(
                StatusCode::CONFLICT,
                json!({
                    "success": false,
                    "error": "deployment in progress",
                    "project": project.name,
                    "traceId": trace_id,
                }),
            );
        };

        let orchestrator = self.orchestrator.clone();
        let notifier = self.notifier.clone();
        let tracer = self.tracer.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let id = request.trace_id.clone();

            let attempt = orchestrator.execute(&project, request).await;

            let event = NotificationEvent::deployment_outcome(&attempt, &project);
            let notifications = notifier.send(&event).await;
            let delivered = notifications.iter().filter(|r| r.success).count();
            tracer
                .log_step(
                    &id,
                    "notify",
                    StepStatus::Completed,
                    Some(format!("{}/{} channels delivered", delivered, notifications.len())),
                )
                .await;
            tracer.complete_trace(&id, attempt.is_success()).await;

            (attempt, notifications)
        });

        match task.await {
            Ok((attempt, notifications)) => GatewayResponse::ok(json!({
                "success": attempt.is_success(),
                "traceId": trace_id,
                "deployment": attempt,
                "notifications": notifications,
            })),
            Err(e) => {
                error!("Deployment task for trace {} died: {}", trace_id, e);
                self.tracer
                    .log_step(&trace_id, "deployment", StepStatus::Failed, Some(e.to_string()))
                    .await;
                self.tracer.complete_trace(&trace_id, false).await;
                internal_error("deployment task failed".to_string(), &trace_id)
            }
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn internal_error(error: String, trace_id: &str) -> GatewayResponse {
    GatewayResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "success": false, "error": error, "traceId": trace_id }),
    )
}
