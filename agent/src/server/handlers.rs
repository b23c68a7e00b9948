//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Serialize;

use crate::models::trace::Trace;
use crate::server::state::ServerState;
use crate::telemetry::{collect_host_info, HostInfo};
use crate::utils::version_info;
use crate::webhook::gateway::GatewayResponse;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "shipd".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Readiness of the gateway's own parts
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// A webhook secret is configured
    pub webhook: bool,
    pub tracing: bool,
    pub notifications: bool,
    /// `idle` or `busy`
    pub deployment: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    pub components: ComponentStatus,
    pub in_flight: Vec<String>,
    pub channels: Vec<String>,
    pub traces: usize,
    pub host: HostInfo,
}

/// Status handler
pub async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let gateway = &state.gateway;
    let in_flight = gateway.in_flight();
    let channels = gateway.notifier().channel_names();

    Json(StatusResponse {
        status: "running".to_string(),
        version: version_info().version,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        components: ComponentStatus {
            webhook: gateway.has_secret(),
            tracing: true,
            notifications: !channels.is_empty(),
            deployment: if in_flight.is_empty() { "idle" } else { "busy" }.to_string(),
        },
        in_flight,
        channels,
        traces: state.tracer.len(),
        host: collect_host_info(),
    })
}

/// Signed push deliveries
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResponse {
    state.gateway.handle(&body, &headers).await
}

/// Operator-triggered deployment
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(project): Path<String>,
) -> GatewayResponse {
    state.gateway.trigger_manual(&project).await
}

pub async fn latest_trace_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Trace>, StatusCode> {
    state
        .tracer
        .get_latest_trace()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn trace_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Trace>, StatusCode> {
    state.tracer.get_trace(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// All retained traces for one project, newest first
pub async fn project_traces_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Json<Vec<Trace>> {
    Json(state.tracer.get_traces_for_project(&name))
}
