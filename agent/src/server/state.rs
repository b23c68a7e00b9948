//! Server state

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::tracer::recorder::TraceRecorder;
use crate::webhook::gateway::WebhookGateway;

/// Server state shared across handlers
pub struct ServerState {
    pub gateway: Arc<WebhookGateway>,
    pub tracer: Arc<TraceRecorder>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(
        gateway: Arc<WebhookGateway>,
        tracer: Arc<TraceRecorder>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            gateway,
            tracer,
            started_at,
        }
    }
}
