//! Application state management

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app::options::{AppOptions, NotificationOptions};
use crate::deploy::command::{CommandRunner, ShellRunner};
use crate::deploy::orchestrator::DeploymentOrchestrator;
use crate::deploy::probe::SystemProbe;
use crate::errors::AgentError;
use crate::notify::console::ConsoleChannel;
use crate::notify::desktop::{DesktopChannel, Platform};
use crate::notify::messaging::{HttpMessagingTransport, MessagingChannel};
use crate::notify::webhook::WebhookChannel;
use crate::notify::{Channel, NotificationRouter};
use crate::projects::registry::ProjectSource;
use crate::tracer::recorder::TraceRecorder;
use crate::webhook::gateway::WebhookGateway;

/// Main application state
pub struct AppState {
    pub started_at: DateTime<Utc>,

    pub tracer: Arc<TraceRecorder>,

    pub gateway: Arc<WebhookGateway>,

    /// Flipped to `true` on shutdown to cut health polling short
    interrupt: watch::Sender<bool>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        let tracer = Arc::new(match &options.storage.traces_dir {
            Some(dir) => TraceRecorder::load(options.storage.trace_capacity, dir.clone()).await?,
            None => TraceRecorder::new(options.storage.trace_capacity),
        });

        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner);
        let probe = Arc::new(SystemProbe::new(options.probe_timeout)?);
        let notifier = Arc::new(build_router(&options.notifications, runner.clone())?);
        info!("Notification channels: {:?}", notifier.channel_names());

        let (interrupt, interrupt_rx) = watch::channel(false);
        let orchestrator = Arc::new(DeploymentOrchestrator::new(
            options.orchestrator.clone(),
            runner,
            probe,
            tracer.clone(),
            interrupt_rx,
        ));

        let gateway = Arc::new(WebhookGateway::new(
            options.webhook_secret.clone(),
            ProjectSource::File(options.storage.projects_file.clone()),
            tracer.clone(),
            orchestrator,
            notifier,
        ));
        if !gateway.has_secret() {
            warn!("No webhook secret configured: every signed delivery will be rejected");
        }

        Ok(Self {
            started_at: Utc::now(),
            tracer,
            gateway,
            interrupt,
        })
    }

    /// Ask running deployments to stop polling
    pub fn interrupt(&self) {
        self.interrupt.send_replace(true);
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        info!("Shutting down application state...");
        self.interrupt();
        let in_flight = self.gateway.in_flight();
        if !in_flight.is_empty() {
            warn!("Interrupting in-flight deployments: {:?}", in_flight);
        }
        Ok(())
    }
}

/// Console is always on; every other channel needs its configuration
pub fn build_router(
    options: &NotificationOptions,
    runner: Arc<dyn CommandRunner>,
) -> Result<NotificationRouter, AgentError> {
    let mut channels: Vec<Arc<dyn Channel>> = vec![Arc::new(ConsoleChannel::new())];

    if options.desktop {
        match Platform::current() {
            Some(platform) => channels.push(Arc::new(DesktopChannel::new(platform, runner))),
            None => info!("Desktop notifications are not supported on this platform"),
        }
    }

    if let Some(url) = &options.webhook_url {
        channels.push(Arc::new(WebhookChannel::new(
            url.clone(),
            options.channel_timeout,
        )?));
    }

    if let Some(messaging) = &options.messaging {
        let transport = HttpMessagingTransport::new(
            messaging.api_url.clone(),
            messaging.token.clone(),
            messaging.product.clone(),
            options.channel_timeout,
        )?;
        channels.push(Arc::new(MessagingChannel::new(
            Arc::new(transport),
            messaging.options.clone(),
        )));
    }

    Ok(NotificationRouter::new(channels, options.channel_timeout))
}
