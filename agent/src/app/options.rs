//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::orchestrator::{MonitorSettings, OrchestratorSettings};
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::notify::messaging::MessagingOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options, built once from [`Settings`] and handed to
/// every component
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub lifecycle: LifecycleOptions,

    pub storage: StorageOptions,

    pub server: ServerOptions,

    /// Shared HMAC secret for inbound webhooks
    pub webhook_secret: SecretString,

    pub orchestrator: OrchestratorSettings,

    /// Timeout for health, dependency and certificate probes
    pub probe_timeout: Duration,

    pub notifications: NotificationOptions,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        let projects_file = match &settings.projects_file {
            Some(path) => File::new(path),
            None => layout.projects_file(),
        };
        let traces_dir = match &settings.traces.dir {
            Some(path) => Dir::new(path),
            None => layout.traces_dir(),
        };

        let deploy = &settings.deploy;
        let orchestrator = OrchestratorSettings {
            command_timeout: Duration::from_secs(deploy.command_timeout_secs),
            toolchain_checks: deploy.toolchain_checks.clone(),
            strict_tests: deploy.strict_tests,
            monitor: MonitorSettings {
                interval: Duration::from_millis(deploy.monitor.interval_ms),
                window: Duration::from_millis(deploy.monitor.window_ms),
                required_healthy: deploy.monitor.required_healthy,
            },
        };

        let notifications = &settings.notifications;
        let messaging = &notifications.messaging;
        let messaging = match (&messaging.api_url, &messaging.token, &messaging.recipient) {
            (Some(api_url), Some(token), Some(recipient)) => Some(MessagingConfig {
                api_url: api_url.clone(),
                token: token.clone(),
                product: messaging.product.clone(),
                options: MessagingOptions {
                    recipient: recipient.clone(),
                    success_template: messaging.success_template.clone(),
                    failure_template: messaging.failure_template.clone(),
                    language: messaging.language.clone(),
                },
            }),
            _ => None,
        };

        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions {
                layout,
                projects_file,
                traces_dir: Some(traces_dir),
                trace_capacity: settings.traces.capacity,
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            webhook_secret: settings
                .webhook
                .secret
                .clone()
                .unwrap_or_else(|| SecretString::from(String::new())),
            orchestrator,
            probe_timeout: Duration::from_millis(deploy.probe_timeout_ms),
            notifications: NotificationOptions {
                desktop: notifications.desktop.enabled,
                webhook_url: notifications.webhook.url.clone(),
                messaging,
                channel_timeout: Duration::from_millis(notifications.channel_timeout_ms),
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub layout: StorageLayout,

    /// Project configuration document, re-read per request
    pub projects_file: File,

    /// Trace persistence directory; in-memory only when `None`
    pub traces_dir: Option<Dir>,

    pub trace_capacity: usize,
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Enabled notification channels
#[derive(Debug, Clone)]
pub struct NotificationOptions {
    /// Desktop notifications, on platforms that have them
    pub desktop: bool,

    pub webhook_url: Option<String>,

    pub messaging: Option<MessagingConfig>,

    pub channel_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub api_url: String,
    pub token: SecretString,
    pub product: String,
    pub options: MessagingOptions,
}
