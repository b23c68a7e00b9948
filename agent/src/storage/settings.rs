//! Settings file management
//!
//! Every field has a default so a partial (or empty) `settings.json` is valid.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;

use crate::logs::LogLevel;

/// Daemon settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Daily-rolling log file directory
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Project configuration document; `<base>/projects.json` when absent
    #[serde(default)]
    pub projects_file: Option<PathBuf>,

    #[serde(default)]
    pub traces: TraceSettings,

    #[serde(default)]
    pub deploy: DeploySettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

fn default_true() -> bool {
    true
}

/// Local HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Inbound webhook settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookSettings {
    /// Shared HMAC secret. Without one every signed request is rejected.
    #[serde(default)]
    pub secret: Option<SecretString>,
}

/// Trace ledger settings
#[derive(Debug, Clone, Deserialize)]
pub struct TraceSettings {
    /// Persistence directory; `<base>/traces` when absent
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Traces kept in memory
    #[serde(default = "default_trace_capacity")]
    pub capacity: usize,
}

fn default_trace_capacity() -> usize {
    500
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            dir: None,
            capacity: default_trace_capacity(),
        }
    }
}

/// Deployment settings
#[derive(Debug, Clone, Deserialize)]
pub struct DeploySettings {
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Commands that must pass before any project command runs
    #[serde(default = "default_toolchain_checks")]
    pub toolchain_checks: Vec<String>,

    /// Fail the building phase on test failures
    #[serde(default)]
    pub strict_tests: bool,

    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Timeout for health and dependency probes
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

fn default_command_timeout() -> u64 {
    600
}

fn default_toolchain_checks() -> Vec<String> {
    vec!["git --version".to_string()]
}

fn default_probe_timeout() -> u64 {
    5_000
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            toolchain_checks: default_toolchain_checks(),
            strict_tests: false,
            monitor: MonitorConfig::default(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

/// Health monitoring window
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_monitor_window")]
    pub window_ms: u64,

    #[serde(default = "default_required_healthy")]
    pub required_healthy: u32,
}

fn default_monitor_interval() -> u64 {
    5_000
}

fn default_monitor_window() -> u64 {
    30_000
}

fn default_required_healthy() -> u32 {
    3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_monitor_interval(),
            window_ms: default_monitor_window(),
            required_healthy: default_required_healthy(),
        }
    }
}

/// Notification channel settings. A channel without its URL or credential
/// is disabled.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub desktop: DesktopSettings,

    #[serde(default)]
    pub webhook: OutboundWebhookSettings,

    #[serde(default)]
    pub messaging: MessagingSettings,

    /// Upper bound on one channel's delivery
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout_ms: u64,
}

fn default_channel_timeout() -> u64 {
    10_000
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            desktop: DesktopSettings::default(),
            webhook: OutboundWebhookSettings::default(),
            messaging: MessagingSettings::default(),
            channel_timeout_ms: default_channel_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DesktopSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DesktopSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutboundWebhookSettings {
    #[serde(default)]
    pub url: Option<String>,
}

/// Business messaging API settings
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingSettings {
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub token: Option<SecretString>,

    #[serde(default)]
    pub recipient: Option<String>,

    #[serde(default = "default_success_template")]
    pub success_template: String,

    #[serde(default = "default_failure_template")]
    pub failure_template: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_product")]
    pub product: String,
}

fn default_success_template() -> String {
    "deployment_success".to_string()
}

fn default_failure_template() -> String {
    "deployment_failure".to_string()
}

fn default_language() -> String {
    "en_US".to_string()
}

fn default_product() -> String {
    "whatsapp".to_string()
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            api_url: None,
            token: None,
            recipient: None,
            success_template: default_success_template(),
            failure_template: default_failure_template(),
            language: default_language(),
            product: default_product(),
        }
    }
}
