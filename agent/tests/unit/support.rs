//! Fakes for external commands, probes and channels

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::watch;

use shipd::deploy::command::{CommandOutcome, CommandRunner, Invocation};
use shipd::deploy::orchestrator::{DeploymentOrchestrator, MonitorSettings, OrchestratorSettings};
use shipd::deploy::probe::EnvironmentProbe;
use shipd::errors::AgentError;
use shipd::models::notification::NotificationEvent;
use shipd::models::project::ProjectConfig;
use shipd::notify::{Channel, NotificationRouter};
use shipd::projects::registry::{ProjectRegistry, ProjectSource};
use shipd::tracer::recorder::TraceRecorder;
use shipd::webhook::gateway::WebhookGateway;

pub const SECRET: &str = "test-secret";
pub const MARKER: &str = "0123456789abcdef0123456789abcdef01234567";

/// Records every invocation; commands containing a configured fragment fail
#[derive(Default)]
pub struct FakeRunner {
    failing: Mutex<Vec<String>>,
    invocations: Mutex<Vec<Invocation>>,
    delay: Option<Duration>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn fail_on(&self, fragment: &str) {
        self.failing.lock().unwrap().push(fragment.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.command.clone())
            .collect()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> CommandOutcome {
        self.invocations.lock().unwrap().push(invocation.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let fails = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|f| invocation.command.contains(f.as_str()));
        if fails {
            return CommandOutcome::failed(1, format!("{} failed", invocation.command));
        }
        if invocation.command == "git rev-parse HEAD" {
            return CommandOutcome::succeeded(format!("{}\n", MARKER));
        }
        CommandOutcome::succeeded("")
    }
}

/// Scripted environment: health answers are consumed in order, then `healthy`
pub struct FakeProbe {
    pub healthy: bool,
    pub health_script: Mutex<VecDeque<bool>>,
    pub health_calls: Mutex<u32>,
    pub env: Vec<String>,
    pub unreachable: Vec<String>,
    pub bad_certificates: bool,
}

impl FakeProbe {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            health_script: Mutex::new(VecDeque::new()),
            health_calls: Mutex::new(0),
            env: Vec::new(),
            unreachable: Vec::new(),
            bad_certificates: false,
        }
    }

    pub fn scripted(answers: &[bool], then: bool) -> Self {
        Self {
            healthy: then,
            health_script: Mutex::new(answers.iter().copied().collect()),
            ..Self::healthy()
        }
    }

    pub fn health_calls(&self) -> u32 {
        *self.health_calls.lock().unwrap()
    }
}

#[async_trait]
impl EnvironmentProbe for FakeProbe {
    async fn http_healthy(&self, _url: &str) -> Result<(), String> {
        *self.health_calls.lock().unwrap() += 1;
        let answer = self
            .health_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.healthy);
        if answer {
            Ok(())
        } else {
            Err("status 503 Service Unavailable".to_string())
        }
    }

    async fn tcp_reachable(&self, address: &str) -> Result<(), String> {
        if self.unreachable.iter().any(|a| a == address) {
            Err("connection refused".to_string())
        } else {
            Ok(())
        }
    }

    async fn certificate_valid(&self, _url: &str) -> Result<(), String> {
        if self.bad_certificates {
            Err("certificate expired".to_string())
        } else {
            Ok(())
        }
    }

    fn env_present(&self, name: &str) -> bool {
        self.env.iter().any(|e| e == name)
    }
}

/// Channel that records events and succeeds or fails on demand
pub struct RecordingChannel {
    name: String,
    fail: bool,
    delay: Option<Duration>,
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingChannel {
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            delay: None,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::ok(name)
        }
    }

    pub fn slow(name: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok(name)
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), AgentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            Err(AgentError::NotifyError(format!("{} is down", self.name)))
        } else {
            Ok(())
        }
    }
}

/// Settings with a fast monitoring window: three 1ms probes, all required
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        command_timeout: Duration::from_secs(5),
        toolchain_checks: vec!["git --version".to_string()],
        strict_tests: false,
        monitor: MonitorSettings {
            interval: Duration::from_millis(1),
            window: Duration::from_millis(3),
            required_healthy: 3,
        },
    }
}

/// The `demo` project used throughout the tests
pub fn demo_project() -> ProjectConfig {
    let mut project = ProjectConfig::new("demo", "main");
    project.path = Some("/srv/demo".into());
    project.commands.validate = vec!["test -f package.json".to_string()];
    project.commands.test = vec!["npm test".to_string()];
    project.commands.build = vec!["npm run build".to_string()];
    project.commands.deploy = vec!["./deploy.sh".to_string()];
    project.commands.restart = Some("systemctl restart demo".to_string());
    project.urls.health = Some("http://127.0.0.1:3000/health".to_string());
    project.urls.production = Some("https://demo.example.com".to_string());
    project.urls.logs = Some("https://logs.example.com/demo".to_string());
    project.urls.repository = Some("https://git.example.com/acme/demo".to_string());
    project
}

pub struct Harness {
    pub runner: Arc<FakeRunner>,
    pub probe: Arc<FakeProbe>,
    pub tracer: Arc<TraceRecorder>,
    pub orchestrator: Arc<DeploymentOrchestrator>,
    pub interrupt: watch::Sender<bool>,
}

impl Harness {
    pub fn new(runner: FakeRunner, probe: FakeProbe) -> Self {
        Self::with_settings(runner, probe, fast_settings())
    }

    pub fn with_settings(
        runner: FakeRunner,
        probe: FakeProbe,
        settings: OrchestratorSettings,
    ) -> Self {
        let runner = Arc::new(runner);
        let probe = Arc::new(probe);
        let tracer = Arc::new(TraceRecorder::default());
        let (interrupt, interrupt_rx) = watch::channel(false);
        let orchestrator = Arc::new(DeploymentOrchestrator::new(
            settings,
            runner.clone(),
            probe.clone(),
            tracer.clone(),
            interrupt_rx,
        ));
        Self {
            runner,
            probe,
            tracer,
            orchestrator,
            interrupt,
        }
    }

    /// Gateway over `projects` fanning out to `channels`
    pub fn gateway(
        &self,
        projects: Vec<ProjectConfig>,
        channels: Vec<Arc<dyn Channel>>,
    ) -> WebhookGateway {
        let registry = ProjectRegistry::new(projects).unwrap();
        WebhookGateway::new(
            SecretString::from(SECRET.to_string()),
            ProjectSource::from(registry),
            self.tracer.clone(),
            self.orchestrator.clone(),
            Arc::new(NotificationRouter::new(channels, Duration::from_secs(1))),
        )
    }
}

/// A push payload for `repository` on `git_ref` at `sha`
pub fn push_body(repository: &str, git_ref: &str, sha: &str) -> Vec<u8> {
    serde_json::json!({
        "ref": git_ref,
        "after": sha,
        "repository": {
            "name": repository,
            "full_name": format!("acme/{}", repository),
            "html_url": format!("https://git.example.com/acme/{}", repository),
        },
        "head_commit": {
            "id": sha,
            "message": "Ship it",
            "url": format!("https://git.example.com/acme/{}/commit/{}", repository, sha),
            "author": {"name": "Dev", "email": "dev@example.com"},
        },
        "pusher": {"name": "dev"},
    })
    .to_string()
    .into_bytes()
}
