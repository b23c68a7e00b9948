//! External command execution
//!
//! Build, test, deploy and rollback steps are opaque shell invocations. A
//! timeout counts as a failure exactly like a non-zero exit code.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// One shell invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            env: Vec::new(),
            timeout,
        }
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Value of an environment variable set on this invocation
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Result of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self {
            success: false,
            timed_out: true,
            stderr: format!("timed out after {:?}", after),
            ..Default::default()
        }
    }

    /// One-line description for step details
    pub fn summary(&self) -> String {
        if self.success {
            return "ok".to_string();
        }
        let last_line = self
            .stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim();
        match (self.timed_out, self.exit_code) {
            (true, _) => last_line.to_string(),
            (false, Some(code)) if last_line.is_empty() => format!("exit code {}", code),
            (false, Some(code)) => format!("exit code {}: {}", code, last_line),
            (false, None) if last_line.is_empty() => "terminated by signal".to_string(),
            (false, None) => last_line.to_string(),
        }
    }
}

/// Runs shell invocations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> CommandOutcome;
}

/// Runs invocations through `bash -c`
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, invocation: &Invocation) -> CommandOutcome {
        debug!("Running command: {}", invocation.command);

        let mut command = Command::new("bash");
        command
            .args(["-c", &invocation.command])
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        match tokio::time::timeout(invocation.timeout, command.output()).await {
            Ok(Ok(output)) => CommandOutcome {
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            },
            Ok(Err(e)) => {
                warn!("Failed to spawn {}: {}", invocation.command, e);
                CommandOutcome {
                    stderr: format!("failed to spawn: {}", e),
                    ..Default::default()
                }
            }
            Err(_) => {
                warn!(
                    "Command timed out after {:?}: {}",
                    invocation.timeout, invocation.command
                );
                CommandOutcome::timed_out(invocation.timeout)
            }
        }
    }
}

/// Quote a string for safe interpolation into a `bash -c` command line
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
