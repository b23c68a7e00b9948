//! Project configuration models

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One deployable unit, keyed by repository name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Repository name; filled in from the document key
    #[serde(default, skip_deserializing)]
    pub name: String,

    /// The single tracked branch
    pub branch: String,

    /// Working directory for every command; the registry rejects projects
    /// without an absolute one
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub commands: ProjectCommands,

    #[serde(default)]
    pub urls: ProjectUrls,

    #[serde(default)]
    pub checks: ProjectChecks,
}

/// Ordered shell invocations per phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCommands {
    #[serde(default)]
    pub validate: Vec<String>,

    #[serde(default)]
    pub test: Vec<String>,

    #[serde(default)]
    pub build: Vec<String>,

    #[serde(default)]
    pub deploy: Vec<String>,

    #[serde(default)]
    pub restart: Option<String>,

    #[serde(default)]
    pub rollback: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUrls {
    /// Polled during monitoring; required by the registry
    #[serde(default)]
    pub health: Option<String>,

    #[serde(default)]
    pub production: Option<String>,

    #[serde(default)]
    pub logs: Option<String>,

    /// Web URL of the repository, used to build commit links
    #[serde(default)]
    pub repository: Option<String>,
}

/// Pre-production checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectChecks {
    /// Environment variables that must be set
    #[serde(default)]
    pub env: Vec<String>,

    /// `host:port` pairs that must accept a TCP connection
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ProjectConfig {
    /// Create a project tracking `branch` with no commands
    pub fn new(name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branch: branch.into(),
            path: None,
            commands: ProjectCommands::default(),
            urls: ProjectUrls::default(),
            checks: ProjectChecks::default(),
        }
    }

    pub fn build_commands(&self) -> &[String] {
        &self.commands.build
    }

    pub fn deploy_commands(&self) -> &[String] {
        &self.commands.deploy
    }

    pub fn rollback_command(&self) -> Option<&str> {
        self.commands.rollback.as_deref()
    }

    pub fn health_check_url(&self) -> Option<&str> {
        self.urls.health.as_deref()
    }

    pub fn production_url(&self) -> Option<&str> {
        self.urls.production.as_deref()
    }

    /// Link to a commit in the repository web UI
    pub fn commit_url(&self, sha: &str) -> Option<String> {
        self.urls
            .repository
            .as_deref()
            .map(|repo| format!("{}/commit/{}", repo.trim_end_matches('/'), sha))
    }
}
