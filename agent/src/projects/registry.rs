//! Project registry
//!
//! Maps repository names from inbound events to their deployment
//! configuration. The backing document is re-read for every request when the
//! source is a file, so edits apply to the next push without a restart.

use std::fmt;
use std::sync::Arc;

use serde::de::{Deserializer, Error as _, MapAccess, Visitor};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::models::project::ProjectConfig;

/// All configured projects, in document order
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    projects: Vec<ProjectConfig>,
}

impl ProjectRegistry {
    /// Build a registry, rejecting duplicate names and invalid entries
    pub fn new(projects: Vec<ProjectConfig>) -> Result<Self, AgentError> {
        for (i, project) in projects.iter().enumerate() {
            if projects[..i].iter().any(|p| p.name == project.name) {
                return Err(AgentError::ConfigError(format!(
                    "duplicate project: {}",
                    project.name
                )));
            }
            validate(project)?;
        }
        Ok(Self { projects })
    }

    /// Parse a `{name: {branch, commands, urls, ...}}` document
    pub fn from_json(contents: &str) -> Result<Self, AgentError> {
        let document: ProjectsDocument = serde_json::from_str(contents)
            .map_err(|e| AgentError::ConfigError(format!("invalid projects document: {}", e)))?;
        Self::new(document.0)
    }

    /// Load the registry from a projects file
    pub async fn load(file: &File) -> Result<Self, AgentError> {
        let contents = file.read_string().await.map_err(|e| {
            AgentError::ConfigError(format!(
                "unable to read {}: {}",
                file.path().display(),
                e
            ))
        })?;
        let registry = Self::from_json(&contents)?;
        debug!(
            "Loaded {} project(s) from {}",
            registry.len(),
            file.path().display()
        );
        Ok(registry)
    }

    /// Exact, case-sensitive lookup by repository name
    pub fn resolve(&self, repository: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.name == repository)
    }

    /// Configured names, for the "not configured" diagnostic
    pub fn list_available(&self) -> Vec<String> {
        self.projects.iter().map(|p| p.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

fn validate(project: &ProjectConfig) -> Result<(), AgentError> {
    if project.name.trim().is_empty() {
        return Err(AgentError::ConfigError("project name is empty".to_string()));
    }
    if project.branch.trim().is_empty() {
        return Err(AgentError::ConfigError(format!(
            "project {} has no branch",
            project.name
        )));
    }
    match &project.path {
        Some(path) if path.is_absolute() => {}
        Some(path) => {
            return Err(AgentError::ConfigError(format!(
                "project {} path {} is not absolute",
                project.name,
                path.display()
            )))
        }
        None => {
            return Err(AgentError::ConfigError(format!(
                "project {} has no path",
                project.name
            )))
        }
    }
    if project.urls.health.is_none() {
        return Err(AgentError::ConfigError(format!(
            "project {} has no health url",
            project.name
        )));
    }

    let urls = [
        ("health", &project.urls.health),
        ("production", &project.urls.production),
        ("logs", &project.urls.logs),
        ("repository", &project.urls.repository),
    ];
    for (label, value) in urls {
        if let Some(value) = value {
            Url::parse(value).map_err(|e| {
                AgentError::ConfigError(format!(
                    "project {} has an invalid {} url {:?}: {}",
                    project.name, label, value, e
                ))
            })?;
        }
    }

    Ok(())
}

/// Ordered project entries; a repeated key is a parse error instead of a
/// silent overwrite
struct ProjectsDocument(Vec<ProjectConfig>);

impl<'de> Deserialize<'de> for ProjectsDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = ProjectsDocument;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of project name to project configuration")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut projects: Vec<ProjectConfig> = Vec::new();
                while let Some((name, mut project)) = map.next_entry::<String, ProjectConfig>()? {
                    if projects.iter().any(|p| p.name == name) {
                        return Err(A::Error::custom(format!("duplicate project: {}", name)));
                    }
                    project.name = name;
                    projects.push(project);
                }
                Ok(ProjectsDocument(projects))
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Where the registry comes from
#[derive(Debug, Clone)]
pub enum ProjectSource {
    /// Re-read on every request
    File(File),

    /// Fixed at construction
    Static(Arc<ProjectRegistry>),
}

impl ProjectSource {
    pub async fn load(&self) -> Result<Arc<ProjectRegistry>, AgentError> {
        match self {
            ProjectSource::File(file) => Ok(Arc::new(ProjectRegistry::load(file).await?)),
            ProjectSource::Static(registry) => Ok(registry.clone()),
        }
    }
}

impl From<ProjectRegistry> for ProjectSource {
    fn from(registry: ProjectRegistry) -> Self {
        ProjectSource::Static(Arc::new(registry))
    }
}
