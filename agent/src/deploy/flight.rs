//! Single-flight guard: at most one deployment per project at a time

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Projects with a deployment in flight
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    projects: Arc<Mutex<BTreeSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `project`; `None` when it is already in flight
    pub fn try_acquire(&self, project: &str) -> Option<FlightGuard> {
        let mut projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        if !projects.insert(project.to_string()) {
            return None;
        }
        Some(FlightGuard {
            project: project.to_string(),
            projects: self.projects.clone(),
        })
    }

    /// Projects currently deploying, sorted
    pub fn active(&self) -> Vec<String> {
        let projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        projects.iter().cloned().collect()
    }

    pub fn is_busy(&self) -> bool {
        let projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        !projects.is_empty()
    }
}

/// Releases the project on drop, including during unwinding
#[derive(Debug)]
pub struct FlightGuard {
    project: String,
    projects: Arc<Mutex<BTreeSet<String>>>,
}

impl FlightGuard {
    pub fn project(&self) -> &str {
        &self.project
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        projects.remove(&self.project);
    }
}
