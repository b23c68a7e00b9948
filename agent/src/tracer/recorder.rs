//! Trace recorder
//!
//! Append-only ledger of deployment attempts. Recording never fails the
//! caller: unknown ids and persistence errors are logged and dropped.
//! Capacity is enforced by evicting the oldest completed traces; running
//! traces keep their slot, so the ledger can briefly exceed it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use tracing::{debug, warn};

use crate::deploy::fsm::Phase;
use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::models::deployment::{Step, StepStatus};
use crate::models::trace::{Trace, TraceKind, TraceStatus};
use crate::utils::generate_uuid;

/// Default number of traces kept in memory
pub const DEFAULT_CAPACITY: usize = 500;

struct Entry {
    trace: Trace,
    /// Insertion order, breaks ties between equal start times
    seq: u64,
}

impl Entry {
    fn order_key(&self) -> (chrono::DateTime<Utc>, u64) {
        (self.trace.started_at, self.seq)
    }
}

/// In-memory trace ledger with optional JSON persistence
pub struct TraceRecorder {
    entries: RwLock<HashMap<String, Entry>>,
    next_seq: AtomicU64,
    capacity: usize,
    store: Option<Dir>,
}

impl TraceRecorder {
    /// Create an in-memory recorder
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            capacity: capacity.max(1),
            store: None,
        }
    }

    /// Create a recorder persisting each trace as `<id>.json` under `store`,
    /// seeded with whatever is already there. Traces left running by a
    /// previous process are closed as failed.
    pub async fn load(capacity: usize, store: Dir) -> Result<Self, AgentError> {
        store.create().await?;

        let mut recorder = Self::new(capacity);
        let mut traces = Vec::new();
        for file in store.list_files("json").await? {
            match file.read_json::<Trace>().await {
                Ok(trace) => traces.push(trace),
                Err(e) => warn!("Skipping unreadable trace {}: {}", file.path().display(), e),
            }
        }
        traces.sort_by_key(|t| t.started_at);
        debug!("Loaded {} persisted trace(s)", traces.len());

        let mut abandoned = Vec::new();
        let mut evicted = Vec::new();
        for mut trace in traces {
            if !trace.is_complete() {
                trace.steps.push(Step::new(
                    "recovery",
                    StepStatus::Failed,
                    Some("process stopped before completion".into()),
                ));
                trace.status = TraceStatus::Failed;
                trace.completed_at = Some(Utc::now());
                abandoned.push(trace.id.clone());
            }
            evicted.extend(recorder.insert(trace));
        }
        recorder.store = Some(store);

        for id in abandoned {
            if let Some(trace) = recorder.get_trace(&id) {
                warn!("Trace {} was left running, marking it failed", id);
                recorder.persist(trace).await;
            }
        }
        for id in evicted {
            recorder.forget(&id).await;
        }
        Ok(recorder)
    }

    /// Open a trace and return its id
    pub async fn start_trace(
        &self,
        kind: TraceKind,
        project: Option<&str>,
        metadata: serde_json::Value,
    ) -> String {
        let id = generate_uuid();
        let trace = Trace::new(id.clone(), kind, project.map(str::to_string), metadata);
        let evicted = self.insert(trace.clone());

        self.persist(trace).await;
        for id in evicted {
            self.forget(&id).await;
        }
        id
    }

    /// Append a step; unknown ids are logged and ignored
    pub async fn log_step(
        &self,
        trace_id: &str,
        name: &str,
        status: StepStatus,
        detail: Option<String>,
    ) {
        let step = Step::new(name, status, detail);
        match self.update(trace_id, |trace| trace.steps.push(step)) {
            Some(trace) => self.persist(trace).await,
            None => warn!("Dropping step {} for unknown trace {}", name, trace_id),
        }
    }

    /// Record the orchestrator's current phase
    pub async fn set_phase(&self, trace_id: &str, phase: Phase) {
        match self.update(trace_id, |trace| trace.phase = Some(phase)) {
            Some(trace) => self.persist(trace).await,
            None => warn!("Dropping phase {:?} for unknown trace {}", phase, trace_id),
        }
    }

    /// Mark the trace as succeeded or failed
    pub async fn complete_trace(&self, trace_id: &str, success: bool) {
        let status = if success {
            TraceStatus::Succeeded
        } else {
            TraceStatus::Failed
        };
        self.finish(trace_id, status).await;
    }

    /// Mark the trace as skipped: nothing was attempted
    pub async fn skip_trace(&self, trace_id: &str) {
        self.finish(trace_id, TraceStatus::Skipped).await;
    }

    async fn finish(&self, trace_id: &str, status: TraceStatus) {
        let updated = self.update(trace_id, |trace| {
            if trace.is_complete() {
                return;
            }
            trace.status = status;
            trace.completed_at = Some(Utc::now());
        });
        match updated {
            Some(trace) => self.persist(trace).await,
            None => warn!("Cannot complete unknown trace {}", trace_id),
        }
    }

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(trace_id).map(|e| e.trace.clone())
    }

    /// The trace with the most recent start time across all projects
    pub fn get_latest_trace(&self) -> Option<Trace> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .values()
            .max_by_key(|e| e.order_key())
            .map(|e| e.trace.clone())
    }

    /// Every trace for `project`, newest first
    pub fn get_traces_for_project(&self, project: &str) -> Vec<Trace> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<&Entry> = entries
            .values()
            .filter(|e| e.trace.project.as_deref() == Some(project))
            .collect();
        matching.sort_by_key(|e| std::cmp::Reverse(e.order_key()));
        matching.into_iter().map(|e| e.trace.clone()).collect()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert and return the ids evicted to stay within capacity. Only
    /// completed traces are evicted.
    fn insert(&self, trace: Trace) -> Vec<String> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        entries.insert(trace.id.clone(), Entry { trace, seq });

        let mut evicted = Vec::new();
        while entries.len() > self.capacity {
            let Some(oldest) = entries
                .iter()
                .filter(|(_, e)| e.trace.is_complete())
                .min_by_key(|(_, e)| e.order_key())
                .map(|(id, _)| id.clone())
            else {
                debug!("Trace ledger over capacity: {} running", entries.len());
                break;
            };
            entries.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    /// Apply `f` under the write lock and return a snapshot
    fn update<F>(&self, trace_id: &str, f: F) -> Option<Trace>
    where
        F: FnOnce(&mut Trace),
    {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(trace_id)?;
        f(&mut entry.trace);
        Some(entry.trace.clone())
    }

    async fn persist(&self, trace: Trace) {
        let Some(store) = &self.store else {
            return;
        };
        let file = store.file(&format!("{}.json", trace.id));
        if let Err(e) = file.write_json(&trace).await {
            warn!("Failed to persist trace {}: {}", trace.id, e);
        }
    }

    async fn forget(&self, trace_id: &str) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.file(&format!("{}.json", trace_id)).delete().await {
            warn!("Failed to delete evicted trace {}: {}", trace_id, e);
        }
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
