//! Shared application state (§5): the scheduler, a process-wide registry of
//! run snapshots keyed by `run_id` (the checkpoint store is keyed by
//! `checkpoint_id` instead, so the API needs its own lookup for in-flight
//! and just-finished runs), and a light aggregate for `middleware-status`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::OrchestratorConfig;
use crate::domain::{ErrorKind, RunState, RunStatus};
use crate::graph::intent_parser::IntentRefiner;
use crate::scheduler::{Scheduler, SourceAdapters};
use crate::store::CheckpointStore;

/// What the registry knows about a run before and after it finishes. A run
/// is `Pending` between acceptance and the first time the scheduler hands
/// back a `RunState` (submission itself is instant; the graph runs in a
/// spawned task).
#[derive(Debug, Clone)]
pub enum RunRecord {
    Pending { query: String, created_at: DateTime<Utc> },
    Done(RunState),
}

impl RunRecord {
    pub fn status(&self) -> RunStatus {
        match self {
            RunRecord::Pending { .. } => RunStatus::Running,
            RunRecord::Done(state) => state.status,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            RunRecord::Pending { created_at, .. } => *created_at,
            RunRecord::Done(state) => state.created_at,
        }
    }

    pub fn query(&self) -> &str {
        match self {
            RunRecord::Pending { query, .. } => query,
            RunRecord::Done(state) => &state.query,
        }
    }
}

#[derive(Debug, Default)]
struct MetricsAccumulator {
    runs_observed: u64,
    total_latency_ms: u64,
    timeouts: u64,
    retried: u64,
    partials: u64,
}

/// Aggregate run outcomes for `GET /api/orchestrator/middleware-status`.
/// Intentionally coarse: it reuses the same error log the scheduler already
/// keeps rather than adding a parallel metrics pipeline.
#[derive(Clone, Default)]
pub struct MetricsAggregator {
    inner: Arc<std::sync::Mutex<MetricsAccumulator>>,
}

impl MetricsAggregator {
    pub fn record(&self, state: &RunState) {
        let mut acc = self.inner.lock().unwrap();
        acc.runs_observed += 1;
        if let Some(completed_at) = state.completed_at {
            let latency = (completed_at - state.created_at).num_milliseconds().max(0) as u64;
            acc.total_latency_ms += latency;
        }
        if state.errors.iter().any(|e| e.kind == ErrorKind::Timeout) {
            acc.timeouts += 1;
        }
        if !state.errors.is_empty() {
            acc.retried += 1;
        }
        if state.partial {
            acc.partials += 1;
        }
    }

    pub fn snapshot(&self) -> crate::api::models::MiddlewareStatusResponse {
        let acc = self.inner.lock().unwrap();
        let n = acc.runs_observed.max(1) as f64;
        crate::api::models::MiddlewareStatusResponse {
            avg_execution_ms: acc.total_latency_ms as f64 / n,
            timeout_rate: acc.timeouts as f64 / n,
            retry_rate: acc.retried as f64 / n,
            partial_rate: acc.partials as f64 / n,
            runs_observed: acc.runs_observed,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub adapters: Arc<SourceAdapters>,
    pub refiner: Arc<dyn IntentRefiner>,
    pub store: Option<Arc<CheckpointStore>>,
    pub config: Arc<OrchestratorConfig>,
    pub runs: Arc<RwLock<HashMap<String, RunRecord>>>,
    pub metrics: MetricsAggregator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        scheduler: Scheduler,
        adapters: SourceAdapters,
        refiner: Arc<dyn IntentRefiner>,
        store: Option<CheckpointStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
            adapters: Arc::new(adapters),
            refiner,
            store: store.map(Arc::new),
            config: Arc::new(config),
            runs: Arc::new(RwLock::new(HashMap::new())),
            metrics: MetricsAggregator::default(),
            started_at: Instant::now(),
        }
    }

    pub async fn active_query_count(&self) -> usize {
        self.runs.read().await.values().filter(|r| !r.status().is_terminal()).count()
    }
}
