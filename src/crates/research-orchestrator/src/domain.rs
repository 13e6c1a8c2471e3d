//! Core data model: requests, the parsed intent frame, run state, fetched
//! items, citations, and checkpoints. These types are shared by every other
//! module in the crate; nothing here talks to the network, a database, or
//! the clock directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the three external data sources a run may fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Publications,
    Trials,
    Rag,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Publications => "publications",
            Source::Trials => "trials",
            Source::Rag => "rag",
        }
    }

    /// The node name in the graph that fetches this source.
    pub fn node_name(&self) -> &'static str {
        match self {
            Source::Publications => "pubs_fetch",
            Source::Trials => "trials_fetch",
            Source::Rag => "rag_fetch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Speed,
    Comprehensive,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Exponential,
    Linear,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationFormat {
    IdOnly,
    Full,
    Inline,
}

/// Recognized options on a [`QueryRequest`]. Every field has a spec-mandated
/// default so a request may omit the whole map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub max_results_per_source: u32,
    pub include_synthesis: bool,
    pub priority: Priority,
    pub budget_ms: u64,
    pub enable_partial_results: bool,
    pub retry_strategy: RetryStrategy,
    pub parallel_execution: bool,
    pub citation_format: CitationFormat,
    pub quality_threshold: f64,
    pub checkpoint_enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_results_per_source: 20,
            include_synthesis: true,
            priority: Priority::Balanced,
            budget_ms: 5000,
            enable_partial_results: true,
            retry_strategy: RetryStrategy::Exponential,
            parallel_execution: true,
            citation_format: CitationFormat::Full,
            quality_threshold: 0.0,
            checkpoint_enabled: true,
        }
    }
}

impl QueryOptions {
    /// Clamp `budget_ms` into `[min_ms, max_ms]`, matching the documented
    /// `[1000, 30000]` contract (the upper bound may be further tightened by
    /// the `MAX_BUDGET_MS` env var at the call site).
    pub fn clamp_budget(&mut self, min_ms: u64, max_ms: u64) {
        self.budget_ms = self.budget_ms.clamp(min_ms, max_ms);
    }
}

/// A submitted research question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
    #[serde(default)]
    pub options: QueryOptions,
}

impl QueryRequest {
    /// Sources to fan out to: explicit request list, or all three by default.
    pub fn requested_sources(&self) -> Vec<Source> {
        self.sources
            .clone()
            .unwrap_or_else(|| vec![Source::Publications, Source::Trials, Source::Rag])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    RecentPubsByTopic,
    IndicationPhaseTrials,
    TrialsWithPubs,
    HybridSearch,
    CompanyPipeline,
}

impl Intent {
    /// Nodes the router sends this intent to. `trials_with_pubs` and
    /// `company_pipeline` are parallel-eligible fan-outs; everything else is
    /// a single fetch.
    pub fn successors(&self) -> Vec<&'static str> {
        match self {
            Intent::RecentPubsByTopic => vec!["pubs_fetch"],
            Intent::IndicationPhaseTrials => vec!["trials_fetch"],
            Intent::HybridSearch => vec!["rag_fetch"],
            Intent::TrialsWithPubs => vec!["pubs_fetch", "trials_fetch"],
            Intent::CompanyPipeline => vec!["trials_fetch", "pubs_fetch"],
        }
    }

    pub fn is_parallel_eligible(&self) -> bool {
        matches!(self, Intent::TrialsWithPubs | Intent::CompanyPipeline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    CacheOnly,
    CacheThenNetwork,
    NetworkOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    pub topic: Option<String>,
    pub indication: Option<String>,
    pub company: Option<String>,
    pub trial_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filters {
    pub phase: Vec<String>,
    pub status: Vec<String>,
    pub published_within_days: Option<u32>,
    pub year_range: Option<(i32, i32)>,
}

/// The parsed intent, produced by the intent parser node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub intent: Intent,
    pub entities: Entities,
    pub filters: Filters,
    pub fetch_policy: FetchPolicy,
    pub confidence: f64,
}

impl Frame {
    /// The backstop frame used when parser confidence falls below threshold:
    /// `recent_pubs_by_topic` seeded from the raw query text.
    pub fn fallback(raw_query: &str) -> Self {
        Self {
            intent: Intent::RecentPubsByTopic,
            entities: Entities {
                topic: Some(raw_query.to_string()),
                ..Default::default()
            },
            filters: Filters::default(),
            fetch_policy: FetchPolicy::CacheThenNetwork,
            confidence: 0.0,
        }
    }

    /// A stable signature of which sources contributed how many items,
    /// sorted by source name — the third ingredient of the checkpoint id.
    pub fn source_coverage_signature(&self, counts: &HashMap<Source, usize>) -> String {
        let mut pairs: Vec<(&'static str, usize)> =
            counts.iter().map(|(s, n)| (s.as_str(), *n)).collect();
        pairs.sort_by_key(|(name, _)| *name);
        pairs
            .iter()
            .map(|(name, n)| format!("{name}:{n}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A single source's native record, normalized into a common envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedItem {
    pub id: String,
    pub source: Source,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub year: Option<i32>,
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, serde_json::Value>,
    pub relevance_score: f64,
    pub quality_score: f64,
}

/// A source-attributed reference attached to the synthesized answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub index: usize,
    pub id: String,
    pub source: Source,
    pub title: String,
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub year: Option<i32>,
    pub external_url: Option<String>,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Connection,
    RateLimit,
    Parse,
    Validation,
    DatabaseOrStore,
    Resource,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Recoverable,
    Fatal,
}

/// One error record surfaced by a node (retried or not) and kept in the
/// run's error log — never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub node: String,
    pub kind: ErrorKind,
    pub message: String,
    pub ts: DateTime<Utc>,
    pub severity: ErrorSeverity,
    pub recovery_action: String,
}

/// Per-node budget allocation and consumption, owned by the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetState {
    pub allocated_ms: u64,
    pub consumed_ms: u64,
    pub per_node_allocations: HashMap<String, u64>,
}

impl BudgetState {
    pub fn remaining_ms(&self) -> u64 {
        self.allocated_ms.saturating_sub(self.consumed_ms)
    }

    /// True once consumption reaches 80% of budget — triggers conservative
    /// scheduling (prefer single-source paths, lower pagination caps).
    pub fn in_danger_zone(&self) -> bool {
        self.allocated_ms > 0 && self.consumed_ms * 100 >= self.allocated_ms * 80
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStats {
    pub latency_ms: u64,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
}

impl RunStatus {
    /// Only forward transitions are valid: `Pending -> Running -> (Completed
    /// | Partial | Failed)`. Terminal states never transition again.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Completed)
                | (Pending, Partial)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Partial)
                | (Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Partial | RunStatus::Failed)
    }
}

/// The full mutable state of one run, owned exclusively by the scheduler.
/// Fetch nodes and the synthesizer only ever see a clone and return deltas;
/// the scheduler is the single writer (see `research-graph`'s deep-merge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub query: String,
    pub status: RunStatus,
    pub frame: Option<Frame>,
    pub pubs_results: Option<Vec<FetchedItem>>,
    pub trials_results: Option<Vec<FetchedItem>>,
    pub rag_results: Option<Vec<FetchedItem>>,
    pub budget: BudgetState,
    /// Fetch node names the router selected for this run's frame, written
    /// once the router node runs.
    pub routing_decision: Vec<String>,
    pub node_path: Vec<String>,
    pub node_stats: HashMap<String, NodeStats>,
    pub errors: Vec<RunError>,
    pub answer: Option<String>,
    pub citations: Vec<Citation>,
    pub quality: Option<QualityScores>,
    pub answer_type: Option<AnswerType>,
    pub partial: bool,
    pub checkpoint_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(run_id: String, query: String, now: DateTime<Utc>) -> Self {
        Self {
            run_id,
            query,
            status: RunStatus::Pending,
            frame: None,
            pubs_results: None,
            trials_results: None,
            rag_results: None,
            budget: BudgetState::default(),
            routing_decision: Vec::new(),
            node_path: Vec::new(),
            node_stats: HashMap::new(),
            errors: Vec::new(),
            answer: None,
            citations: Vec::new(),
            quality: None,
            answer_type: None,
            partial: false,
            checkpoint_id: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn result_slot(&self, source: Source) -> &Option<Vec<FetchedItem>> {
        match source {
            Source::Publications => &self.pubs_results,
            Source::Trials => &self.trials_results,
            Source::Rag => &self.rag_results,
        }
    }

    pub fn source_item_counts(&self) -> HashMap<Source, usize> {
        let mut counts = HashMap::new();
        for source in [Source::Publications, Source::Trials, Source::Rag] {
            if let Some(items) = self.result_slot(source) {
                counts.insert(source, items.len());
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Comprehensive,
    Partial,
    Minimal,
    Empty,
}

/// Composite quality metrics, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QualityScores {
    pub completeness: f64,
    pub recency: f64,
    pub authority: f64,
    pub diversity: f64,
    pub relevance: f64,
    pub overall: f64,
}

/// A persisted, deterministically identified record of a completed (or
/// partial) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub query: String,
    pub frame: Option<Frame>,
    pub final_state_summary: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_count: usize,
    pub partial: bool,
}
