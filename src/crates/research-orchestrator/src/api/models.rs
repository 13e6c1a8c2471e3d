//! Response DTOs for endpoints whose shape isn't already a domain type
//! (§6). `RunState` and friends are re-used directly where their shape
//! matches a response one-to-one (e.g. the query snapshot endpoint).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AnswerType, Citation, QualityScores, RunStatus};

#[derive(Debug, Clone, Serialize)]
pub struct SubmitQueryResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub stream_url: String,
    pub estimated_completion_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveQuerySummary {
    pub run_id: String,
    pub query: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub node_path: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveQueriesResponse {
    pub active: Vec<ActiveQuerySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesisResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub answer: Option<String>,
    pub citations: Vec<Citation>,
    pub quality: Option<QualityScores>,
    pub answer_type: Option<AnswerType>,
    pub checkpoint_id: Option<String>,
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationNodeType {
    Processor,
    Decision,
    Tool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualizationNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: VisualizationNodeType,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualizationEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualizationResponse {
    pub nodes: Vec<VisualizationNode>,
    pub edges: Vec<VisualizationEdge>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    Operational,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatusResponse {
    pub enabled: bool,
    pub status: SystemStatus,
    pub initialized: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilitiesResponse {
    pub default_budget_ms: u64,
    pub max_budget_ms: u64,
    pub max_parallel_nodes: usize,
    pub sources: Vec<&'static str>,
    pub intents: Vec<&'static str>,
    pub available_middleware: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MiddlewareStatusResponse {
    pub avg_execution_ms: f64,
    pub timeout_rate: f64,
    pub retry_rate: f64,
    pub partial_rate: f64,
    pub runs_observed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthComponentStatus {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub components: std::collections::HashMap<String, HealthComponentStatus>,
    pub active_queries: usize,
    pub timestamp: DateTime<Utc>,
}

/// Request body accepted by `POST /api/research/query`. Mirrors
/// [`crate::domain::QueryRequest`] field-for-field; kept as a distinct type
/// so the wire contract can evolve independently of the internal type.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitQueryBody {
    pub query: String,
    #[serde(default)]
    pub sources: Option<Vec<crate::domain::Source>>,
    #[serde(default)]
    pub options: crate::domain::QueryOptions,
}

impl From<SubmitQueryBody> for crate::domain::QueryRequest {
    fn from(body: SubmitQueryBody) -> Self {
        crate::domain::QueryRequest {
            query: body.query,
            sources: body.sources,
            options: body.options,
        }
    }
}
