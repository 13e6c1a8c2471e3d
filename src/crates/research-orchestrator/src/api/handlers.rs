//! One handler per endpoint (§6). Each handler does request validation and
//! translation only; everything stateful lives in `scheduler` or `store`.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::*;
use crate::api::state::{AppState, RunRecord};
use crate::domain::{QueryRequest, RunStatus};

pub async fn submit_query(
    State(state): State<AppState>,
    Json(body): Json<SubmitQueryBody>,
) -> ApiResult<Json<SubmitQueryResponse>> {
    if body.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    let mut request: QueryRequest = body.into();
    request.options.clamp_budget(1000, state.config.max_budget_ms);
    let estimated_completion_ms = request.options.budget_ms;
    let run_id = uuid::Uuid::new_v4().to_string();
    let created_at = Utc::now();

    state.runs.write().await.insert(
        run_id.clone(),
        RunRecord::Pending { query: request.query.clone(), created_at },
    );

    let scheduler = state.scheduler.clone();
    let adapters = state.adapters.clone();
    let refiner = state.refiner.clone();
    let store = state.store.clone();
    let runs = state.runs.clone();
    let metrics = state.metrics.clone();
    let run_id_for_task = run_id.clone();

    tokio::spawn(async move {
        let mut final_state = scheduler.run(request, refiner, &adapters).await;
        final_state.run_id = run_id_for_task.clone();

        if let Some(store) = &store {
            if let Some(checkpoint_id) = &final_state.checkpoint_id {
                let checkpoint = crate::domain::Checkpoint {
                    checkpoint_id: checkpoint_id.clone(),
                    query: final_state.query.clone(),
                    frame: final_state.frame.clone(),
                    final_state_summary: serde_json::json!({
                        "status": final_state.status,
                        "item_counts": final_state.source_item_counts(),
                        "partial": final_state.partial,
                    }),
                    created_at: final_state.created_at,
                    completed_at: final_state.completed_at,
                    error_count: final_state.errors.len(),
                    partial: final_state.partial,
                };
                if let Err(err) = store.save(&checkpoint).await {
                    tracing::warn!(run_id = %run_id_for_task, "checkpoint save failed: {err}");
                }

                let node_count = final_state.node_stats.len().max(1);
                let cache_hits = final_state.node_stats.values().filter(|s| s.cache_hit).count();
                let metrics_row = crate::store::RunMetrics {
                    checkpoint_id: checkpoint_id.clone(),
                    intent: final_state
                        .frame
                        .as_ref()
                        .and_then(|f| serde_json::to_value(f.intent).ok())
                        .and_then(|v| v.as_str().map(str::to_string)),
                    total_latency_ms: final_state.node_stats.values().map(|s| s.latency_ms).sum(),
                    node_latencies: serde_json::json!(final_state.node_stats),
                    cache_hit_rate: cache_hits as f64 / node_count as f64,
                    item_count: final_state.source_item_counts().values().sum(),
                    success: !matches!(final_state.status, RunStatus::Failed),
                    created_at: final_state.created_at,
                };
                if let Err(err) = store.save_metrics(&metrics_row).await {
                    tracing::warn!(run_id = %run_id_for_task, "run metrics save failed: {err}");
                }
            }
        }

        metrics.record(&final_state);
        runs.write().await.insert(run_id_for_task, RunRecord::Done(final_state));
    });

    Ok(Json(SubmitQueryResponse {
        run_id: run_id.clone(),
        status: RunStatus::Pending,
        stream_url: format!("/api/research/stream/{run_id}"),
        estimated_completion_ms,
        created_at,
    }))
}

pub async fn get_query(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<crate::domain::RunState>> {
    let runs = state.runs.read().await;
    match runs.get(&run_id) {
        Some(RunRecord::Done(run_state)) => Ok(Json(run_state.clone())),
        Some(RunRecord::Pending { query, created_at }) => {
            Ok(Json(crate::domain::RunState::new(run_id, query.clone(), *created_at)))
        }
        None => Err(ApiError::NotFound(format!("no run with id {run_id}"))),
    }
}

pub async fn list_active_queries(State(state): State<AppState>) -> Json<ActiveQueriesResponse> {
    let runs = state.runs.read().await;
    let active = runs
        .iter()
        .filter(|(_, record)| !record.status().is_terminal())
        .map(|(run_id, record)| ActiveQuerySummary {
            run_id: run_id.clone(),
            query: record.query().to_string(),
            status: record.status(),
            created_at: record.created_at(),
            node_path: match record {
                RunRecord::Done(state) => state.node_path.clone(),
                RunRecord::Pending { .. } => Vec::new(),
            },
        })
        .collect();
    Json(ActiveQueriesResponse { active })
}

pub async fn get_synthesis(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<SynthesisResponse>> {
    let runs = state.runs.read().await;
    match runs.get(&run_id) {
        Some(RunRecord::Done(run_state)) => Ok(Json(SynthesisResponse {
            run_id: run_state.run_id.clone(),
            status: run_state.status,
            answer: run_state.answer.clone(),
            citations: run_state.citations.clone(),
            quality: run_state.quality.clone(),
            answer_type: run_state.answer_type,
            checkpoint_id: run_state.checkpoint_id.clone(),
            partial: run_state.partial,
        })),
        Some(RunRecord::Pending { .. }) => {
            Err(ApiError::UnprocessableEntity(format!("run {run_id} has not completed yet")))
        }
        None => Err(ApiError::NotFound(format!("no run with id {run_id}"))),
    }
}

pub async fn get_visualization() -> Json<VisualizationResponse> {
    let nodes = vec![
        VisualizationNode {
            id: "intent_parser".to_string(),
            label: "Intent Parser".to_string(),
            kind: VisualizationNodeType::Processor,
        },
        VisualizationNode {
            id: "router".to_string(),
            label: "Router".to_string(),
            kind: VisualizationNodeType::Decision,
        },
        VisualizationNode {
            id: "pubs_fetch".to_string(),
            label: "Publications Fetch".to_string(),
            kind: VisualizationNodeType::Tool,
        },
        VisualizationNode {
            id: "trials_fetch".to_string(),
            label: "Trials Fetch".to_string(),
            kind: VisualizationNodeType::Tool,
        },
        VisualizationNode {
            id: "rag_fetch".to_string(),
            label: "RAG Fetch".to_string(),
            kind: VisualizationNodeType::Tool,
        },
    ];
    let edges = vec![
        VisualizationEdge { from: "intent_parser".to_string(), to: "router".to_string() },
        VisualizationEdge { from: "router".to_string(), to: "pubs_fetch".to_string() },
        VisualizationEdge { from: "router".to_string(), to: "trials_fetch".to_string() },
        VisualizationEdge { from: "router".to_string(), to: "rag_fetch".to_string() },
    ];
    Json(VisualizationResponse { nodes, edges })
}

pub async fn get_status() -> Json<OrchestratorStatusResponse> {
    Json(OrchestratorStatusResponse {
        enabled: true,
        status: SystemStatus::Operational,
        initialized: true,
        timestamp: Utc::now(),
    })
}

pub async fn get_capabilities(State(state): State<AppState>) -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse {
        default_budget_ms: state.config.default_budget_ms,
        max_budget_ms: state.config.max_budget_ms,
        max_parallel_nodes: state.config.max_parallel_nodes,
        sources: vec!["publications", "trials", "rag"],
        intents: vec![
            "recent_pubs_by_topic",
            "indication_phase_trials",
            "trials_with_pubs",
            "hybrid_search",
            "company_pipeline",
        ],
        available_middleware: vec!["rate_limit", "cache", "retry", "budget"],
    })
}

pub async fn get_middleware_status(State(state): State<AppState>) -> Json<MiddlewareStatusResponse> {
    Json(state.metrics.snapshot())
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut components = HashMap::new();
    components.insert("scheduler".to_string(), HealthComponentStatus { status: "up" });

    let store_status = if let Some(store) = &state.store {
        match store.get("__health_check__").await {
            Ok(_) => "up",
            Err(_) => "down",
        }
    } else {
        "disabled"
    };
    components.insert("checkpoint_store".to_string(), HealthComponentStatus { status: store_status });

    let status = if store_status == "down" { HealthStatus::Degraded } else { HealthStatus::Healthy };

    Json(HealthResponse {
        status,
        components,
        active_queries: state.active_query_count().await,
        timestamp: Utc::now(),
    })
}
