//! Central scheduler (§4.5): builds the run graph (intent-parse -> route ->
//! fetch fan-out) on [`research_graph`] and drives it wave by wave, wrapping
//! every wave with budget accounting, retry/backoff, and event publication.
//! Synthesis and checkpointing run as scheduler-level stages after the graph
//! reaches `END`, pipeline stages distinct from the node graph itself.

pub mod budget;
pub mod errors;
pub mod rate_limit;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use research_graph::{
    CompiledGraph, ConditionalEdgeResult, Edge, Graph, GraphError, NodeExecutor, NodeSpec,
    RunOptions as GraphRunOptions, END,
};

use crate::cache::Cache;
use crate::config::OrchestratorConfig;
use crate::domain::{
    BudgetState, Entities, ErrorKind, ErrorSeverity, FetchedItem, Filters, Frame, Intent, NodeStats, QueryOptions,
    QueryRequest, RunError, RunState, RunStatus, Source,
};
use crate::events::{PartialReason, ResearchEvent, RunEventBus};
use crate::graph::fetch::{fetch, FetchContext, SourceAdapter};
use crate::graph::intent_parser::{self, IntentRefiner};
use crate::graph::router;
use crate::synthesis;
use rate_limit::SourceRateLimiters;

/// The three source adapters a scheduler run needs, shared across concurrent
/// fetch nodes within a run.
pub struct SourceAdapters {
    pub pubs: Arc<dyn SourceAdapter>,
    pub trials: Arc<dyn SourceAdapter>,
    pub rag: Arc<dyn SourceAdapter>,
}

impl SourceAdapters {
    fn for_source(&self, source: Source) -> Arc<dyn SourceAdapter> {
        match source {
            Source::Publications => self.pubs.clone(),
            Source::Trials => self.trials.clone(),
            Source::Rag => self.rag.clone(),
        }
    }
}

fn is_fetch_node(name: &str) -> bool {
    matches!(name, "pubs_fetch" | "trials_fetch" | "rag_fetch")
}

/// How many items this node actually produced, read back out of the merged
/// graph state. Fetch nodes report the length of their result slot; every
/// other node produces exactly one state transition.
fn node_item_count(node_name: &str, json_state: &Value) -> usize {
    let field = match node_name {
        "pubs_fetch" => "pubs_results",
        "trials_fetch" => "trials_results",
        "rag_fetch" => "rag_results",
        _ => return 1,
    };
    json_state.get(field).and_then(Value::as_array).map(|items| items.len()).unwrap_or(0)
}

/// The subset of run state the graph actually touches; everything else
/// (budget, errors, node stats, checkpoint id, status) is scheduler-owned
/// bookkeeping kept outside the graph's JSON value.
#[derive(Debug, Default, Deserialize)]
struct GraphState {
    frame: Option<Frame>,
    pubs_results: Option<Vec<FetchedItem>>,
    trials_results: Option<Vec<FetchedItem>>,
    rag_results: Option<Vec<FetchedItem>>,
    routing_decision: Vec<String>,
    node_path: Vec<String>,
}

pub struct Scheduler {
    config: OrchestratorConfig,
    cache: Cache,
    rate_limiters: Arc<SourceRateLimiters>,
    events: RunEventBus,
}

impl Scheduler {
    pub fn new(config: OrchestratorConfig, cache: Cache, rate_limiters: SourceRateLimiters, events: RunEventBus) -> Self {
        Self {
            config,
            cache,
            rate_limiters: Arc::new(rate_limiters),
            events,
        }
    }

    pub fn events(&self) -> &RunEventBus {
        &self.events
    }

    /// Build the static graph for one run: `intent_parser` -> `router`
    /// (conditional, branching only to the sources this request asked for)
    /// -> one node per requested source, each direct to `END`.
    fn build_graph(
        &self,
        refiner: Arc<dyn IntentRefiner>,
        adapters: &SourceAdapters,
        requested_nodes: Vec<&'static str>,
        stats_sink: Arc<Mutex<HashMap<String, (u64, bool)>>>,
    ) -> research_graph::Result<CompiledGraph> {
        let mut graph = Graph::new();

        graph.add_node(
            "intent_parser",
            NodeSpec {
                name: "intent_parser".to_string(),
                executor: make_intent_parser_executor(refiner),
                edge: Edge::Direct("router".to_string()),
            },
        )?;

        graph.add_node(
            "router",
            NodeSpec {
                name: "router".to_string(),
                executor: make_router_executor(requested_nodes.clone()),
                edge: Edge::Conditional {
                    router: Arc::new(|state: &Value| {
                        let nodes: Vec<String> = state
                            .get("routing_decision")
                            .and_then(Value::as_array)
                            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                            .unwrap_or_default();
                        ConditionalEdgeResult(nodes)
                    }),
                    branches: requested_nodes.iter().map(|n| n.to_string()).collect(),
                },
            },
        )?;

        for &node_name in &requested_nodes {
            let source = match node_name {
                "pubs_fetch" => Source::Publications,
                "trials_fetch" => Source::Trials,
                "rag_fetch" => Source::Rag,
                _ => continue,
            };
            graph.add_node(
                node_name,
                NodeSpec {
                    name: node_name.to_string(),
                    executor: make_fetch_executor(
                        source,
                        self.cache.clone(),
                        self.rate_limiters.clone(),
                        adapters.for_source(source),
                        stats_sink.clone(),
                    ),
                    edge: Edge::Direct(END.to_string()),
                },
            )?;
        }

        graph.set_entry("intent_parser");
        CompiledGraph::compile(graph)
    }

    /// Execute one run to completion (or partial/failed termination) and
    /// return its final state.
    pub async fn run(&self, request: QueryRequest, refiner: Arc<dyn IntentRefiner>, adapters: &SourceAdapters) -> RunState {
        let run_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut options = request.options.clone();
        options.clamp_budget(1000, self.config.max_budget_ms);

        let mut state = RunState::new(run_id.clone(), request.query.clone(), now);
        state.status = RunStatus::Running;
        self.events
            .publish(ResearchEvent::RunStarted {
                run_id: run_id.clone(),
                query: request.query.clone(),
                timestamp: now,
                enabled_features: vec!["synthesis".into(), "checkpoint".into()],
            })
            .await;

        let requested_sources = request.requested_sources();
        let requested_nodes: Vec<&'static str> = requested_sources.iter().map(|s| s.node_name()).collect();
        let stats_sink: Arc<Mutex<HashMap<String, (u64, bool)>>> = Arc::new(Mutex::new(HashMap::new()));

        let compiled = match self.build_graph(refiner, adapters, requested_nodes.clone(), stats_sink.clone()) {
            Ok(compiled) => compiled,
            Err(e) => {
                state.errors.push(RunError {
                    node: "scheduler".to_string(),
                    kind: ErrorKind::Unknown,
                    message: format!("graph construction failed: {e}"),
                    ts: Utc::now(),
                    severity: ErrorSeverity::Fatal,
                    recovery_action: "none".to_string(),
                });
                return self.finish_failed(state).await;
            }
        };

        let mut budget = budget::allocate(options.budget_ms, &[]);
        let graph_opts = GraphRunOptions {
            parallel: options.parallel_execution,
            max_parallel_nodes: self.config.max_parallel_nodes,
        };

        let mut json_state = json!({
            "query": request.query,
            "options": options,
            "frame": Value::Null,
            "pubs_results": Value::Null,
            "trials_results": Value::Null,
            "rag_results": Value::Null,
            "node_path": [],
            "routing_decision": [],
        });

        let mut frontier = vec!["intent_parser".to_string()];
        let mut iterations = 0;

        while !frontier.is_empty() && iterations < 10 {
            iterations += 1;

            let mut runnable = Vec::new();
            for node in &frontier {
                if is_fetch_node(node) && budget::node_budget_ms(&budget, node) == 0 {
                    state.errors.push(RunError {
                        node: node.clone(),
                        kind: ErrorKind::Resource,
                        message: "BudgetExhausted: no remaining budget for this node".to_string(),
                        ts: Utc::now(),
                        severity: ErrorSeverity::Recoverable,
                        recovery_action: "skip_node".to_string(),
                    });
                    continue;
                }
                runnable.push(node.clone());
            }
            if runnable.is_empty() {
                break;
            }

            let danger_zone = budget.in_danger_zone();
            json_state["danger_zone"] = json!(danger_zone);
            let deadline_ms = runnable
                .iter()
                .filter(|n| is_fetch_node(n))
                .map(|n| budget::node_budget_ms(&budget, n))
                .min()
                .unwrap_or(0);
            json_state["_node_deadline_ms"] = json!(deadline_ms);

            for node in &runnable {
                self.events
                    .publish(ResearchEvent::NodeStarted {
                        run_id: run_id.clone(),
                        node_name: node.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
            }

            let wave_start = Instant::now();
            let wave_result = compiled.run_wave(&runnable, &mut json_state, &graph_opts).await;
            budget.consumed_ms += wave_start.elapsed().as_millis() as u64;

            let (outcomes, mut next) = match wave_result {
                Ok(pair) => pair,
                Err(e) => {
                    state.errors.push(RunError {
                        node: "scheduler".to_string(),
                        kind: ErrorKind::Unknown,
                        message: format!("wave execution failed: {e}"),
                        ts: Utc::now(),
                        severity: ErrorSeverity::Fatal,
                        recovery_action: "none".to_string(),
                    });
                    return self.finish_failed(state).await;
                }
            };

            let mut intent_parser_failed = false;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(_) => {
                        self.record_success(&run_id, &outcome.node, &stats_sink, &json_state, &mut state).await;
                    }
                    Err(message) => {
                        let resolved = self
                            .retry_node(
                                &run_id,
                                &outcome.node,
                                message,
                                &compiled,
                                &mut json_state,
                                &graph_opts,
                                &mut budget,
                                &stats_sink,
                                &mut state,
                            )
                            .await;
                        match resolved {
                            Some(extra_next) => next.extend(extra_next),
                            None => {
                                if outcome.node == "intent_parser" {
                                    intent_parser_failed = true;
                                }
                            }
                        }
                    }
                }
            }

            if intent_parser_failed {
                return self.finish_failed(state).await;
            }

            if runnable.iter().any(|n| n == "router") {
                let active: Vec<&str> = next.iter().map(|s| s.as_str()).collect();
                let consumed_so_far = budget.consumed_ms;
                budget = budget::allocate(options.budget_ms, &active);
                budget.consumed_ms = consumed_so_far;
            }

            next.sort();
            next.dedup();
            frontier = next;

            self.publish_budget_update(&run_id, &budget).await;
        }

        let graph_state: GraphState = serde_json::from_value(json_state.clone()).unwrap_or_default();
        let frame = graph_state.frame.clone().unwrap_or_else(|| Frame::fallback(&request.query));
        state.frame = Some(frame.clone());
        state.pubs_results = graph_state.pubs_results;
        state.trials_results = graph_state.trials_results;
        state.rag_results = graph_state.rag_results;
        state.routing_decision = graph_state.routing_decision;
        state.node_path = graph_state.node_path;

        state.budget = budget.clone();
        self.publish_budget_update(&run_id, &budget).await;

        let any_results = state.source_item_counts().values().any(|&n| n > 0);
        if budget.remaining_ms() == 0 && !any_results && !options.enable_partial_results {
            state.errors.push(RunError {
                node: "scheduler".to_string(),
                kind: ErrorKind::Resource,
                message: "BudgetExhausted: no fetch node produced results before the budget ran out".to_string(),
                ts: Utc::now(),
                severity: ErrorSeverity::Fatal,
                recovery_action: "none".to_string(),
            });
            return self.finish_failed(state).await;
        }

        let partial = budget.remaining_ms() == 0 && options.enable_partial_results && any_results;
        if partial {
            state.partial = true;
            self.events
                .publish(ResearchEvent::PartialResults {
                    run_id: run_id.clone(),
                    reason: PartialReason::BudgetExhausted,
                    completion_pct: ((budget.consumed_ms as f64 / budget.allocated_ms.max(1) as f64) * 100.0) as u8,
                    available_sources: requested_sources
                        .iter()
                        .filter(|s| state.result_slot(**s).as_ref().map(|v| !v.is_empty()).unwrap_or(false))
                        .map(|s| s.as_str().to_string())
                        .collect(),
                    timestamp: Utc::now(),
                })
                .await;
        }

        if options.include_synthesis {
            self.run_synthesis(&run_id, &requested_sources, &mut state, &mut budget).await;
            self.publish_budget_update(&run_id, &budget).await;
        }

        state.checkpoint_id = if options.checkpoint_enabled {
            let counts = state.source_item_counts();
            Some(crate::store::checkpoint_id::compute(Utc::now(), &state.query, &frame, &counts))
        } else {
            None
        };

        state.completed_at = Some(Utc::now());
        state.status = if state.partial { RunStatus::Partial } else { RunStatus::Completed };

        self.events
            .publish(ResearchEvent::RunCompleted {
                run_id: run_id.clone(),
                checkpoint_id: state.checkpoint_id.clone(),
                item_count: state.citations.len(),
                quality_overall: state.quality.map(|q| q.overall).unwrap_or(0.0),
                answer_type: state
                    .answer_type
                    .map(|a| format!("{a:?}").to_lowercase())
                    .unwrap_or_else(|| "empty".to_string()),
                timestamp: Utc::now(),
            })
            .await;

        state
    }

    async fn record_success(
        &self,
        run_id: &str,
        node_name: &str,
        stats_sink: &Arc<Mutex<HashMap<String, (u64, bool)>>>,
        json_state: &Value,
        state: &mut RunState,
    ) {
        let (latency_ms, cache_hit) = stats_sink.lock().await.get(node_name).copied().unwrap_or((0, false));
        state.node_stats.insert(node_name.to_string(), NodeStats { latency_ms, cache_hit });
        self.events
            .publish(ResearchEvent::NodeCompleted {
                run_id: run_id.to_string(),
                node_name: node_name.to_string(),
                item_count: node_item_count(node_name, json_state),
                cache_hit,
                latency_ms,
                timestamp: Utc::now(),
            })
            .await;
    }

    /// Retry a failed node under its error kind's plan, respecting the
    /// node's remaining budget. Returns `Some(successors)` if a retry
    /// eventually succeeded (the caller folds these into the next
    /// frontier), or `None` if retries are exhausted or disallowed — the
    /// failure is recorded on `state.errors` either way.
    #[allow(clippy::too_many_arguments)]
    async fn retry_node(
        &self,
        run_id: &str,
        node_name: &str,
        first_message: &str,
        compiled: &CompiledGraph,
        json_state: &mut Value,
        graph_opts: &GraphRunOptions,
        budget: &mut BudgetState,
        stats_sink: &Arc<Mutex<HashMap<String, (u64, bool)>>>,
        state: &mut RunState,
    ) -> Option<Vec<String>> {
        let mut last_message = first_message.to_string();
        let mut kind = errors::classify(&last_message);
        let mut plan = errors::retry_plan(kind);
        let mut attempt = 0u32;

        while plan.retryable && attempt < plan.max_attempts {
            let remaining = budget::node_budget_ms(budget, node_name);
            if remaining == 0 {
                break;
            }
            attempt += 1;
            let delay = errors::backoff_delay(plan.backoff, attempt);
            self.events
                .publish(ResearchEvent::RetryAttempt {
                    run_id: run_id.to_string(),
                    node_name: node_name.to_string(),
                    attempt,
                    max_attempts: plan.max_attempts,
                    delay_ms: delay.as_millis() as u64,
                    error_kind: kind,
                    timestamp: Utc::now(),
                })
                .await;
            tokio::time::sleep(delay).await;

            let node_deadline_ms = match plan.backoff {
                errors::Backoff::ExtendTimeout { .. } => {
                    let per_node_allocation = budget.per_node_allocations.get(node_name).copied().unwrap_or(remaining);
                    let extended = errors::extended_timeout(Duration::from_millis(per_node_allocation.max(1)), plan.backoff, attempt);
                    (extended.as_millis() as u64).min(budget.remaining_ms())
                }
                _ => remaining,
            };
            if node_deadline_ms == 0 {
                break;
            }
            json_state["_node_deadline_ms"] = json!(node_deadline_ms);
            let retry_start = Instant::now();
            let retry_result = compiled.run_wave(&[node_name.to_string()], json_state, graph_opts).await;
            budget.consumed_ms += retry_start.elapsed().as_millis() as u64;

            match retry_result {
                Ok((outcomes, next)) => {
                    if let Some(outcome) = outcomes.into_iter().next() {
                        match outcome.result {
                            Ok(_) => {
                                self.record_success(run_id, node_name, stats_sink, json_state, state).await;
                                return Some(next);
                            }
                            Err(message) => {
                                last_message = message;
                                kind = errors::classify(&last_message);
                                plan = errors::retry_plan(kind);
                            }
                        }
                    }
                }
                Err(e) => {
                    last_message = e.to_string();
                    break;
                }
            }
        }

        self.events
            .publish(ResearchEvent::NodeFailed {
                run_id: run_id.to_string(),
                node_name: node_name.to_string(),
                error_kind: kind,
                message: last_message.clone(),
                timestamp: Utc::now(),
            })
            .await;
        let severity = if node_name == "intent_parser" { ErrorSeverity::Fatal } else { ErrorSeverity::Recoverable };
        state.errors.push(RunError {
            node: node_name.to_string(),
            kind,
            message: last_message,
            ts: Utc::now(),
            severity,
            recovery_action: plan.fallback.as_str().to_string(),
        });
        None
    }

    async fn run_synthesis(&self, run_id: &str, requested_sources: &[Source], state: &mut RunState, budget: &mut BudgetState) {
        let start = Instant::now();
        self.events
            .publish(ResearchEvent::SynthesisStage {
                run_id: run_id.to_string(),
                stage: crate::events::SynthesisStage::Citation,
                percent: 33,
                timestamp: Utc::now(),
            })
            .await;

        let output = synthesis::synthesize(state, requested_sources);

        self.events
            .publish(ResearchEvent::SynthesisStage {
                run_id: run_id.to_string(),
                stage: crate::events::SynthesisStage::Quality,
                percent: 66,
                timestamp: Utc::now(),
            })
            .await;

        state.answer = Some(output.answer);
        state.citations = output.citations;
        state.quality = Some(output.quality);
        state.answer_type = Some(output.answer_type);
        budget.consumed_ms += start.elapsed().as_millis() as u64;

        self.events
            .publish(ResearchEvent::SynthesisStage {
                run_id: run_id.to_string(),
                stage: crate::events::SynthesisStage::Render,
                percent: 100,
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn publish_budget_update(&self, run_id: &str, budget: &BudgetState) {
        self.events
            .publish(ResearchEvent::BudgetUpdate {
                run_id: run_id.to_string(),
                consumed_ms: budget.consumed_ms,
                remaining_ms: budget.remaining_ms(),
                danger_zone: budget.in_danger_zone(),
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn finish_failed(&self, mut state: RunState) -> RunState {
        state.status = RunStatus::Failed;
        state.completed_at = Some(Utc::now());
        let kind = state.errors.last().map(|e| e.kind).unwrap_or(ErrorKind::Unknown);
        let message = state.errors.last().map(|e| e.message.clone()).unwrap_or_else(|| "run failed".to_string());
        self.events
            .publish(ResearchEvent::RunFailed {
                run_id: state.run_id.clone(),
                error_kind: kind,
                message,
                timestamp: Utc::now(),
            })
            .await;
        state
    }
}

fn make_intent_parser_executor(refiner: Arc<dyn IntentRefiner>) -> NodeExecutor {
    Arc::new(move |state: Value| {
        let refiner = refiner.clone();
        Box::pin(async move {
            let query = state.get("query").and_then(Value::as_str).unwrap_or_default().to_string();
            let frame = intent_parser::parse(&query, refiner.as_ref())
                .await
                .map_err(|e| GraphError::node_execution("intent_parser", e))?;
            Ok(json!({"frame": frame, "node_path": ["intent_parser"]}))
        })
    })
}

fn make_router_executor(requested_nodes: Vec<&'static str>) -> NodeExecutor {
    Arc::new(move |state: Value| {
        let requested_nodes = requested_nodes.clone();
        Box::pin(async move {
            let intent: Intent = state
                .get("frame")
                .and_then(|f| f.get("intent"))
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or(Intent::RecentPubsByTopic);
            let danger_zone = state.get("danger_zone").and_then(Value::as_bool).unwrap_or(false);

            let mut routed: Vec<String> = router::route_defensive(Some(intent), danger_zone)
                .into_iter()
                .filter(|n| requested_nodes.contains(n))
                .map(String::from)
                .collect();
            if routed.is_empty() {
                if let Some(first) = requested_nodes.first() {
                    routed.push((*first).to_string());
                }
            }

            Ok(json!({"routing_decision": routed, "node_path": ["router"]}))
        })
    })
}

#[allow(clippy::too_many_arguments)]
fn make_fetch_executor(
    source: Source,
    cache: Cache,
    rate_limiters: Arc<SourceRateLimiters>,
    adapter: Arc<dyn SourceAdapter>,
    stats_sink: Arc<Mutex<HashMap<String, (u64, bool)>>>,
) -> NodeExecutor {
    let node_name = source.node_name();
    Arc::new(move |state: Value| {
        let cache = cache.clone();
        let rate_limiters = rate_limiters.clone();
        let adapter = adapter.clone();
        let stats_sink = stats_sink.clone();
        Box::pin(async move {
            let frame: Frame = serde_json::from_value(state.get("frame").cloned().unwrap_or(Value::Null))
                .map_err(|e| GraphError::state_error(Some(node_name.to_string()), e))?;
            let options: QueryOptions = serde_json::from_value(state.get("options").cloned().unwrap_or(Value::Null))
                .map_err(|e| GraphError::state_error(Some(node_name.to_string()), e))?;
            let danger_zone = state.get("danger_zone").and_then(Value::as_bool).unwrap_or(false);
            let deadline_ms = state.get("_node_deadline_ms").and_then(Value::as_u64).unwrap_or(0);
            let wants_details = matches!(frame.intent, Intent::TrialsWithPubs | Intent::CompanyPipeline);

            let ctx = FetchContext {
                source,
                cache: &cache,
                rate_limiters: &rate_limiters,
                danger_zone,
            };

            let entities: &Entities = &frame.entities;
            let filters: &Filters = &frame.filters;

            let start = Instant::now();
            let result = fetch(
                &ctx,
                adapter.as_ref(),
                entities,
                filters,
                frame.fetch_policy,
                options.max_results_per_source,
                options.quality_threshold,
                wants_details,
                Duration::from_millis(deadline_ms),
            )
            .await;
            let elapsed = start.elapsed().as_millis() as u64;

            match result {
                Ok((items, cache_hit)) => {
                    stats_sink.lock().await.insert(node_name.to_string(), (elapsed, cache_hit));
                    let field = match source {
                        Source::Publications => "pubs_results",
                        Source::Trials => "trials_results",
                        Source::Rag => "rag_results",
                    };
                    Ok(json!({ field: items, "node_path": [node_name] }))
                }
                Err(message) => {
                    stats_sink.lock().await.insert(node_name.to_string(), (elapsed, false));
                    Err(GraphError::node_execution(node_name, message))
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FetchedItem, QueryRequest};
    use crate::graph::fetch::StubAdapter;
    use crate::graph::intent_parser::NoopRefiner;

    fn item(id: &str, source: Source) -> FetchedItem {
        FetchedItem {
            id: id.to_string(),
            source,
            title: format!("title-{id}"),
            authors: vec![],
            venue: None,
            year: Some(2024),
            abstract_text: None,
            fields: HashMap::new(),
            relevance_score: 0.8,
            quality_score: 0.9,
        }
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(
            OrchestratorConfig::default(),
            Cache::new(Duration::from_secs(60)),
            SourceRateLimiters::new(50.0, 50.0, 50.0),
            RunEventBus::new(),
        )
    }

    fn adapters(pubs_items: Vec<FetchedItem>, trials_items: Vec<FetchedItem>) -> SourceAdapters {
        SourceAdapters {
            pubs: Arc::new(StubAdapter::new(Source::Publications, pubs_items)),
            trials: Arc::new(StubAdapter::new(Source::Trials, trials_items)),
            rag: Arc::new(StubAdapter::new(Source::Rag, vec![])),
        }
    }

    #[tokio::test]
    async fn a_simple_topic_query_completes_with_an_answer() {
        let scheduler = scheduler();
        let adapters = adapters(vec![item("p1", Source::Publications)], vec![]);

        let request = QueryRequest {
            query: "recent papers on GLP-1 agonists".to_string(),
            sources: None,
            options: QueryOptions::default(),
        };

        let state = scheduler.run(request, Arc::new(NoopRefiner), &adapters).await;
        assert_eq!(state.status, RunStatus::Completed);
        assert!(state.answer.is_some());
        assert!(state.checkpoint_id.is_some());
        assert!(state.pubs_results.is_some());
    }

    #[tokio::test]
    async fn empty_query_fails_the_run() {
        let scheduler = scheduler();
        let adapters = adapters(vec![], vec![]);

        let request = QueryRequest {
            query: "   ".to_string(),
            sources: None,
            options: QueryOptions::default(),
        };

        let state = scheduler.run(request, Arc::new(NoopRefiner), &adapters).await;
        assert_eq!(state.status, RunStatus::Failed);
        assert!(!state.errors.is_empty());
    }

    #[tokio::test]
    async fn fan_out_intent_populates_both_result_slots() {
        let scheduler = scheduler();
        let adapters = adapters(vec![item("p1", Source::Publications)], vec![item("t1", Source::Trials)]);

        let request = QueryRequest {
            query: "NCT01234567 status".to_string(),
            sources: None,
            options: QueryOptions::default(),
        };

        let state = scheduler.run(request, Arc::new(NoopRefiner), &adapters).await;
        assert_eq!(state.status, RunStatus::Completed);
        assert!(state.pubs_results.as_ref().map(|v| !v.is_empty()).unwrap_or(false));
        assert!(state.trials_results.as_ref().map(|v| !v.is_empty()).unwrap_or(false));
    }

    #[tokio::test]
    async fn requesting_a_single_source_never_touches_the_others() {
        let scheduler = scheduler();
        let adapters = adapters(vec![item("p1", Source::Publications)], vec![item("t1", Source::Trials)]);

        let request = QueryRequest {
            query: "recent papers on GLP-1 agonists".to_string(),
            sources: Some(vec![Source::Publications]),
            options: QueryOptions::default(),
        };

        let state = scheduler.run(request, Arc::new(NoopRefiner), &adapters).await;
        assert_eq!(state.status, RunStatus::Completed);
        assert!(state.pubs_results.is_some());
        assert!(state.trials_results.is_none());
    }
}
