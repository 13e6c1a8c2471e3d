//! Execution of a validated [`Graph`].
//!
//! `CompiledGraph::run` walks from the entry node to `END`, deep-merging
//! each node's returned delta into the run state via [`crate::state::deep_merge`]
//! (or a [`StateSchema`](crate::state::StateSchema) when the caller supplies
//! one). Siblings returned together by a conditional edge run concurrently
//! when `parallel` is set on [`RunOptions`]; the runtime waits for every
//! sibling to finish (success, error, or cancellation) before asking the
//! graph what comes next. This mirrors a single Pregel superstep without
//! carrying the rest of the Pregel channel/versioning machinery: a research
//! run doesn't need time-travel or partial replay, just ordered progress
//! toward an answer.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, END};
use crate::state::{deep_merge, StateSchema};

/// Per-run execution knobs. The scheduler in `research-orchestrator` is the
/// usual caller; this struct only carries what the graph runtime itself
/// needs to make scheduling decisions, not budget accounting.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Run concurrent siblings in parallel rather than in router-returned order.
    pub parallel: bool,
    /// Upper bound on how many siblings may run concurrently in one wave.
    pub max_parallel_nodes: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_parallel_nodes: 5,
        }
    }
}

/// One node's execution outcome within a wave, used by callers (the
/// scheduler) to build node_path / error-entry bookkeeping on top of the raw
/// delta-merge the graph runtime performs.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub node: String,
    pub result: std::result::Result<Value, String>,
}

/// A validated, executable graph.
#[derive(Clone)]
pub struct CompiledGraph {
    graph: Arc<Graph>,
    schema: Arc<Option<StateSchema>>,
}

impl CompiledGraph {
    /// Validate and compile `graph`. Fails with [`GraphError::Validation`]
    /// if any edge targets an unregistered node or no entry point is set.
    pub fn compile(graph: Graph) -> Result<Self> {
        graph.validate()?;
        Ok(Self {
            graph: Arc::new(graph),
            schema: Arc::new(None),
        })
    }

    /// Compile with a [`StateSchema`] that overrides the default deep-merge
    /// for specific top-level fields (e.g. a sum reducer for a counter).
    pub fn compile_with_schema(graph: Graph, schema: StateSchema) -> Result<Self> {
        graph.validate()?;
        Ok(Self {
            graph: Arc::new(graph),
            schema: Arc::new(Some(schema)),
        })
    }

    fn merge(&self, state: &mut Value, delta: &Value) -> Result<()> {
        match self.schema.as_ref() {
            Some(schema) => schema
                .apply(state, delta)
                .map_err(|e| GraphError::state_error(None, e)),
            None => {
                *state = deep_merge(state, delta);
                Ok(())
            }
        }
    }

    /// Run one "wave": execute `frontier` (concurrently if `opts.parallel`),
    /// merging each delta into `state` as it lands, and return the outcomes
    /// plus the deduplicated next frontier. Callers that need per-node
    /// timing, retry, or cancellation (the scheduler) drive waves one at a
    /// time via this method rather than calling [`Self::run`] directly.
    pub async fn run_wave(
        &self,
        frontier: &[String],
        state: &mut Value,
        opts: &RunOptions,
    ) -> Result<(Vec<NodeOutcome>, Vec<String>)> {
        let mut outcomes = Vec::with_capacity(frontier.len());

        if opts.parallel {
            let cap = opts.max_parallel_nodes.max(1);
            for batch in frontier.chunks(cap) {
                let futures = batch.iter().map(|name| {
                    let state = state.clone();
                    let spec = self.graph.node(name).cloned();
                    let name = name.clone();
                    async move {
                        match spec {
                            Some(spec) => {
                                let result = (spec.executor)(state)
                                    .await
                                    .map_err(|e| e.to_string());
                                NodeOutcome { node: name, result }
                            }
                            None => NodeOutcome {
                                node: name.clone(),
                                result: Err(format!("node '{name}' is not registered")),
                            },
                        }
                    }
                });
                let batch_outcomes = join_all(futures).await;
                for outcome in &batch_outcomes {
                    if let Ok(delta) = &outcome.result {
                        self.merge(state, delta)?;
                    }
                }
                outcomes.extend(batch_outcomes);
            }
        } else {
            for name in frontier {
                let spec = self.graph.node(name).cloned();
                let result = match spec {
                    Some(spec) => (spec.executor)(state.clone())
                        .await
                        .map_err(|e| e.to_string()),
                    None => Err(format!("node '{name}' is not registered")),
                };
                if let Ok(delta) = &result {
                    self.merge(state, delta)?;
                }
                outcomes.push(NodeOutcome {
                    node: name.clone(),
                    result,
                });
            }
        }

        let next = self.next_frontier(&outcomes, state);
        Ok((outcomes, next))
    }

    /// Determine the next frontier from this wave's outcomes. Nodes that
    /// errored do not contribute successors (the caller decides whether to
    /// retry, skip, or abort); nodes that succeeded contribute their edge's
    /// successors, deduplicated and excluding `END`.
    fn next_frontier(&self, outcomes: &[NodeOutcome], state: &Value) -> Vec<String> {
        let mut next = Vec::new();
        for outcome in outcomes {
            if outcome.result.is_err() {
                continue;
            }
            let Some(spec) = self.graph.node(&outcome.node) else {
                continue;
            };
            let successors = match &spec.edge {
                Edge::Direct(target) => vec![target.clone()],
                Edge::Conditional { router, .. } => router(state).0,
            };
            for s in successors {
                if s != END && !next.contains(&s) {
                    next.push(s);
                }
            }
        }
        next
    }

    /// Run the graph to completion with no budget, retry, or cancellation
    /// policy — useful for tests and for nodes with no external I/O. Real
    /// runs go through the scheduler, which drives [`Self::run_wave`] itself.
    pub async fn run(&self, initial_state: Value, opts: RunOptions) -> Result<Value> {
        let mut state = initial_state;
        let entry = self
            .graph
            .entry()
            .ok_or_else(|| GraphError::Configuration("graph has no entry point".to_string()))?
            .clone();
        let mut frontier = vec![entry];

        while !frontier.is_empty() {
            let (outcomes, next) = self.run_wave(&frontier, &mut state, &opts).await?;
            if let Some(failed) = outcomes.iter().find_map(|o| o.result.as_ref().err()) {
                return Err(GraphError::node_execution(
                    outcomes
                        .iter()
                        .find(|o| o.result.is_err())
                        .map(|o| o.node.clone())
                        .unwrap_or_default(),
                    failed,
                ));
            }
            frontier = next;
        }

        Ok(state)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConditionalEdgeResult, NodeId, NodeSpec, RouterFn, START};
    use serde_json::json;
    use std::future::ready;

    fn direct_node(name: &str, target: &str, delta: Value) -> (NodeId, NodeSpec) {
        let d = delta;
        (
            name.to_string(),
            NodeSpec {
                name: name.to_string(),
                executor: Arc::new(move |_state| {
                    let d = d.clone();
                    Box::pin(ready(Ok(d)))
                }),
                edge: Edge::Direct(target.to_string()),
            },
        )
    }

    #[tokio::test]
    async fn runs_linear_chain_and_merges_deltas() {
        let mut graph = Graph::new();
        let (id, spec) = direct_node(START, "b", json!({"node_path": [START]}));
        graph.add_node(id, spec).unwrap();
        let (id, spec) = direct_node("b", END, json!({"node_path": ["b"]}));
        graph.add_node(id, spec).unwrap();
        graph.set_entry(START);

        let compiled = CompiledGraph::compile(graph).unwrap();
        let result = compiled
            .run(json!({"node_path": []}), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(result["node_path"], json!([START, "b"]));
    }

    #[tokio::test]
    async fn conditional_edge_picks_successor_from_state() {
        let mut graph = Graph::new();
        let router: RouterFn = Arc::new(|state| {
            if state["go_right"] == json!(true) {
                ConditionalEdgeResult::single("right")
            } else {
                ConditionalEdgeResult::single("left")
            }
        });
        graph
            .add_node(
                START,
                NodeSpec {
                    name: START.to_string(),
                    executor: Arc::new(|state| Box::pin(ready(Ok(state)))),
                    edge: Edge::Conditional {
                        router,
                        branches: vec!["left".to_string(), "right".to_string()],
                    },
                },
            )
            .unwrap();
        let (id, spec) = direct_node("left", END, json!({"path": "left"}));
        graph.add_node(id, spec).unwrap();
        let (id, spec) = direct_node("right", END, json!({"path": "right"}));
        graph.add_node(id, spec).unwrap();
        graph.set_entry(START);

        let compiled = CompiledGraph::compile(graph).unwrap();
        let result = compiled
            .run(json!({"go_right": true}), RunOptions::default())
            .await
            .unwrap();
        assert_eq!(result["path"], json!("right"));
    }

    #[tokio::test]
    async fn fan_out_runs_all_siblings_before_next_wave() {
        let mut graph = Graph::new();
        let router: RouterFn =
            Arc::new(|_| ConditionalEdgeResult::many(["pubs_fetch", "trials_fetch"]));
        graph
            .add_node(
                START,
                NodeSpec {
                    name: START.to_string(),
                    executor: Arc::new(|state| Box::pin(ready(Ok(state)))),
                    edge: Edge::Conditional {
                        router,
                        branches: vec!["pubs_fetch".to_string(), "trials_fetch".to_string()],
                    },
                },
            )
            .unwrap();
        let (id, spec) = direct_node("pubs_fetch", END, json!({"node_path": ["pubs_fetch"]}));
        graph.add_node(id, spec).unwrap();
        let (id, spec) = direct_node("trials_fetch", END, json!({"node_path": ["trials_fetch"]}));
        graph.add_node(id, spec).unwrap();
        graph.set_entry(START);

        let compiled = CompiledGraph::compile(graph).unwrap();
        let result = compiled
            .run(
                json!({"node_path": []}),
                RunOptions {
                    parallel: true,
                    max_parallel_nodes: 5,
                },
            )
            .await
            .unwrap();
        let mut path: Vec<String> = result["node_path"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        path.sort();
        assert_eq!(path, vec!["pubs_fetch".to_string(), "trials_fetch".to_string()]);
    }

    #[tokio::test]
    async fn node_error_surfaces_without_advancing() {
        let mut graph = Graph::new();
        graph
            .add_node(
                START,
                NodeSpec {
                    name: START.to_string(),
                    executor: Arc::new(|_state| {
                        Box::pin(ready(Err(GraphError::Custom("boom".to_string()))))
                    }),
                    edge: Edge::Direct(END.to_string()),
                },
            )
            .unwrap();
        graph.set_entry(START);

        let compiled = CompiledGraph::compile(graph).unwrap();
        let err = compiled
            .run(json!({}), RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::NodeExecution { .. }));
    }
}
