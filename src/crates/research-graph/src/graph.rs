//! Core graph data structures: nodes, edges, and the node registry.
//!
//! A [`Graph`] is the static, validated description of a run: a set of named
//! nodes and the edges connecting them. It says nothing about concurrency or
//! budget; that is the scheduler's job (see `research-orchestrator`). This
//! crate only guarantees that, once `validate()` succeeds, every edge target
//! exists and the graph has a reachable path from its entry node to `END`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{GraphError, Result};

/// Sentinel entry-point name.
pub const START: &str = "__start__";
/// Sentinel terminal name. Any edge targeting `END` stops the run.
pub const END: &str = "__end__";

pub type NodeId = String;

/// A node's unit of work: takes the current run state (as JSON) and returns
/// a delta to be deep-merged into it, or an error.
pub type NodeExecutor = Arc<
    dyn Fn(
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// Result of a conditional edge / router evaluation: the set of successor
/// node names to execute next (may be a single name or several, for fan-out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalEdgeResult(pub Vec<NodeId>);

impl ConditionalEdgeResult {
    pub fn single(node: impl Into<NodeId>) -> Self {
        Self(vec![node.into()])
    }

    pub fn many(nodes: impl IntoIterator<Item = impl Into<NodeId>>) -> Self {
        Self(nodes.into_iter().map(Into::into).collect())
    }
}

/// A router function: current run state -> next successors.
pub type RouterFn =
    Arc<dyn Fn(&serde_json::Value) -> ConditionalEdgeResult + Send + Sync>;

/// A single node's registration: name, executor, and its declared successors.
#[derive(Clone)]
pub struct NodeSpec {
    pub name: NodeId,
    pub executor: NodeExecutor,
    /// Static successor when this node has no conditional routing.
    pub edge: Edge,
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("edge", &self.edge)
            .finish()
    }
}

/// How a node's successors are determined.
#[derive(Clone)]
pub enum Edge {
    /// Unconditional: always proceed to this single node (or `END`).
    Direct(NodeId),
    /// Conditional: evaluate `router` against the state to pick successors.
    /// `branches` lists every node name the router is allowed to return, for
    /// validation purposes.
    Conditional {
        router: RouterFn,
        branches: Vec<NodeId>,
    },
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(id) => f.debug_tuple("Direct").field(id).finish(),
            Edge::Conditional { branches, .. } => {
                f.debug_struct("Conditional").field("branches", branches).finish()
            }
        }
    }
}

/// The static, validated graph structure.
#[derive(Clone, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, NodeSpec>,
    entry: Option<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            entry: None,
        }
    }

    /// Register a node. Idempotent registration of the *same* name twice is a
    /// configuration error, matching the contract in the design: duplicate
    /// names are rejected rather than silently overwritten.
    pub fn add_node(&mut self, id: impl Into<NodeId>, spec: NodeSpec) -> Result<()> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.nodes.insert(id, spec);
        Ok(())
    }

    pub fn set_entry(&mut self, node: impl Into<NodeId>) {
        self.entry = Some(node.into());
    }

    pub fn entry(&self) -> Option<&NodeId> {
        self.entry.as_ref()
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate that every edge target exists (or is `END`) and that the
    /// graph has an entry point. Cycles are permitted structurally (a node
    /// may route back to an earlier node, e.g. a retry loop modeled as an
    /// edge) but the scheduler enforces progress via the budget, not this
    /// validator.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(GraphError::Validation("graph has no nodes".to_string()));
        }
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| GraphError::Validation("graph has no entry point".to_string()))?;
        if !self.nodes.contains_key(entry) {
            return Err(GraphError::Validation(format!(
                "entry point '{entry}' is not a registered node"
            )));
        }
        for (name, spec) in &self.nodes {
            match &spec.edge {
                Edge::Direct(target) => {
                    if target != END && !self.nodes.contains_key(target) {
                        return Err(GraphError::Validation(format!(
                            "node '{name}' has a dangling edge to unknown node '{target}'"
                        )));
                    }
                }
                Edge::Conditional { branches, .. } => {
                    for target in branches {
                        if target != END && !self.nodes.contains_key(target) {
                            return Err(GraphError::Validation(format!(
                                "node '{name}' has a conditional branch to unknown node '{target}'"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;

    fn noop_executor() -> NodeExecutor {
        Arc::new(|state| Box::pin(ready(Ok(state))))
    }

    fn spec(name: &str, edge: Edge) -> NodeSpec {
        NodeSpec {
            name: name.to_string(),
            executor: noop_executor(),
            edge,
        }
    }

    #[test]
    fn validate_rejects_empty_graph() {
        let graph = Graph::new();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_entry() {
        let mut graph = Graph::new();
        graph
            .add_node("a", spec("a", Edge::Direct(END.to_string())))
            .unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn validate_rejects_dangling_direct_edge() {
        let mut graph = Graph::new();
        graph
            .add_node("a", spec("a", Edge::Direct("missing".to_string())))
            .unwrap();
        graph.set_entry("a");
        assert!(matches!(graph.validate(), Err(GraphError::Validation(_))));
    }

    #[test]
    fn validate_rejects_dangling_conditional_branch() {
        let mut graph = Graph::new();
        let router: RouterFn = Arc::new(|_| ConditionalEdgeResult::single("ghost"));
        graph
            .add_node(
                "a",
                spec(
                    "a",
                    Edge::Conditional {
                        router,
                        branches: vec!["ghost".to_string()],
                    },
                ),
            )
            .unwrap();
        graph.set_entry("a");
        assert!(graph.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_graph() {
        let mut graph = Graph::new();
        graph
            .add_node("a", spec("a", Edge::Direct("b".to_string())))
            .unwrap();
        graph
            .add_node("b", spec("b", Edge::Direct(END.to_string())))
            .unwrap();
        graph.set_entry("a");
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn duplicate_node_registration_is_rejected() {
        let mut graph = Graph::new();
        graph
            .add_node("a", spec("a", Edge::Direct(END.to_string())))
            .unwrap();
        let err = graph.add_node("a", spec("a", Edge::Direct(END.to_string())));
        assert!(matches!(err, Err(GraphError::DuplicateNode(_))));
    }
}
