//! Error types for graph construction and execution

use thiserror::Error;

/// Errors produced while building or running a [`crate::graph::Graph`].
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph failed `compile()` validation: dangling edge, missing entry, or a cycle.
    #[error("graph validation failed: {0}")]
    Validation(String),

    /// A node executor returned an error.
    #[error("node '{node}' failed: {error}")]
    NodeExecution { node: String, error: String },

    /// A node (or the graph runtime) exceeded its allotted deadline.
    #[error("operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Merging a node's returned delta into run state failed.
    #[error("state error in '{node:?}': {error}")]
    StateError { node: Option<String>, error: String },

    /// A router or conditional edge returned a successor that is not registered.
    #[error("execution error: {0}")]
    Execution(String),

    /// Registering a node under a name that is already taken.
    #[error("duplicate node registration: {0}")]
    DuplicateNode(String),

    /// Generic configuration problem (bad entry point, empty graph, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Catch-all the scheduler boundary converts unexpected panics into.
    #[error("{0}")]
    Custom(String),
}

impl GraphError {
    pub fn node_execution(node: impl Into<String>, error: impl std::fmt::Display) -> Self {
        GraphError::NodeExecution {
            node: node.into(),
            error: error.to_string(),
        }
    }

    pub fn state_error(node: Option<String>, error: impl std::fmt::Display) -> Self {
        GraphError::StateError {
            node,
            error: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_execution_formats_node_and_error() {
        let err = GraphError::node_execution("pubs_fetch", "connection refused");
        assert_eq!(
            err.to_string(),
            "node 'pubs_fetch' failed: connection refused"
        );
    }

    #[test]
    fn state_error_without_node() {
        let err = GraphError::state_error(None, "merge conflict");
        assert!(err.to_string().contains("None"));
    }
}
