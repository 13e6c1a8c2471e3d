//! Crate-level error type. Node-level failures are classified into
//! [`crate::domain::ErrorKind`] by `scheduler::errors`; this enum is for
//! failures in the orchestrator itself (bad request, missing run, storage).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("graph execution failed: {0}")]
    Graph(#[from] research_graph::GraphError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
