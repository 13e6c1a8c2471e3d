//! # research-graph - stateful directed-graph execution
//!
//! The orchestration core: a small graph runtime in the Pregel tradition
//! (nodes are pure async functions of state -> delta; deltas are deep-merged
//! by a single writer) stripped down to what a research-query scheduler
//! actually needs — no subgraphs, no human-in-the-loop interrupts, no
//! message-graph/tool-calling layer, no YAML graph definitions. Those are
//! real LangGraph features; this spec's scheduler drives a static graph of
//! intent-parse -> route -> fetch -> synthesize and nothing more exotic.
//!
//! ## Core Types
//!
//! - [`graph::Graph`] / [`graph::NodeSpec`] / [`graph::Edge`] - the static,
//!   validated graph description (register nodes, wire edges, `validate()`).
//! - [`compiled::CompiledGraph`] - executes a validated graph: `run()` for a
//!   one-shot end-to-end run with no external scheduling, `run_wave()` for
//!   callers (the orchestrator's scheduler) that need per-node budget,
//!   retry, and event-emission control between waves.
//! - [`state`] - deep-merge semantics (lists append, maps merge, scalars
//!   overwrite) plus an optional per-field [`state::Reducer`] override.
//! - [`error::GraphError`] - validation, execution, timeout, and state
//!   errors raised by this crate.
//!
//! Error classification and retry policy are domain-specific and live
//! entirely in `research-orchestrator::scheduler::errors`; this crate has no
//! retry primitive of its own.

pub mod compiled;
pub mod error;
pub mod graph;
pub mod state;

pub use compiled::{CompiledGraph, NodeOutcome, RunOptions};
pub use error::{GraphError, Result};
pub use graph::{
    ConditionalEdgeResult, Edge, Graph, NodeExecutor, NodeId, NodeSpec, RouterFn, END, START,
};
pub use state::{deep_merge, AppendReducer, MergeReducer, OverwriteReducer, Reducer, StateError, StateSchema, SumReducer};
