//! Typed progress events published per run and the fan-out bus that carries
//! them to SSE subscribers. Modeled directly on a tagged realtime-event enum:
//! one `#[serde(tag = "type", content = "data")]` enum, one broadcast channel
//! per run, fire-and-forget publication (slow subscribers drop events rather
//! than back-pressuring the scheduler).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ResearchEvent {
    RunStarted {
        run_id: String,
        query: String,
        timestamp: DateTime<Utc>,
        enabled_features: Vec<String>,
    },
    NodeStarted {
        run_id: String,
        node_name: String,
        timestamp: DateTime<Utc>,
    },
    NodeProgress {
        run_id: String,
        node_name: String,
        percent: u8,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        run_id: String,
        node_name: String,
        item_count: usize,
        cache_hit: bool,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        run_id: String,
        node_name: String,
        error_kind: ErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },
    RetryAttempt {
        run_id: String,
        node_name: String,
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
        error_kind: ErrorKind,
        timestamp: DateTime<Utc>,
    },
    BudgetUpdate {
        run_id: String,
        consumed_ms: u64,
        remaining_ms: u64,
        danger_zone: bool,
        timestamp: DateTime<Utc>,
    },
    PartialResults {
        run_id: String,
        reason: PartialReason,
        completion_pct: u8,
        available_sources: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    SynthesisStage {
        run_id: String,
        stage: SynthesisStage,
        percent: u8,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        run_id: String,
        checkpoint_id: Option<String>,
        item_count: usize,
        quality_overall: f64,
        answer_type: String,
        timestamp: DateTime<Utc>,
    },
    RunFailed {
        run_id: String,
        error_kind: ErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialReason {
    Timeout,
    Error,
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStage {
    Citation,
    Quality,
    Render,
}

impl ResearchEvent {
    pub fn run_id(&self) -> &str {
        match self {
            ResearchEvent::RunStarted { run_id, .. }
            | ResearchEvent::NodeStarted { run_id, .. }
            | ResearchEvent::NodeProgress { run_id, .. }
            | ResearchEvent::NodeCompleted { run_id, .. }
            | ResearchEvent::NodeFailed { run_id, .. }
            | ResearchEvent::RetryAttempt { run_id, .. }
            | ResearchEvent::BudgetUpdate { run_id, .. }
            | ResearchEvent::PartialResults { run_id, .. }
            | ResearchEvent::SynthesisStage { run_id, .. }
            | ResearchEvent::RunCompleted { run_id, .. }
            | ResearchEvent::RunFailed { run_id, .. } => run_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ResearchEvent::RunStarted { .. } => "run_started",
            ResearchEvent::NodeStarted { .. } => "node_started",
            ResearchEvent::NodeProgress { .. } => "node_progress",
            ResearchEvent::NodeCompleted { .. } => "node_completed",
            ResearchEvent::NodeFailed { .. } => "node_failed",
            ResearchEvent::RetryAttempt { .. } => "retry_attempt",
            ResearchEvent::BudgetUpdate { .. } => "budget_update",
            ResearchEvent::PartialResults { .. } => "partial_results",
            ResearchEvent::SynthesisStage { .. } => "synthesis_stage",
            ResearchEvent::RunCompleted { .. } => "run_completed",
            ResearchEvent::RunFailed { .. } => "run_failed",
        }
    }

    /// Whether this event type ends the run's SSE stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResearchEvent::RunCompleted { .. } | ResearchEvent::RunFailed { .. })
    }

    pub fn priority(&self) -> EventPriority {
        match self {
            ResearchEvent::RunCompleted { .. } | ResearchEvent::RunFailed { .. } => {
                EventPriority::High
            }
            ResearchEvent::NodeFailed { .. } | ResearchEvent::PartialResults { .. } => {
                EventPriority::High
            }
            _ => EventPriority::Normal,
        }
    }

    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        let data = serde_json::to_string(self)?;
        Ok(format!("event: {}\ndata: {}\n\n", self.event_type(), data))
    }
}

const EVENT_BUFFER: usize = 256;

/// One broadcast channel per run. Publication is fire-and-forget: a
/// subscriber that falls behind the bounded buffer silently misses old
/// events rather than stalling the publisher.
#[derive(Clone)]
pub struct RunEventBus {
    tx: broadcast::Sender<ResearchEvent>,
    last_terminal: std::sync::Arc<tokio::sync::RwLock<Option<ResearchEvent>>>,
}

impl Default for RunEventBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            tx,
            last_terminal: std::sync::Arc::new(tokio::sync::RwLock::new(None)),
        }
    }
}

impl RunEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResearchEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; remembers terminal events so late subscribers to a
    /// finished run can be handed the final state immediately on reconnect.
    pub async fn publish(&self, event: ResearchEvent) {
        if event.is_terminal() {
            *self.last_terminal.write().await = Some(event.clone());
        }
        let _ = self.tx.send(event);
    }

    pub async fn last_terminal(&self) -> Option<ResearchEvent> {
        self.last_terminal.read().await.clone()
    }
}
