//! Route table (§6): binds every handler to its path and method, then layers
//! tracing and CORS over the whole router.

use axum::routing::{get, post};
use axum::Router;

use crate::api::middleware::{cors_layer, logging_layer};
use crate::api::state::AppState;
use crate::api::{handlers, sse};

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/research/query", post(handlers::submit_query))
        .route("/api/research/stream/:run_id", get(sse::stream_run))
        .route("/api/research/query/:run_id", get(handlers::get_query))
        .route("/api/research/active-queries", get(handlers::list_active_queries))
        .route("/api/research/synthesis/:run_id", get(handlers::get_synthesis))
        .route("/api/orchestrator/visualization", get(handlers::get_visualization))
        .route("/api/orchestrator/status", get(handlers::get_status))
        .route("/api/orchestrator/capabilities", get(handlers::get_capabilities))
        .route("/api/orchestrator/middleware-status", get(handlers::get_middleware_status))
        .layer(logging_layer())
        .layer(cors_layer())
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::OrchestratorConfig;
    use crate::domain::Source;
    use crate::events::RunEventBus;
    use crate::graph::fetch::StubAdapter;
    use crate::graph::intent_parser::NoopRefiner;
    use crate::scheduler::rate_limit::SourceRateLimiters;
    use crate::scheduler::{Scheduler, SourceAdapters};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        let config = OrchestratorConfig::default();
        let scheduler = Scheduler::new(
            config.clone(),
            Cache::new(Duration::from_secs(60)),
            SourceRateLimiters::new(50.0, 50.0, 50.0),
            RunEventBus::new(),
        );
        let adapters = SourceAdapters {
            pubs: Arc::new(StubAdapter::new(Source::Publications, vec![])),
            trials: Arc::new(StubAdapter::new(Source::Trials, vec![])),
            rag: Arc::new(StubAdapter::new(Source::Rag, vec![])),
        };
        AppState::new(scheduler, adapters, Arc::new(NoopRefiner), None, config)
    }

    #[test]
    fn router_builds_without_panicking() {
        let _router = create_router(test_state());
    }
}
