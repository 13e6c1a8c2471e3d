//! Orchestrator server binary: wires config, the checkpoint store, and the
//! scheduler into the HTTP API and serves it.
//!
//! Source adapters are `StubAdapter`s here: publications, trials, and an
//! internal RAG store are fetch targets whose wire protocols are external
//! collaborators, so the binary wires deterministic stand-ins at the same
//! seam a real HTTP client would plug into (`SourceAdapter`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use research_orchestrator::api::routes::create_router;
use research_orchestrator::api::state::AppState;
use research_orchestrator::cache::Cache;
use research_orchestrator::config::OrchestratorConfig;
use research_orchestrator::domain::Source;
use research_orchestrator::events::RunEventBus;
use research_orchestrator::graph::fetch::StubAdapter;
use research_orchestrator::graph::intent_parser::NoopRefiner;
use research_orchestrator::scheduler::rate_limit::SourceRateLimiters;
use research_orchestrator::scheduler::{Scheduler, SourceAdapters};
use research_orchestrator::store::CheckpointStore;
use sqlx::sqlite::SqlitePoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    tracing::info!("Loading orchestrator configuration");
    let config = OrchestratorConfig::from_env()?;
    tracing::info!(
        default_budget_ms = config.default_budget_ms,
        max_budget_ms = config.max_budget_ms,
        max_parallel_nodes = config.max_parallel_nodes,
        "configuration loaded"
    );

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://research-orchestrator.db?mode=rwc".to_string());
    tracing::info!("Connecting to checkpoint store: {}", database_url);
    let pool = SqlitePoolOptions::new().max_connections(5).connect(&database_url).await?;
    let store = CheckpointStore::new(pool);
    store.migrate().await?;

    let scheduler = Scheduler::new(
        config.clone(),
        Cache::new(Duration::from_secs(config.cache_ttl_seconds)),
        SourceRateLimiters::new(config.pubs_rps, config.trials_rps, config.rag_rps),
        RunEventBus::new(),
    );
    let adapters = SourceAdapters {
        pubs: Arc::new(StubAdapter::new(Source::Publications, Vec::new())),
        trials: Arc::new(StubAdapter::new(Source::Trials, Vec::new())),
        rag: Arc::new(StubAdapter::new(Source::Rag, Vec::new())),
    };
    let app_state = AppState::new(scheduler, adapters, Arc::new(NoopRefiner), Some(store), config);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse::<u16>()?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let app = create_router(app_state);
    tracing::info!("Starting research orchestrator on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Research orchestrator shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received CTRL-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
