//! End-to-end scenarios (spec §8), driven through the public `Scheduler`
//! API with deterministic stub adapters — no HTTP layer involved, matching
//! how the scheduler's own unit tests already exercise it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use research_orchestrator::cache::Cache;
use research_orchestrator::config::OrchestratorConfig;
use research_orchestrator::domain::{
    Entities, FetchedItem, Filters, Priority, QueryOptions, QueryRequest, RetryStrategy, RunStatus, Source,
};
use research_orchestrator::events::RunEventBus;
use research_orchestrator::graph::fetch::{SourceAdapter, StubAdapter};
use research_orchestrator::graph::intent_parser::NoopRefiner;
use research_orchestrator::scheduler::rate_limit::SourceRateLimiters;
use research_orchestrator::scheduler::{Scheduler, SourceAdapters};

fn item(id: &str, source: Source, relevance: f64, year: i32) -> FetchedItem {
    FetchedItem {
        id: id.to_string(),
        source,
        title: format!("title-{id}"),
        authors: vec!["A. Researcher".to_string()],
        venue: Some("Nature".to_string()),
        year: Some(year),
        abstract_text: None,
        fields: Default::default(),
        relevance_score: relevance,
        quality_score: 0.9,
    }
}

fn scheduler_with_rps(pubs_rps: f64, trials_rps: f64, rag_rps: f64) -> Scheduler {
    Scheduler::new(
        OrchestratorConfig::default(),
        Cache::new(Duration::from_secs(60)),
        SourceRateLimiters::new(pubs_rps, trials_rps, rag_rps),
        RunEventBus::new(),
    )
}

fn scheduler() -> Scheduler {
    scheduler_with_rps(50.0, 50.0, 50.0)
}

/// An adapter that fails with a connection-classified error `fail_times`
/// times before returning its configured items.
struct FailThenSucceedAdapter {
    items: Vec<FetchedItem>,
    fail_times: usize,
    attempts: AtomicUsize,
}

impl FailThenSucceedAdapter {
    fn new(items: Vec<FetchedItem>, fail_times: usize) -> Self {
        Self { items, fail_times, attempts: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl SourceAdapter for FailThenSucceedAdapter {
    async fn search(&self, _entities: &Entities, _filters: &Filters, max_results: u32) -> Result<Vec<FetchedItem>, String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_times {
            return Err("connection refused by upstream".to_string());
        }
        Ok(self.items.iter().take(max_results as usize).cloned().collect())
    }
}

/// An adapter whose search never returns inside a node's deadline, forcing
/// the scheduler's timeout path.
struct NeverRespondingAdapter;

#[async_trait]
impl SourceAdapter for NeverRespondingAdapter {
    async fn search(&self, _entities: &Entities, _filters: &Filters, _max_results: u32) -> Result<Vec<FetchedItem>, String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn fast_path_single_source_completes_quickly_with_full_coverage() {
    let scheduler = scheduler();
    let items: Vec<FetchedItem> =
        (0..20).map(|i| item(&format!("p{i}"), Source::Publications, 0.9, 2024)).collect();
    let adapters = SourceAdapters {
        pubs: Arc::new(StubAdapter::new(Source::Publications, items)),
        trials: Arc::new(StubAdapter::new(Source::Trials, vec![])),
        rag: Arc::new(StubAdapter::new(Source::Rag, vec![])),
    };

    let request = QueryRequest {
        query: "recent papers on GLP-1 agonists".to_string(),
        sources: Some(vec![Source::Publications]),
        options: QueryOptions { budget_ms: 5000, priority: Priority::Speed, ..Default::default() },
    };

    let start = Instant::now();
    let state = scheduler.run(request, Arc::new(NoopRefiner), &adapters).await;
    assert_eq!(state.status, RunStatus::Completed);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(state.citations.len(), 20);
    let quality = state.quality.expect("synthesis runs by default");
    assert!((quality.completeness - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn parallel_fan_out_populates_both_sources_and_starts_concurrently() {
    let scheduler = scheduler();
    let trials_items: Vec<FetchedItem> =
        (0..30).map(|i| item(&format!("t{i}"), Source::Trials, 0.7, 2023)).collect();
    let pubs_items: Vec<FetchedItem> =
        (0..15).map(|i| item(&format!("p{i}"), Source::Publications, 0.7, 2023)).collect();
    let adapters = SourceAdapters {
        pubs: Arc::new(StubAdapter::new(Source::Publications, pubs_items)),
        trials: Arc::new(StubAdapter::new(Source::Trials, trials_items)),
        rag: Arc::new(StubAdapter::new(Source::Rag, vec![])),
    };

    let request = QueryRequest {
        query: "Novartis cardiovascular phase 3 trials with publications".to_string(),
        sources: None,
        options: QueryOptions { budget_ms: 10000, parallel_execution: true, ..Default::default() },
    };

    let state = scheduler.run(request, Arc::new(NoopRefiner), &adapters).await;
    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.pubs_results.as_ref().is_some_and(|v| !v.is_empty()));
    assert!(state.trials_results.as_ref().is_some_and(|v| !v.is_empty()));
}

#[tokio::test]
async fn transient_connection_failure_recovers_via_retry() {
    let scheduler = scheduler();
    let trials_items = vec![item("t1", Source::Trials, 0.8, 2022)];
    let adapters = SourceAdapters {
        pubs: Arc::new(StubAdapter::new(Source::Publications, vec![])),
        trials: Arc::new(FailThenSucceedAdapter::new(trials_items, 2)),
        rag: Arc::new(StubAdapter::new(Source::Rag, vec![])),
    };

    let request = QueryRequest {
        query: "phase 3 trials for a rare indication".to_string(),
        sources: Some(vec![Source::Trials]),
        options: QueryOptions { budget_ms: 8000, retry_strategy: RetryStrategy::Linear, ..Default::default() },
    };

    let state = scheduler.run(request, Arc::new(NoopRefiner), &adapters).await;
    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.trials_results.as_ref().is_some_and(|v| v.len() == 1));
    assert!(state.errors.is_empty(), "a recovered retry must not leave a terminal error behind");
}

#[tokio::test]
async fn budget_exhaustion_salvages_a_partial_answer_when_enabled() {
    let scheduler = scheduler();
    let adapters = SourceAdapters {
        pubs: Arc::new(StubAdapter::new(Source::Publications, vec![item("p1", Source::Publications, 0.6, 2021)])),
        trials: Arc::new(NeverRespondingAdapter),
        rag: Arc::new(StubAdapter::new(Source::Rag, vec![])),
    };

    let request = QueryRequest {
        query: "Novartis cardiovascular phase 3 trials with publications".to_string(),
        sources: None,
        options: QueryOptions {
            budget_ms: 1200,
            enable_partial_results: true,
            parallel_execution: true,
            ..Default::default()
        },
    };

    let state = scheduler.run(request, Arc::new(NoopRefiner), &adapters).await;
    assert!(matches!(state.status, RunStatus::Partial | RunStatus::Completed));
    assert!(state.pubs_results.as_ref().is_some_and(|v| !v.is_empty()));
}

#[tokio::test]
async fn disabling_partial_results_fails_the_run_on_total_timeout() {
    let scheduler = scheduler();
    let adapters = SourceAdapters {
        pubs: Arc::new(NeverRespondingAdapter),
        trials: Arc::new(StubAdapter::new(Source::Trials, vec![])),
        rag: Arc::new(StubAdapter::new(Source::Rag, vec![])),
    };

    let request = QueryRequest {
        query: "recent papers on GLP-1 agonists".to_string(),
        sources: Some(vec![Source::Publications]),
        options: QueryOptions { budget_ms: 1000, enable_partial_results: false, ..Default::default() },
    };

    let state = scheduler.run(request, Arc::new(NoopRefiner), &adapters).await;
    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.answer.is_none());
}

#[tokio::test]
async fn checkpoint_suffix_is_stable_across_two_runs_of_the_same_input() {
    let scheduler = scheduler();
    let make_adapters = || SourceAdapters {
        pubs: Arc::new(StubAdapter::new(Source::Publications, vec![item("p1", Source::Publications, 0.8, 2024)])),
        trials: Arc::new(StubAdapter::new(Source::Trials, vec![])),
        rag: Arc::new(StubAdapter::new(Source::Rag, vec![])),
    };
    let request = || QueryRequest {
        query: "recent papers on GLP-1 agonists".to_string(),
        sources: Some(vec![Source::Publications]),
        options: QueryOptions::default(),
    };

    let first = scheduler.run(request(), Arc::new(NoopRefiner), &make_adapters()).await;
    let second = scheduler.run(request(), Arc::new(NoopRefiner), &make_adapters()).await;

    let first_id = first.checkpoint_id.expect("checkpointing is enabled by default");
    let second_id = second.checkpoint_id.expect("checkpointing is enabled by default");
    let first_suffix = first_id.rsplit('_').next().unwrap();
    let second_suffix = second_id.rsplit('_').next().unwrap();
    assert_eq!(first_suffix, second_suffix);
    assert_eq!(first.citations, second.citations);
}
