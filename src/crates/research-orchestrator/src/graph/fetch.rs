//! The shared fetch-node template (§4.4): build a cache key, consult the
//! cache per `fetch_policy`, acquire a rate-limit token, call the source
//! adapter, normalize/filter/dedup/sort the result, and write it to the
//! result slot (or record an error).
//!
//! Source-specific adapters are an external collaborator per scope; this
//! module defines the capability trait ([`SourceAdapter`]) and a
//! deterministic in-memory stub used by tests and as a development default.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::cache::Cache;
use crate::domain::{Entities, FetchPolicy, FetchedItem, Filters, Source};
use crate::scheduler::rate_limit::SourceRateLimiters;

/// What a fetch node asks its adapter to do. Adapters are expected to be
/// thin clients over PubMed, ClinicalTrials.gov, or an internal vector store;
/// their concrete wire protocols are out of scope here.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn search(
        &self,
        entities: &Entities,
        filters: &Filters,
        max_results: u32,
    ) -> Result<Vec<FetchedItem>, String>;

    /// Fetch full records for a bounded set of ids. Only `pubs_fetch` uses
    /// this, when the intent demands details beyond the search summary.
    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<FetchedItem>, String> {
        let _ = ids;
        Ok(Vec::new())
    }
}

/// Everything a fetch node needs beyond the adapter: shared cache, rate
/// limiters, and the danger-zone flag (lowers the internal pagination cap).
pub struct FetchContext<'a> {
    pub source: Source,
    pub cache: &'a Cache,
    pub rate_limiters: &'a SourceRateLimiters,
    pub danger_zone: bool,
}

/// The cap N on the pubs node's second details call (top-N ids, N <= 50,
/// further capped by `max_results_per_source`).
const MAX_DETAILS_IDS: u32 = 50;

/// Build the cache key from `(node_name, sorted(entities), sorted(filters),
/// max_results_per_source)`. Sorting entity/filter fields before hashing
/// keeps the key stable regardless of struct field order.
pub fn cache_key(node_name: &str, entities: &Entities, filters: &Filters, max_results: u32) -> String {
    let mut entity_pairs: Vec<(&str, String)> = Vec::new();
    if let Some(v) = &entities.topic {
        entity_pairs.push(("topic", v.clone()));
    }
    if let Some(v) = &entities.indication {
        entity_pairs.push(("indication", v.clone()));
    }
    if let Some(v) = &entities.company {
        entity_pairs.push(("company", v.clone()));
    }
    if let Some(v) = &entities.trial_id {
        entity_pairs.push(("trial_id", v.clone()));
    }
    entity_pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut phase = filters.phase.clone();
    phase.sort();
    let mut status = filters.status.clone();
    status.sort();

    let entity_part = entity_pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    let filter_part = format!(
        "phase={}|status={}|within_days={:?}|years={:?}",
        phase.join("+"),
        status.join("+"),
        filters.published_within_days,
        filters.year_range,
    );

    format!("{node_name}:{entity_part}:{filter_part}:{max_results}")
}

/// Run the uniform fetch template for one source and return its items
/// (already filtered, deduped, and sorted) or an error message to classify.
pub async fn fetch(
    ctx: &FetchContext<'_>,
    adapter: &dyn SourceAdapter,
    entities: &Entities,
    filters: &Filters,
    fetch_policy: FetchPolicy,
    max_results_per_source: u32,
    quality_threshold: f64,
    wants_details: bool,
    node_deadline: Duration,
) -> Result<(Vec<FetchedItem>, bool), String> {
    let node_name = ctx.source.node_name();
    let effective_max = if ctx.danger_zone {
        max_results_per_source.min(10)
    } else {
        max_results_per_source
    };
    let key = cache_key(node_name, entities, filters, effective_max);

    if matches!(fetch_policy, FetchPolicy::CacheOnly | FetchPolicy::CacheThenNetwork) {
        if let Some(cached) = ctx.cache.get(&key).await {
            let items: Vec<FetchedItem> =
                serde_json::from_value(cached).map_err(|e| format!("parse error: cache payload: {e}"))?;
            return Ok((items, true));
        }
        if matches!(fetch_policy, FetchPolicy::CacheOnly) {
            return Ok((Vec::new(), false));
        }
    }

    ctx.rate_limiters
        .acquire_before(ctx.source, node_deadline)
        .await
        .map_err(|e| format!("rate limit: {e}"))?;

    let mut items = tokio::time::timeout(node_deadline, adapter.search(entities, filters, effective_max))
        .await
        .map_err(|_| "timeout: adapter search exceeded node deadline".to_string())??;

    if wants_details && ctx.source == Source::Publications {
        let n = effective_max.min(MAX_DETAILS_IDS) as usize;
        let top_ids: Vec<String> = items.iter().take(n).map(|i| i.id.clone()).collect();
        if !top_ids.is_empty() {
            let details = adapter
                .fetch_details(&top_ids)
                .await
                .map_err(|e| format!("details fetch failed: {e}"))?;
            items = merge_details(items, details);
        }
    }

    items = normalize_and_filter(items, ctx.source, quality_threshold);

    if matches!(fetch_policy, FetchPolicy::CacheThenNetwork | FetchPolicy::NetworkOnly) {
        let payload = serde_json::to_value(&items).unwrap_or_else(|_| json!([]));
        ctx.cache.set(key, payload).await;
    }

    Ok((items, false))
}

/// Union search results with fetched full records by id, preferring the
/// detailed record's fields where present.
fn merge_details(search_results: Vec<FetchedItem>, details: Vec<FetchedItem>) -> Vec<FetchedItem> {
    let mut by_id: HashMap<String, FetchedItem> =
        search_results.into_iter().map(|i| (i.id.clone(), i)).collect();
    for detail in details {
        by_id.insert(detail.id.clone(), detail);
    }
    by_id.into_values().collect()
}

/// Dedup by id (entity-variant sub-queries may overlap), filter by
/// `quality_threshold`, then sort by `relevance_score` desc, `year` desc,
/// `id` asc for determinism.
fn normalize_and_filter(items: Vec<FetchedItem>, source: Source, threshold: f64) -> Vec<FetchedItem> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped: Vec<FetchedItem> = Vec::new();
    for mut item in items {
        item.source = source;
        if !seen.insert(item.id.clone()) {
            continue;
        }
        if item.quality_score < threshold {
            continue;
        }
        deduped.push(item);
    }
    deduped.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.year.unwrap_or(i32::MIN).cmp(&a.year.unwrap_or(i32::MIN)))
            .then_with(|| a.id.cmp(&b.id))
    });
    deduped
}

/// Deterministic stub adapter for tests and local development: returns a
/// fixed, small item set seeded from the query topic so results stay stable
/// across calls.
pub struct StubAdapter {
    pub source: Source,
    pub items: Vec<FetchedItem>,
}

impl StubAdapter {
    pub fn new(source: Source, items: Vec<FetchedItem>) -> Self {
        Self { source, items }
    }
}

#[async_trait]
impl SourceAdapter for StubAdapter {
    async fn search(
        &self,
        _entities: &Entities,
        _filters: &Filters,
        max_results: u32,
    ) -> Result<Vec<FetchedItem>, String> {
        Ok(self.items.iter().take(max_results as usize).cloned().collect())
    }

    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<FetchedItem>, String> {
        Ok(self
            .items
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn item(id: &str, relevance: f64, year: i32, quality: f64) -> FetchedItem {
        FetchedItem {
            id: id.to_string(),
            source: Source::Publications,
            title: format!("title-{id}"),
            authors: vec!["A. Researcher".into()],
            venue: Some("Journal".into()),
            year: Some(year),
            abstract_text: None,
            fields: HashMap::new(),
            relevance_score: relevance,
            quality_score: quality,
        }
    }

    fn ctx<'a>(cache: &'a Cache, limiters: &'a SourceRateLimiters, danger_zone: bool) -> FetchContext<'a> {
        FetchContext {
            source: Source::Publications,
            cache,
            rate_limiters: limiters,
            danger_zone,
        }
    }

    #[test]
    fn cache_key_is_order_independent_for_entity_fields() {
        let mut e1 = Entities::default();
        e1.topic = Some("x".into());
        e1.company = Some("novartis".into());
        let mut e2 = Entities::default();
        e2.company = Some("novartis".into());
        e2.topic = Some("x".into());
        let f = Filters::default();
        assert_eq!(
            cache_key("pubs_fetch", &e1, &f, 20),
            cache_key("pubs_fetch", &e2, &f, 20)
        );
    }

    #[test]
    fn normalize_and_filter_dedups_sorts_and_applies_threshold() {
        let items = vec![
            item("b", 0.5, 2020, 0.9),
            item("a", 0.5, 2020, 0.9),
            item("a", 0.5, 2020, 0.9), // duplicate id, should be dropped
            item("c", 0.9, 2021, 0.1), // below threshold
            item("d", 0.9, 2019, 0.9),
        ];
        let result = normalize_and_filter(items, Source::Publications, 0.5);
        let ids: Vec<&str> = result.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a", "b"]);
    }

    #[tokio::test]
    async fn cache_then_network_populates_cache_on_miss_and_hits_on_second_call() {
        let cache = Cache::new(Duration::from_secs(60));
        let limiters = SourceRateLimiters::new(10.0, 10.0, 10.0);
        let adapter = StubAdapter::new(Source::Publications, vec![item("a", 0.8, 2022, 0.9)]);
        let c = ctx(&cache, &limiters, false);

        let (first, hit1) = fetch(
            &c,
            &adapter,
            &Entities::default(),
            &Filters::default(),
            FetchPolicy::CacheThenNetwork,
            20,
            0.0,
            false,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(!hit1);
        assert_eq!(first.len(), 1);

        let (second, hit2) = fetch(
            &c,
            &adapter,
            &Entities::default(),
            &Filters::default(),
            FetchPolicy::CacheThenNetwork,
            20,
            0.0,
            false,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(hit2);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn cache_only_returns_empty_on_miss_without_calling_adapter() {
        let cache = Cache::new(Duration::from_secs(60));
        let limiters = SourceRateLimiters::new(10.0, 10.0, 10.0);
        let adapter = StubAdapter::new(Source::Publications, vec![item("a", 0.8, 2022, 0.9)]);
        let c = ctx(&cache, &limiters, false);

        let (items, hit) = fetch(
            &c,
            &adapter,
            &Entities::default(),
            &Filters::default(),
            FetchPolicy::CacheOnly,
            20,
            0.0,
            false,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(!hit);
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn danger_zone_lowers_the_effective_pagination_cap() {
        let cache = Cache::new(Duration::from_secs(60));
        let limiters = SourceRateLimiters::new(10.0, 10.0, 10.0);
        let many: Vec<FetchedItem> = (0..20)
            .map(|n| item(&format!("id{n}"), 0.5, 2020, 0.9))
            .collect();
        let adapter = StubAdapter::new(Source::Publications, many);
        let c = ctx(&cache, &limiters, true);

        let (items, _) = fetch(
            &c,
            &adapter,
            &Entities::default(),
            &Filters::default(),
            FetchPolicy::NetworkOnly,
            20,
            0.0,
            false,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(items.len() <= 10);
    }

    #[tokio::test]
    async fn wants_details_merges_full_records_for_top_ids() {
        let cache = Cache::new(Duration::from_secs(60));
        let limiters = SourceRateLimiters::new(10.0, 10.0, 10.0);
        let mut detailed = item("a", 0.8, 2022, 0.9);
        detailed.abstract_text = Some("full abstract".into());
        let adapter = StubAdapter::new(Source::Publications, vec![item("a", 0.8, 2022, 0.9)]);
        // fetch_details on the stub returns from the same `items` list, so
        // swap in a version carrying an abstract to prove the merge took it.
        struct DetailAdapter(StubAdapter, FetchedItem);
        #[async_trait]
        impl SourceAdapter for DetailAdapter {
            async fn search(
                &self,
                e: &Entities,
                f: &Filters,
                m: u32,
            ) -> Result<Vec<FetchedItem>, String> {
                self.0.search(e, f, m).await
            }
            async fn fetch_details(&self, _ids: &[String]) -> Result<Vec<FetchedItem>, String> {
                Ok(vec![self.1.clone()])
            }
        }
        let adapter = DetailAdapter(adapter, detailed);
        let c = ctx(&cache, &limiters, false);

        let (items, _) = fetch(
            &c,
            &adapter,
            &Entities::default(),
            &Filters::default(),
            FetchPolicy::NetworkOnly,
            20,
            0.0,
            true,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(items[0].abstract_text.as_deref(), Some("full abstract"));
    }
}
