//! Composite quality scoring (§4.9), all components in `[0, 1]`.

use crate::domain::{Citation, QualityScores, Source};

const HIGH_REPUTATION_VENUES: &[&str] = &[
    "new england journal of medicine",
    "the lancet",
    "jama",
    "nature",
    "science",
    "cell",
    "bmj",
];

/// `completeness` treats every requested source as equally weighted: the
/// spec names a weight-sum without specifying per-source weights, so an
/// even split is the natural default.
pub fn completeness(contributing: &[Source], requested: &[Source]) -> f64 {
    if requested.is_empty() {
        return 0.0;
    }
    let contributing_weight = requested.iter().filter(|s| contributing.contains(s)).count();
    contributing_weight as f64 / requested.len() as f64
}

/// Each citation scores 1.0 if published within the last 5 years, with a
/// 0.5 bonus (capped at 1.0) for the last 2 years; items with no year score 0.
pub fn recency(citations: &[Citation], current_year: i32) -> f64 {
    if citations.is_empty() {
        return 0.0;
    }
    let total: f64 = citations
        .iter()
        .map(|c| match c.year {
            Some(y) if y >= current_year - 2 => 1.5,
            Some(y) if y >= current_year - 5 => 1.0,
            _ => 0.0,
        })
        .sum();
    (total / citations.len() as f64).min(1.0)
}

fn is_high_reputation_venue(venue: &Option<String>) -> bool {
    venue
        .as_ref()
        .map(|v| {
            let lower = v.to_lowercase();
            HIGH_REPUTATION_VENUES.iter().any(|h| lower.contains(h))
        })
        .unwrap_or(false)
}

/// Trial registry entries are treated as authoritative by construction;
/// publications are authoritative when their venue is high-reputation.
pub fn authority(citations: &[Citation]) -> f64 {
    if citations.is_empty() {
        return 0.0;
    }
    let authoritative = citations
        .iter()
        .filter(|c| matches!(c.source, Source::Trials) || is_high_reputation_venue(&c.venue))
        .count();
    authoritative as f64 / citations.len() as f64
}

/// Publication-type buckets used only for the diversity metric: trial
/// registrations, peer-reviewed literature, and everything else (RAG
/// passages, preprints).
fn type_bucket(source: Source) -> &'static str {
    match source {
        Source::Trials => "trial_registry",
        Source::Publications => "peer_reviewed",
        Source::Rag => "other",
    }
}

const MAX_SOURCES: f64 = 3.0;
const MAX_TYPE_BUCKETS: f64 = 3.0;

pub fn diversity(citations: &[Citation]) -> f64 {
    if citations.is_empty() {
        return 0.0;
    }
    let distinct_sources = citations
        .iter()
        .map(|c| c.source)
        .collect::<std::collections::HashSet<_>>()
        .len() as f64;
    let distinct_buckets = citations
        .iter()
        .map(|c| type_bucket(c.source))
        .collect::<std::collections::HashSet<_>>()
        .len() as f64;
    (distinct_sources / MAX_SOURCES) * (distinct_buckets / MAX_TYPE_BUCKETS)
}

pub fn relevance(citations: &[Citation]) -> f64 {
    if citations.is_empty() {
        return 0.0;
    }
    citations.iter().map(|c| c.relevance_score).sum::<f64>() / citations.len() as f64
}

pub fn score(contributing: &[Source], requested: &[Source], citations: &[Citation], current_year: i32) -> QualityScores {
    let completeness = completeness(contributing, requested);
    let recency = recency(citations, current_year);
    let authority = authority(citations);
    let diversity = diversity(citations);
    let relevance = relevance(citations);
    let overall = 0.25 * completeness + 0.20 * recency + 0.25 * authority + 0.15 * diversity + 0.15 * relevance;
    QualityScores {
        completeness,
        recency,
        authority,
        diversity,
        relevance,
        overall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(source: Source, year: Option<i32>, relevance: f64, venue: Option<&str>) -> Citation {
        Citation {
            index: 1,
            id: "id".into(),
            source,
            title: "t".into(),
            authors: vec![],
            venue: venue.map(|v| v.to_string()),
            year,
            external_url: None,
            relevance_score: relevance,
        }
    }

    #[test]
    fn completeness_is_fraction_of_requested_sources_that_contributed() {
        let requested = vec![Source::Publications, Source::Trials, Source::Rag];
        let contributing = vec![Source::Publications, Source::Trials];
        assert!((completeness(&contributing, &requested) - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn recency_rewards_very_recent_items_more_than_older_ones() {
        let recent = vec![citation(Source::Publications, Some(2026), 0.5, None)];
        let older = vec![citation(Source::Publications, Some(2022), 0.5, None)];
        assert!(recency(&recent, 2026) > recency(&older, 2026));
    }

    #[test]
    fn trials_are_always_authoritative() {
        let citations = vec![citation(Source::Trials, Some(2020), 0.5, None)];
        assert_eq!(authority(&citations), 1.0);
    }

    #[test]
    fn diversity_rewards_multiple_sources_and_type_buckets() {
        let single = vec![citation(Source::Publications, Some(2020), 0.5, None)];
        let multi = vec![
            citation(Source::Publications, Some(2020), 0.5, None),
            citation(Source::Trials, Some(2020), 0.5, None),
        ];
        assert!(diversity(&multi) > diversity(&single));
    }

    #[test]
    fn overall_matches_the_weighted_formula() {
        let requested = vec![Source::Publications];
        let contributing = vec![Source::Publications];
        let citations = vec![citation(Source::Publications, Some(2026), 1.0, Some("Nature"))];
        let scores = score(&contributing, &requested, &citations, 2026);
        let expected = 0.25 * scores.completeness
            + 0.20 * scores.recency
            + 0.25 * scores.authority
            + 0.15 * scores.diversity
            + 0.15 * scores.relevance;
        assert!((scores.overall - expected).abs() < 1e-9);
    }
}
