//! Deterministic checkpoint identity (§4.10):
//! `{YYYYMMDD_HHMMSS}_{first 12 hex chars of SHA-256(normalized_query|intent|source_coverage_signature)}`.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::{Frame, Source};
use std::collections::HashMap;

/// Lowercase and collapse internal whitespace so semantically identical
/// queries ("GLP-1  agonists" vs "glp-1 agonists") hash identically.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn compute(now: DateTime<Utc>, query: &str, frame: &Frame, source_counts: &HashMap<Source, usize>) -> String {
    let prefix = now.format("%Y%m%d_%H%M%S").to_string();
    let intent_str = serde_json::to_string(&frame.intent).unwrap_or_default();
    let signature = frame.source_coverage_signature(source_counts);
    let hash_input = format!("{}|{}|{}", normalize_query(query), intent_str, signature);

    let mut hasher = Sha256::new();
    hasher.update(hash_input.as_bytes());
    let digest = hasher.finalize();
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();

    format!("{prefix}_{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Intent;
    use chrono::TimeZone;

    fn frame() -> Frame {
        Frame::fallback("GLP-1 agonists")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn same_inputs_produce_the_same_checkpoint_id() {
        let counts = HashMap::from([(Source::Publications, 5)]);
        let a = compute(now(), "glp-1 agonists", &frame(), &counts);
        let b = compute(now(), "glp-1 agonists", &frame(), &counts);
        assert_eq!(a, b);
    }

    #[test]
    fn prefix_matches_the_timestamp_format() {
        let counts = HashMap::new();
        let id = compute(now(), "q", &frame(), &counts);
        assert!(id.starts_with("20260102_030405_"));
    }

    #[test]
    fn suffix_is_twelve_hex_characters() {
        let counts = HashMap::new();
        let id = compute(now(), "q", &frame(), &counts);
        let suffix = id.split('_').nth(2).unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_intent_changes_the_suffix() {
        let counts = HashMap::new();
        let mut other = frame();
        other.intent = Intent::HybridSearch;
        let a = compute(now(), "q", &frame(), &counts);
        let b = compute(now(), "q", &other, &counts);
        assert_ne!(a, b);
    }

    #[test]
    fn query_normalization_ignores_case_and_extra_whitespace() {
        let counts = HashMap::new();
        let a = compute(now(), "GLP-1   Agonists", &frame(), &counts);
        let b = compute(now(), "glp-1 agonists", &frame(), &counts);
        assert_eq!(a, b);
    }
}
