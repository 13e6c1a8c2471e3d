//! Citation extraction: dedup by canonical id across sources, sort by
//! descending relevance, truncate to a displayed cap, and assign a stable
//! 1-based index.

use crate::domain::{Citation, FetchedItem};

/// At most this many citations are displayed; the remainder is reported as
/// a count alongside the truncated list.
pub const MAX_DISPLAYED_CITATIONS: usize = 20;

pub struct CitationExtraction {
    pub citations: Vec<Citation>,
    pub remainder: usize,
}

/// Build the citation list from every item across all result slots. Items
/// sharing an id (the same record surfaced by more than one source, or a
/// cache-then-network hit) are merged into one citation, keeping the first
/// occurrence's attribution and the higher of any duplicate relevance
/// scores.
pub fn extract(all_items: &[FetchedItem]) -> CitationExtraction {
    let mut by_id: Vec<FetchedItem> = Vec::new();
    for item in all_items {
        if let Some(existing) = by_id.iter_mut().find(|i| i.id == item.id) {
            if item.relevance_score > existing.relevance_score {
                existing.relevance_score = item.relevance_score;
            }
            continue;
        }
        by_id.push(item.clone());
    }

    by_id.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let remainder = by_id.len().saturating_sub(MAX_DISPLAYED_CITATIONS);
    let citations = by_id
        .into_iter()
        .take(MAX_DISPLAYED_CITATIONS)
        .enumerate()
        .map(|(i, item)| Citation {
            index: i + 1,
            id: item.id,
            source: item.source,
            title: item.title,
            authors: item.authors,
            venue: item.venue,
            year: item.year,
            external_url: None,
            relevance_score: item.relevance_score,
        })
        .collect();

    CitationExtraction { citations, remainder }
}
