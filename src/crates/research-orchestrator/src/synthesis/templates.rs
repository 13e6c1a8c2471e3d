//! Answer-type classification and the four rendering templates (§4.9).

use crate::domain::{AnswerType, Citation, Source};

/// Selection order resolves overlaps deliberately: `empty` and `minimal` are
/// the most specific conditions and are checked first; `comprehensive`
/// requires both breadth and volume with no failures; everything else is
/// `partial`.
pub fn classify_answer_type(
    contributing_sources: usize,
    total_items: usize,
    any_source_failed: bool,
) -> AnswerType {
    if total_items == 0 {
        return AnswerType::Empty;
    }
    if contributing_sources == 1 && total_items < 5 {
        return AnswerType::Minimal;
    }
    if !any_source_failed && contributing_sources >= 2 && total_items >= 10 {
        return AnswerType::Comprehensive;
    }
    AnswerType::Partial
}

pub fn render(
    answer_type: AnswerType,
    query: &str,
    total_items: usize,
    citations: &[Citation],
    remainder: usize,
) -> String {
    match answer_type {
        AnswerType::Empty => format!(
            "No results were found for \"{query}\". Try broadening the query or removing filters."
        ),
        AnswerType::Minimal => {
            let source = citations.first().map(|c| c.source).unwrap_or(Source::Publications);
            format!(
                "Found a small number of results ({total_items}) from {} for \"{query}\". Consider widening the search for fuller coverage.\n\n{}",
                source.as_str(),
                citation_block(citations, remainder)
            )
        }
        AnswerType::Partial => format!(
            "Partial results are available for \"{query}\" ({total_items} items across {} sources). Some sources did not complete or the result set is incomplete.\n\n{}",
            distinct_source_count(citations),
            citation_block(citations, remainder)
        ),
        AnswerType::Comprehensive => format!(
            "Comprehensive results for \"{query}\": {total_items} items drawn from {} sources.\n\n{}",
            distinct_source_count(citations),
            citation_block(citations, remainder)
        ),
    }
}

fn distinct_source_count(citations: &[Citation]) -> usize {
    citations
        .iter()
        .map(|c| c.source)
        .collect::<std::collections::HashSet<_>>()
        .len()
}

fn citation_block(citations: &[Citation], remainder: usize) -> String {
    if citations.is_empty() {
        return String::new();
    }
    let mut lines: Vec<String> = citations
        .iter()
        .map(|c| format!("[{}] {} ({})", c.index, c.title, c.source.as_str()))
        .collect();
    if remainder > 0 {
        lines.push(format!("... and {remainder} more"));
    }
    lines.join("\n")
}
