//! Synthesizer (§4.9): consumes every available result slot and produces an
//! answer, a citation list, and quality metrics. Never throws — any internal
//! failure is caught and reported as the empty template with the error
//! recorded in the run's error log instead of propagating.

pub mod citations;
pub mod quality;
pub mod templates;

use chrono::{Datelike, Utc};

use crate::domain::{
    AnswerType, Citation, ErrorKind, ErrorSeverity, FetchedItem, QualityScores, RunError, RunState, Source,
};

pub struct SynthesisOutput {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub quality: QualityScores,
    pub answer_type: AnswerType,
}

/// Run synthesis over `state`. `requested_sources` is the set of sources the
/// query asked for (used by the completeness metric); `quality_threshold`
/// has already been applied by each fetch node, so this function only reads
/// what survived. Wrapped in `catch_unwind` so a bug in the rendering or
/// scoring path degrades to the empty template instead of taking the whole
/// run down with it.
pub fn synthesize(state: &RunState, requested_sources: &[Source]) -> SynthesisOutput {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| build(state, requested_sources)))
        .unwrap_or_else(|_| SynthesisOutput {
            answer: templates::render(AnswerType::Empty, &state.query, 0, &[], 0),
            citations: Vec::new(),
            quality: QualityScores::default(),
            answer_type: AnswerType::Empty,
        })
}

fn build(state: &RunState, requested_sources: &[Source]) -> SynthesisOutput {
    let all_items: Vec<FetchedItem> = [Source::Publications, Source::Trials, Source::Rag]
        .into_iter()
        .filter_map(|source| state.result_slot(source).clone())
        .flatten()
        .collect();

    let extraction = citations::extract(&all_items);

    let contributing: Vec<Source> = [Source::Publications, Source::Trials, Source::Rag]
        .into_iter()
        .filter(|source| {
            state
                .result_slot(*source)
                .as_ref()
                .map(|items| !items.is_empty())
                .unwrap_or(false)
        })
        .collect();

    let any_source_failed = state.errors.iter().any(|e| {
        matches!(
            e.node.as_str(),
            "pubs_fetch" | "trials_fetch" | "rag_fetch"
        )
    });

    let answer_type =
        templates::classify_answer_type(contributing.len(), all_items.len(), any_source_failed);

    let current_year = Utc::now().year();
    let quality = quality::score(&contributing, requested_sources, &extraction.citations, current_year);

    let answer = templates::render(
        answer_type,
        &state.query,
        all_items.len(),
        &extraction.citations,
        extraction.remainder,
    );

    SynthesisOutput {
        answer,
        citations: extraction.citations,
        quality,
        answer_type,
    }
}

/// Build the `RunError` the caller should append when the synthesizer's
/// public function took the catch-all empty path.
pub fn synthesis_failure_error(message: impl Into<String>) -> RunError {
    RunError {
        node: "synthesizer".to_string(),
        kind: ErrorKind::Unknown,
        message: message.into(),
        ts: Utc::now(),
        severity: ErrorSeverity::Recoverable,
        recovery_action: "use_empty_result".to_string(),
    }
}
