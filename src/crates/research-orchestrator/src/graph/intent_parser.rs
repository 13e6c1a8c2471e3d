//! Intent parser: raw query text -> [`Frame`].
//!
//! A tiered strategy: (1) rule-based entity extraction over regexes and
//! small lexicons, which also yields a confidence score; (2) an optional LLM
//! call that can propose an intent and fill gaps the rules missed (modeled
//! as an injected [`IntentRefiner`], since the concrete LLM client is an
//! external collaborator per scope); (3) a backstop — below confidence 0.5,
//! collapse to `recent_pubs_by_topic` seeded from the raw query.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::domain::{Entities, FetchPolicy, Filters, Frame, Intent};

const CONFIDENCE_THRESHOLD: f64 = 0.5;

fn nct_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bNCT\d{8}\b").unwrap())
}

fn pmid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bPMID:?\s*\d{6,9}\b").unwrap())
}

fn phase_term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bphase\s*(1|2|3|4|i{1,3}v?)\b").unwrap())
}

const COMPANY_LEXICON: &[&str] = &[
    "novartis",
    "pfizer",
    "roche",
    "merck",
    "astrazeneca",
    "gilead",
    "amgen",
    "sanofi",
    "eli lilly",
    "bristol myers squibb",
];

const INDICATION_LEXICON: &[&str] = &[
    "diabetes",
    "cardiovascular",
    "oncology",
    "cancer",
    "alzheimer",
    "obesity",
    "asthma",
    "hypertension",
];

/// Optional second tier: given the raw query and the rule-based extraction
/// so far, propose a refined intent/entities/confidence. The concrete
/// implementation (an LLM call) is out of scope; a no-op refiner that leaves
/// the rule-based result untouched is used when none is configured.
#[async_trait]
pub trait IntentRefiner: Send + Sync {
    async fn refine(&self, query: &str, draft: Frame) -> Frame;
}

pub struct NoopRefiner;

#[async_trait]
impl IntentRefiner for NoopRefiner {
    async fn refine(&self, _query: &str, draft: Frame) -> Frame {
        draft
    }
}

/// Parse `query` into a [`Frame`]. Returns `Err` only on empty input.
pub async fn parse(query: &str, refiner: &dyn IntentRefiner) -> Result<Frame, String> {
    if query.trim().is_empty() {
        return Err("ParseError: query is empty".to_string());
    }

    let draft = rule_based_extract(query);
    let refined = refiner.refine(query, draft).await;

    if refined.confidence < CONFIDENCE_THRESHOLD {
        Ok(Frame::fallback(query))
    } else {
        Ok(refined)
    }
}

fn rule_based_extract(query: &str) -> Frame {
    let lower = query.to_lowercase();
    let mut entities = Entities::default();
    let mut filters = Filters::default();
    let mut score = 0.0f64;
    let mut hits = 0u32;

    if let Some(m) = nct_id_re().find(query) {
        entities.trial_id = Some(m.as_str().to_string());
        hits += 1;
    }
    if pmid_re().is_match(query) {
        hits += 1;
    }
    for phase in phase_term_re().find_iter(query) {
        filters.phase.push(phase.as_str().to_string());
        hits += 1;
    }
    for company in COMPANY_LEXICON {
        if lower.contains(company) {
            entities.company = Some(company.to_string());
            hits += 1;
            break;
        }
    }
    for indication in INDICATION_LEXICON {
        if lower.contains(indication) {
            entities.indication = Some(indication.to_string());
            hits += 1;
            break;
        }
    }
    if entities.topic.is_none() {
        entities.topic = Some(query.to_string());
    }

    // Confidence grows with the number of structured signals found; a bare
    // topic-only query still clears the threshold so ordinary questions
    // route normally rather than bottoming out at the fallback.
    score += 0.5;
    score += (hits as f64) * 0.15;
    let confidence = score.min(1.0);

    let intent = classify_intent(&entities, &filters);

    Frame {
        intent,
        entities,
        filters,
        fetch_policy: FetchPolicy::CacheThenNetwork,
        confidence,
    }
}

fn classify_intent(entities: &Entities, filters: &Filters) -> Intent {
    let has_company = entities.company.is_some();
    let has_indication = entities.indication.is_some();
    let has_phase = !filters.phase.is_empty();
    let has_trial_id = entities.trial_id.is_some();

    if has_company && (has_phase || has_trial_id) {
        Intent::CompanyPipeline
    } else if has_indication && has_phase {
        Intent::IndicationPhaseTrials
    } else if has_trial_id || (has_indication && has_company) {
        Intent::TrialsWithPubs
    } else if has_company {
        Intent::HybridSearch
    } else {
        Intent::RecentPubsByTopic
    }
}
