//! Router node: a pure function from [`Frame`] to the set of successor fetch
//! nodes. Unknown intent defensively routes to `pubs_fetch`. In the danger
//! zone (>=80% budget consumed) the scheduler asks for a single-source path
//! even when the intent would otherwise fan out.

use crate::domain::{Frame, Intent};

/// Route `frame` to its successor node names. `danger_zone` collapses a
/// parallel-eligible intent down to its first successor only, so the
/// scheduler can keep making progress on a shrinking budget instead of
/// committing to a second fetch it likely can't afford.
pub fn route(frame: &Frame, danger_zone: bool) -> Vec<&'static str> {
    let successors = frame.intent.successors();
    if danger_zone && frame.intent.is_parallel_eligible() {
        successors.into_iter().take(1).collect()
    } else {
        successors
    }
}

/// Validates an intent is one this router recognizes; unrecognized values
/// (possible only via a custom [`crate::graph::intent_parser::IntentRefiner`]
/// producing something outside the enum) fall back to `pubs_fetch` per the
/// "unknown intent" contract. Since [`Intent`] is a closed Rust enum every
/// variant is recognized by construction; this helper exists so the
/// defensive-default contract is explicit and testable rather than implicit
/// in the type system.
pub fn route_defensive(intent: Option<Intent>, danger_zone: bool) -> Vec<&'static str> {
    match intent {
        Some(intent) => route(
            &Frame {
                intent,
                entities: Default::default(),
                filters: Default::default(),
                fetch_policy: crate::domain::FetchPolicy::CacheThenNetwork,
                confidence: 1.0,
            },
            danger_zone,
        ),
        None => vec!["pubs_fetch"],
    }
}
