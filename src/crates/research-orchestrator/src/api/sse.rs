//! `GET /api/research/stream/:run_id` (§6): server-sent events over the
//! shared [`crate::events::RunEventBus`], filtered down to one run.
//!
//! The bus is process-wide, not per-run, so every subscriber sees every
//! run's events; we filter client-side. A subscriber that connects after the
//! run has already finished is handed the bus's single remembered
//! `last_terminal` event if (and only if) it happens to belong to this run —
//! reconnecting to an already-finished *older* run past that point isn't
//! supported by this bus, a deliberate simplification.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::api::state::AppState;
use crate::events::ResearchEvent;

pub async fn stream_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let bus = state.scheduler.events().clone();
    let already_terminal = bus
        .last_terminal()
        .await
        .filter(|e| e.run_id() == run_id);

    let live = BroadcastStream::new(bus.subscribe()).filter_map({
        let run_id = run_id.clone();
        move |item| {
            let run_id = run_id.clone();
            async move {
                match item {
                    Ok(event) if event.run_id() == run_id => Some(event),
                    _ => None,
                }
            }
        }
    });

    let replay = stream::iter(already_terminal);
    let merged = replay.chain(live).map(to_sse_event);

    Sse::new(merged).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse_event(event: ResearchEvent) -> Result<Event, Infallible> {
    let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
    Ok(Event::default().event(event.event_type()).data(payload))
}
