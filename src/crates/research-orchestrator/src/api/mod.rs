//! HTTP API layer (§6): the public REST/SSE surface over the scheduler.
//! Everything in here is a thin translation from JSON requests/typed events
//! to the domain types `scheduler` already produces; no business logic
//! lives here.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod sse;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
