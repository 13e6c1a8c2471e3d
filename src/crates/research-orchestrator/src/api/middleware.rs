//! Cross-cutting HTTP layers applied to every route: request tracing and
//! CORS.

use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub fn logging_layer() -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
}

/// Permissive CORS: this service is read by a browser-based research UI with
/// no fixed set of deployment origins.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}
