use tracing::{Level, Span};

use super::TraceId;

/// Root span for one regeneration pass over a playlist.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(Level::INFO, "pass", pass = name, trace_id = %trace_id)
}

/// Child span for one pool within a pass (inherits trace_id).
pub fn child_span(name: &str) -> Span {
    tracing::span!(Level::INFO, "pool", pool = name)
}
