//! Queue operation span helpers.

use tracing::Span;

/// Start a span for one engine operation on `queue`.
pub fn start_queue_span(queue: &str, operation: &'static str) -> Span {
    tracing::info_span!(
        "queue.op",
        "queue.name" = queue,
        "queue.operation" = operation,
    )
}

/// Record an item transition on `span`.
///
/// `from`/`to` use "none" and "removed" for an absent row.
pub fn record_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "item_transition");
    });
}
