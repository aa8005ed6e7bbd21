//! Metric instrument factories for sqliteq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider installed these are no-ops.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("sqliteq")
}

/// Counter: engine operations.
/// Labels: `queue`, `kind` ("fifo" | "priority"), `operation`,
/// `result` ("ok" | "empty" | "miss" | "error").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("sqliteq.queue.operations")
        .with_description("Number of queue engine operations")
        .build()
}

/// Counter: item lifecycle transitions.
/// Labels: `queue`, `from`, `to` ("none" and "removed" stand for an absent row).
pub fn item_transitions() -> Counter<u64> {
    meter()
        .u64_counter("sqliteq.item.transitions")
        .with_description("Number of item state transitions")
        .build()
}

/// Counter: orphaned items returned to pending by recovery.
/// Labels: `queue`.
pub fn requeued() -> Counter<u64> {
    meter()
        .u64_counter("sqliteq.queue.requeued")
        .with_description("Items requeued after their consumer never acknowledged them")
        .build()
}
