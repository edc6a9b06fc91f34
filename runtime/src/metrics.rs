//! Metrics for observability and monitoring.
//!
//! The runtime records through the `metrics` facade. Installing a recorder
//! (Prometheus, statsd, ...) is left to the embedding application; without
//! one, recording is a no-op.
//!
//! # Example
//!
//! ```rust
//! use billing_bridge_runtime::metrics::register_metrics;
//!
//! // Call once after installing a recorder so descriptions show up.
//! register_metrics();
//! ```

use metrics::{Unit, describe_counter, describe_histogram};

/// Actions reduced by the worker.
pub const ACTIONS_TOTAL: &str = "billing_store.actions.total";

/// Actions rejected because the store was shutting down.
pub const ACTIONS_REJECTED: &str = "billing_store.actions.rejected";

/// Effects executed, labelled by `type`.
pub const EFFECTS_EXECUTED: &str = "billing_store.effects.executed";

/// Replies lost because the target's receiver was dropped.
pub const DELIVERIES_DROPPED: &str = "billing_store.deliveries.dropped";

/// Reducer execution time.
pub const REDUCER_DURATION: &str = "billing_store.reducer.duration_seconds";

/// Shutdowns initiated.
pub const SHUTDOWNS: &str = "billing_store.shutdown.initiated";

/// Register descriptions for every runtime metric.
pub fn register_metrics() {
    describe_counter!(ACTIONS_TOTAL, Unit::Count, "Actions reduced by the store worker");
    describe_counter!(
        ACTIONS_REJECTED,
        Unit::Count,
        "Actions rejected because the store was shutting down"
    );
    describe_counter!(EFFECTS_EXECUTED, Unit::Count, "Effects executed, by type");
    describe_counter!(
        DELIVERIES_DROPPED,
        Unit::Count,
        "Replies lost because the target receiver was dropped"
    );
    describe_histogram!(REDUCER_DURATION, Unit::Seconds, "Reducer execution time");
    describe_counter!(SHUTDOWNS, Unit::Count, "Store shutdowns initiated");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_without_recorder_is_noop() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_metric_names_are_namespaced() {
        for name in [
            ACTIONS_TOTAL,
            ACTIONS_REJECTED,
            EFFECTS_EXECUTED,
            DELIVERIES_DROPPED,
            REDUCER_DURATION,
            SHUTDOWNS,
        ] {
            assert!(name.starts_with("billing_store."), "{name}");
        }
    }
}
