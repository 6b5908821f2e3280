//! Metrics collection.
//!
//! # Metrics
//! - `nfd_service_runs_total` (counter): runs started by the facade
//! - `nfd_service_run_failures_total` (counter): failed runs, by failure kind
//! - `nfd_service_runtime_resets_total` (counter): full runtime resets
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without a recorder these are no-ops

use metrics::counter;

/// Record a run handed to a worker thread.
pub fn record_run_started() {
    counter!("nfd_service_runs_total").increment(1);
}

/// Record a run that ended with a failure.
pub fn record_run_failure(kind: &'static str) {
    counter!("nfd_service_run_failures_total", "kind" => kind).increment(1);
}

/// Record a full reset of the global runtime state.
pub fn record_runtime_reset() {
    counter!("nfd_service_runtime_resets_total").increment(1);
}
