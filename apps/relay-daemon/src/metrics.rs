//! Prometheus metrics for the relay.
//!
//! The engine reports through [`PollObserver`]; this module turns those
//! callbacks into counters and a histogram on the global `metrics` recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use relay_core::ProcessingOutcome;
use relay_engine::{EngineError, PollObserver};

// ============================================================================
// Metric Names
// ============================================================================

/// Every dispatched item, whatever its outcome.
pub const FILES_PROCESSED_TOTAL: &str = "files_processed_total";

pub const FILES_SUCCEEDED_TOTAL: &str = "files_succeeded_total";

/// Labelled by failure kind.
pub const FILES_FAILED_TOTAL: &str = "files_failed_total";

/// Labelled by skip reason.
pub const FILES_SKIPPED_TOTAL: &str = "files_skipped_total";

pub const FILE_PROCESSING_SECONDS: &str = "file_processing_seconds";

pub const POLL_ITERATIONS_FAILED_TOTAL: &str = "poll_iterations_failed_total";

pub const POLL_SUPPRESSED_TOTAL: &str = "poll_suppressed_total";

pub const ASSOCIATION_FAILURES_TOTAL: &str = "association_failures_total";

pub const PERSISTENCE_FAILURES_TOTAL: &str = "persistence_failures_total";

/// Bucket bounds in seconds.
const PROCESSING_BUCKETS: [f64; 11] = [
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

// ============================================================================
// Prometheus Recorder
// ============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder.
///
/// Safe to call more than once; later calls return the first handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(FILE_PROCESSING_SECONDS.to_string()),
            &PROCESSING_BUCKETS,
        )?
        .install_recorder()?;

    describe_counter!(FILES_PROCESSED_TOTAL, "Total files processed");
    describe_counter!(FILES_SUCCEEDED_TOTAL, "Total files succeeded");
    describe_counter!(FILES_FAILED_TOTAL, "Total files failed");
    describe_counter!(FILES_SKIPPED_TOTAL, "Total files skipped");
    describe_histogram!(FILE_PROCESSING_SECONDS, "Time to process a file");
    describe_counter!(POLL_ITERATIONS_FAILED_TOTAL, "Polling iterations that failed");
    describe_counter!(POLL_SUPPRESSED_TOTAL, "Polls skipped while the circuit was open");
    describe_counter!(ASSOCIATION_FAILURES_TOTAL, "Product associations that failed");
    describe_counter!(PERSISTENCE_FAILURES_TOTAL, "Ledger or dead-letter writes that failed");

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

// ============================================================================
// Observer
// ============================================================================

/// Records engine callbacks as Prometheus metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusObserver;

impl PollObserver for PrometheusObserver {
    fn item_completed(&self, outcome: &ProcessingOutcome) {
        counter!(FILES_PROCESSED_TOTAL).increment(1);
        match outcome {
            ProcessingOutcome::Success { .. } => counter!(FILES_SUCCEEDED_TOTAL).increment(1),
            ProcessingOutcome::Skipped { reason, .. } => {
                counter!(FILES_SKIPPED_TOTAL, "reason" => reason.as_str()).increment(1)
            }
            ProcessingOutcome::Failed { kind, .. } => {
                counter!(FILES_FAILED_TOTAL, "kind" => kind.as_str()).increment(1)
            }
        }
    }

    fn item_duration(&self, elapsed: Duration) {
        histogram!(FILE_PROCESSING_SECONDS).record(elapsed.as_secs_f64());
    }

    fn iteration_failed(&self, error: &EngineError) {
        counter!(POLL_ITERATIONS_FAILED_TOTAL, "kind" => error.kind().as_str()).increment(1);
    }

    fn poll_suppressed(&self, _retry_in: Duration) {
        counter!(POLL_SUPPRESSED_TOTAL).increment(1);
    }

    fn association_failed(&self, _name: &str, _error: &EngineError) {
        counter!(ASSOCIATION_FAILURES_TOTAL).increment(1);
    }

    fn persistence_failed(&self, _error: &EngineError) {
        counter!(PERSISTENCE_FAILURES_TOTAL).increment(1);
    }
}
