//! # Poll Observer
//!
//! Counters and timings are reported through this trait instead of
//! process-wide globals. The daemon plugs in a Prometheus-backed observer;
//! tests plug in a recording one.

use std::time::Duration;

use relay_core::ProcessingOutcome;

use crate::error::EngineError;

// =============================================================================
// Observer Trait
// =============================================================================

/// Receives loop and pipeline events. Implementations must be cheap and
/// must not block; they are called from worker tasks.
pub trait PollObserver: Send + Sync {
    /// One item finished, whatever the outcome.
    fn item_completed(&self, outcome: &ProcessingOutcome);

    /// Wall time spent in the pipeline for one item.
    fn item_duration(&self, elapsed: Duration);

    /// Listing failed and the whole tick counted as one failure.
    fn iteration_failed(&self, error: &EngineError);

    /// The breaker suppressed a tick.
    fn poll_suppressed(&self, retry_in: Duration);

    /// Association failed after a successful upload.
    fn association_failed(&self, name: &str, error: &EngineError);

    /// A ledger or dead-letter write failed.
    fn persistence_failed(&self, error: &EngineError);
}

/// Observer that ignores everything.
pub struct NoOpObserver;

impl PollObserver for NoOpObserver {
    fn item_completed(&self, _outcome: &ProcessingOutcome) {}
    fn item_duration(&self, _elapsed: Duration) {}
    fn iteration_failed(&self, _error: &EngineError) {}
    fn poll_suppressed(&self, _retry_in: Duration) {}
    fn association_failed(&self, _name: &str, _error: &EngineError) {}
    fn persistence_failed(&self, _error: &EngineError) {}
}
