//! # Poll Loop
//!
//! The top-level scheduler. One task owns the loop, the breaker, and the
//! tick-level bookkeeping.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   start ──► POLLING ─────────────────────────────────────┐              │
//! │               │                                          │              │
//! │               │ breaker.should_poll(now)?                │              │
//! │               │   no  → sleep min(interval, reset)       │              │
//! │               │   yes → list_candidates()                │              │
//! │               │           err   → 1 breaker failure      │              │
//! │               │                   + 1 dead letter        │              │
//! │               │           empty → "No new files found"   │              │
//! │               │           items → Dispatcher::run        │              │
//! │               │                   Success → reset breaker│              │
//! │               │                   Failed  → failure      │              │
//! │               │                             + dead letter│              │
//! │               ▼                                          │              │
//! │             IDLE ── sleep(interval) ─────────────────────┘              │
//! │               │                                                         │
//! │               │ shutdown signal (checked before each tick and while     │
//! │               ▼ sleeping; an in-flight tick runs to completion)         │
//! │             STOPPED                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use relay_core::{now_epoch_secs, FailureKind, ProcessingOutcome};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info};

use crate::breaker::{BreakerPhase, CircuitBreaker};
use crate::collaborators::DiscoveryCollaborator;
use crate::config::RelayConfig;
use crate::dead_letter::DeadLetterSink;
use crate::dispatcher::{Dispatcher, ItemPipeline};
use crate::observer::PollObserver;

// =============================================================================
// Configuration
// =============================================================================

/// Scheduling settings for a [`PollLoop`].
#[derive(Debug, Clone)]
pub struct PollLoopConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub circuit_threshold: u32,
    pub circuit_reset: Duration,
}

impl Default for PollLoopConfig {
    fn default() -> Self {
        PollLoopConfig {
            poll_interval: Duration::from_secs(300),
            batch_size: 10,
            circuit_threshold: 5,
            circuit_reset: Duration::from_secs(60),
        }
    }
}

impl From<&RelayConfig> for PollLoopConfig {
    fn from(config: &RelayConfig) -> Self {
        PollLoopConfig {
            poll_interval: config.poll_interval(),
            batch_size: config.poll.batch_size,
            circuit_threshold: config.poll.circuit_threshold,
            circuit_reset: config.circuit_reset(),
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Snapshot of the loop for external queries.
#[derive(Debug, Clone, Serialize)]
pub struct PollStatus {
    pub running: bool,
    pub ticks: u64,
    pub ticks_suppressed: u64,
    pub iterations_failed: u64,
    pub files_succeeded: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub breaker: BreakerPhase,
    pub consecutive_failures: u32,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for PollStatus {
    fn default() -> Self {
        PollStatus {
            running: false,
            ticks: 0,
            ticks_suppressed: 0,
            iterations_failed: 0,
            files_succeeded: 0,
            files_skipped: 0,
            files_failed: 0,
            breaker: BreakerPhase::Closed,
            consecutive_failures: 0,
            last_tick_at: None,
            last_error: None,
        }
    }
}

/// What one call to [`PollLoop::poll_once`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The breaker is open; nothing was listed.
    Suppressed { retry_in: Duration },

    /// Listing failed; counted as one breaker failure.
    DiscoveryFailed { error: String },

    /// Listing returned nothing.
    Idle,

    /// A batch was dispatched.
    Dispatched {
        succeeded: usize,
        skipped: usize,
        failed: usize,
    },
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for controlling a running [`PollLoop`].
#[derive(Clone)]
pub struct PollLoopHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    status: Arc<RwLock<PollStatus>>,
}

impl PollLoopHandle {
    /// Requests cooperative shutdown. An in-flight tick finishes first.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub async fn status(&self) -> PollStatus {
        self.status.read().await.clone()
    }
}

// =============================================================================
// Poll Loop
// =============================================================================

/// Periodically lists, dispatches and records.
pub struct PollLoop {
    config: PollLoopConfig,
    breaker: CircuitBreaker,
    dispatcher: Dispatcher,
    discovery: Arc<dyn DiscoveryCollaborator>,
    pipeline: Arc<dyn ItemPipeline>,
    dead_letters: DeadLetterSink,
    observer: Arc<dyn PollObserver>,
    status: Arc<RwLock<PollStatus>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl PollLoop {
    /// Creates a new poll loop and returns a handle.
    pub fn new(
        config: PollLoopConfig,
        discovery: Arc<dyn DiscoveryCollaborator>,
        pipeline: Arc<dyn ItemPipeline>,
        dead_letters: DeadLetterSink,
        observer: Arc<dyn PollObserver>,
    ) -> (Self, PollLoopHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = Arc::new(RwLock::new(PollStatus::default()));

        let poll_loop = PollLoop {
            breaker: CircuitBreaker::new(config.circuit_threshold, config.circuit_reset),
            dispatcher: Dispatcher::new(config.batch_size),
            config,
            discovery,
            pipeline,
            dead_letters,
            observer,
            status: status.clone(),
            shutdown_rx,
        };

        let handle = PollLoopHandle {
            shutdown_tx: Arc::new(shutdown_tx),
            status,
        };

        (poll_loop, handle)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs until shutdown is requested or every handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.dispatcher.concurrency(),
            "Poll loop starting"
        );
        self.status.write().await.running = true;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let tick = AssertUnwindSafe(self.poll_once()).catch_unwind().await;
            let wait = match tick {
                Ok(TickOutcome::Suppressed { retry_in }) => retry_in.min(self.config.poll_interval),
                Ok(_) => self.config.poll_interval,
                Err(_) => {
                    error!("Polling iteration panicked");
                    self.breaker.record_failure(now_epoch_secs());
                    self.dead_letters
                        .record("polling iteration panicked", FailureKind::Internal, None)
                        .await;
                    self.publish_breaker(Some("polling iteration panicked".into())).await;
                    self.config.poll_interval
                }
            };

            if self.sleep_or_shutdown(wait).await {
                break;
            }
        }

        self.status.write().await.running = false;
        info!("Poll loop stopped");
    }

    /// Runs exactly one tick, honouring the breaker.
    pub async fn poll_once(&mut self) -> TickOutcome {
        let now = now_epoch_secs();
        self.status.write().await.ticks += 1;

        if !self.breaker.should_poll(now) {
            let retry_in = self.breaker.time_until_reset(now);
            info!(
                retry_in_seconds = retry_in.as_secs_f64(),
                "Circuit open, skipping poll"
            );
            self.observer.poll_suppressed(retry_in);
            {
                let mut status = self.status.write().await;
                status.ticks_suppressed += 1;
                status.breaker = self.breaker.phase(now);
            }
            return TickOutcome::Suppressed { retry_in };
        }

        let items = match self.discovery.list_candidates().await {
            Ok(items) => items,
            Err(e) => {
                let e = e.into_discovery();
                error!(error = %e, "Polling iteration failed");
                self.breaker.record_failure(now_epoch_secs());
                self.observer.iteration_failed(&e);
                self.dead_letters.record(&e.to_string(), e.kind(), None).await;
                self.status.write().await.iterations_failed += 1;
                self.publish_breaker(Some(e.to_string())).await;
                return TickOutcome::DiscoveryFailed {
                    error: e.to_string(),
                };
            }
        };

        if items.is_empty() {
            info!("No new files found");
            self.publish_breaker(None).await;
            return TickOutcome::Idle;
        }

        // Unprocessed names go first so truncation never starves them.
        let (mut items, settled): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|item| !self.pipeline.is_settled(item));
        items.extend(settled);

        debug!(count = items.len(), "Dispatching batch");
        let outcomes = self
            .dispatcher
            .run(items, self.pipeline.clone())
            .await;

        let (mut succeeded, mut skipped, mut failed) = (0, 0, 0);
        let mut last_error = None;

        for outcome in &outcomes {
            self.observer.item_completed(outcome);
            match outcome {
                ProcessingOutcome::Success {
                    asset_id,
                    product_code,
                    name,
                } => {
                    info!(
                        name = %name,
                        asset_id = %asset_id,
                        product_code = %product_code,
                        "Processed file"
                    );
                    self.breaker.record_success();
                    succeeded += 1;
                }
                ProcessingOutcome::Skipped { reason, name } => {
                    info!(name = %name, reason = %reason, "Skipped file");
                    skipped += 1;
                }
                ProcessingOutcome::Failed { error, kind, name } => {
                    error!(name = %name, kind = %kind, error = %error, "File processing failed");
                    self.breaker.record_failure(now_epoch_secs());
                    self.dead_letters.record(error, *kind, Some(name.as_str())).await;
                    last_error = Some(error.clone());
                    failed += 1;
                }
            }
        }

        {
            let mut status = self.status.write().await;
            status.files_succeeded += succeeded as u64;
            status.files_skipped += skipped as u64;
            status.files_failed += failed as u64;
        }
        self.publish_breaker(last_error).await;

        TickOutcome::Dispatched {
            succeeded,
            skipped,
            failed,
        }
    }

    /// Returns true if shutdown was requested before `wait` elapsed.
    async fn sleep_or_shutdown(&mut self, wait: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(wait) => false,
            changed = self.shutdown_rx.changed() => {
                // A closed channel means every handle is gone.
                changed.is_err() || *self.shutdown_rx.borrow()
            }
        }
    }

    async fn publish_breaker(&self, last_error: Option<String>) {
        let now = now_epoch_secs();
        let mut status = self.status.write().await;
        status.breaker = self.breaker.phase(now);
        status.consecutive_failures = self.breaker.consecutive_failures();
        status.last_tick_at = Some(Utc::now());
        if last_error.is_some() {
            status.last_error = last_error;
        }
    }
}
