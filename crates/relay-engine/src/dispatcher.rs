//! # Dispatcher
//!
//! Fans one tick's batch out to concurrent pipeline tasks and joins them.
//!
//! ## Fan-out / Fan-in
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  items[0..N]  ──► truncate to `concurrency` (rest re-listed next tick) │
//! │                                                                         │
//! │        ┌──────────────┬──────────────┬──────────────┐                  │
//! │        ▼              ▼              ▼              ▼                   │
//! │   ┌─────────┐    ┌─────────┐    ┌─────────┐    ┌─────────┐             │
//! │   │ task 1  │    │ task 2  │    │ task 3  │    │ task k  │  JoinSet    │
//! │   │ process │    │ process │    │ PANIC   │    │ process │             │
//! │   └────┬────┘    └────┬────┘    └────┬────┘    └────┬────┘             │
//! │        │              │       catch_unwind          │                   │
//! │        │              │        → Failed             │                   │
//! │        └──────────────┴──────────────┴──────────────┘                   │
//! │                               ▼                                         │
//! │            Vec<ProcessingOutcome>  (completion order)                   │
//! │                                                                         │
//! │  run() returns only after every task has finished.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use relay_core::{DiscoveredItem, FailureKind, ProcessingOutcome};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Per-item work run by each dispatched task.
#[async_trait]
pub trait ItemPipeline: Send + Sync {
    /// Must convert every error into an outcome.
    async fn process(&self, item: &DiscoveredItem) -> ProcessingOutcome;

    /// True when `process` would only skip the item as already handled.
    /// Used to order a batch; `process` still makes the final decision.
    fn is_settled(&self, _item: &DiscoveredItem) -> bool {
        false
    }
}

/// Bounded fan-out over one batch.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    concurrency: usize,
}

impl Dispatcher {
    /// A zero concurrency is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Dispatcher {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs the pipeline over at most `concurrency` items and returns one
    /// outcome per dispatched item, in completion order.
    pub async fn run(
        &self,
        mut items: Vec<DiscoveredItem>,
        pipeline: Arc<dyn ItemPipeline>,
    ) -> Vec<ProcessingOutcome> {
        if items.len() > self.concurrency {
            debug!(
                discovered = items.len(),
                dispatched = self.concurrency,
                "Deferring excess items to the next tick"
            );
            items.truncate(self.concurrency);
        }

        let mut pending: Vec<String> = items.iter().map(|item| item.name.clone()).collect();
        let mut tasks = JoinSet::new();

        for item in items {
            let pipeline = pipeline.clone();
            tasks.spawn(async move {
                let result = AssertUnwindSafe(pipeline.process(&item)).catch_unwind().await;
                match result {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(name = %item.name, error = %message, "Pipeline panicked");
                        ProcessingOutcome::Failed {
                            error: format!("pipeline panicked: {}", message),
                            kind: FailureKind::Internal,
                            name: item.name,
                        }
                    }
                }
            });
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Some(pos) = pending.iter().position(|n| n == outcome.name()) {
                        pending.swap_remove(pos);
                    }
                    outcomes.push(outcome);
                }
                Err(e) => error!(error = %e, "Pipeline task did not complete"),
            }
        }

        // Tasks cancelled before reporting still owe one outcome each.
        for name in pending {
            outcomes.push(ProcessingOutcome::Failed {
                error: "pipeline task cancelled".to_string(),
                kind: FailureKind::Internal,
                name,
            });
        }

        outcomes
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use relay_core::SkipReason;

    /// Tracks how many `process` calls overlap.
    #[derive(Default)]
    struct ProbePipeline {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ItemPipeline for ProbePipeline {
        async fn process(&self, item: &DiscoveredItem) -> ProcessingOutcome {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            match item.name.as_str() {
                "boom" => panic!("exploded on {}", item.name),
                "skip" => ProcessingOutcome::Skipped {
                    reason: SkipReason::InvalidExtension,
                    name: item.name.clone(),
                },
                _ => ProcessingOutcome::Success {
                    asset_id: format!("asset-{}", item.id),
                    product_code: "P".into(),
                    name: item.name.clone(),
                },
            }
        }
    }

    fn items(names: &[&str]) -> Vec<DiscoveredItem> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| DiscoveredItem::new(i.to_string(), *name))
            .collect()
    }

    #[tokio::test]
    async fn test_one_outcome_per_item() {
        let pipeline = Arc::new(ProbePipeline::default());
        let outcomes = Dispatcher::new(10)
            .run(items(&["a", "skip", "c"]), pipeline)
            .await;

        assert_eq!(outcomes.len(), 3);
        let mut names: Vec<&str> = outcomes.iter().map(|o| o.name()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "c", "skip"]);
    }

    #[tokio::test]
    async fn test_batch_truncated_to_concurrency() {
        let pipeline = Arc::new(ProbePipeline::default());
        let outcomes = Dispatcher::new(2)
            .run(items(&["a", "b", "c", "d"]), pipeline.clone())
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(pipeline.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_items_run_in_parallel() {
        let pipeline = Arc::new(ProbePipeline::default());
        Dispatcher::new(4)
            .run(items(&["a", "b", "c", "d"]), pipeline.clone())
            .await;
        assert!(pipeline.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let pipeline = Arc::new(ProbePipeline::default());
        let outcomes = Dispatcher::new(10)
            .run(items(&["a", "boom", "c"]), pipeline)
            .await;

        assert_eq!(outcomes.len(), 3);
        let failed: Vec<&ProcessingOutcome> = outcomes.iter().filter(|o| o.is_failed()).collect();
        assert_eq!(failed.len(), 1);
        match failed[0] {
            ProcessingOutcome::Failed { error, kind, name } => {
                assert_eq!(name, "boom");
                assert_eq!(*kind, FailureKind::Internal);
                assert!(error.contains("exploded on boom"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcomes = Dispatcher::new(3)
            .run(Vec::new(), Arc::new(ProbePipeline::default()))
            .await;
        assert!(outcomes.is_empty());
    }
}
