//! # Idempotency Ledger
//!
//! The set of file names already transferred. A name in the ledger is never
//! uploaded again.
//!
//! ## Claim / Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   worker ──► try_claim(name)                                            │
//! │                 │                                                       │
//! │     ┌───────────┼────────────────────┐                                  │
//! │     ▼           ▼                    ▼                                  │
//! │  Processed   InFlight          Claimed(guard)                           │
//! │  (skip)      (skip, another    name moved into in_flight                │
//! │              worker has it)          │                                  │
//! │                           ┌──────────┴──────────┐                       │
//! │                           ▼                     ▼                       │
//! │                    commit(guard)          guard dropped                 │
//! │                    in_flight → processed  in_flight -= name             │
//! │                    store.save(snapshot)   (retry next tick)             │
//! │                                                                         │
//! │  check-and-claim is one critical section: two workers holding the      │
//! │  same name in one batch cannot both pass it.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Saves are serialized by a separate async lock so snapshots reach the
//! store in the order they were taken. A failed save is logged and reported
//! to the observer; the in-memory set stays authoritative for the run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::collaborators::LedgerStore;
use crate::error::{EngineError, EngineResult};
use crate::observer::PollObserver;

#[derive(Debug, Default)]
struct LedgerState {
    processed: BTreeSet<String>,
    in_flight: BTreeSet<String>,
}

type SharedState = Arc<Mutex<LedgerState>>;

fn lock(state: &Mutex<LedgerState>) -> MutexGuard<'_, LedgerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Claims
// =============================================================================

/// Result of [`IdempotencyLedger::try_claim`].
#[derive(Debug)]
pub enum Claim {
    /// Already transferred in this or an earlier run.
    Processed,

    /// Another worker holds the same name right now.
    InFlight,

    /// The caller owns the name until it commits or drops the guard.
    Claimed(ClaimGuard),
}

/// Exclusive hold on one name. Dropping it without committing releases the name.
#[derive(Debug)]
pub struct ClaimGuard {
    name: String,
    state: SharedState,
}

impl ClaimGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        lock(&self.state).in_flight.remove(&self.name);
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// In-memory ledger backed by a [`LedgerStore`].
pub struct IdempotencyLedger {
    state: SharedState,
    store: Arc<dyn LedgerStore>,
    observer: Arc<dyn PollObserver>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl IdempotencyLedger {
    /// Loads the persisted names. A store failure starts the run empty.
    pub async fn load(store: Arc<dyn LedgerStore>, observer: Arc<dyn PollObserver>) -> Self {
        let processed = match store.load().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not load processed files, starting empty");
                observer.persistence_failed(&e);
                BTreeSet::new()
            }
        };

        info!(count = processed.len(), "Loaded processed files ledger");

        IdempotencyLedger {
            state: Arc::new(Mutex::new(LedgerState {
                processed,
                in_flight: BTreeSet::new(),
            })),
            store,
            observer,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.state).processed.contains(name)
    }

    pub fn len(&self) -> usize {
        lock(&self.state).processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically checks the name and, if free, reserves it for the caller.
    pub fn try_claim(&self, name: &str) -> Claim {
        let mut state = lock(&self.state);
        if state.processed.contains(name) {
            return Claim::Processed;
        }
        if !state.in_flight.insert(name.to_string()) {
            return Claim::InFlight;
        }
        Claim::Claimed(ClaimGuard {
            name: name.to_string(),
            state: self.state.clone(),
        })
    }

    /// Moves the claimed name into the processed set and persists the set.
    ///
    /// Never fails: a save error is logged and reported to the observer.
    pub async fn commit(&self, guard: ClaimGuard) {
        let _persist = self.persist_lock.lock().await;

        let snapshot = {
            let mut state = lock(&self.state);
            state.in_flight.remove(guard.name());
            state.processed.insert(guard.name().to_string());
            state.processed.clone()
        };
        drop(guard);

        match self.store.save(&snapshot).await {
            Ok(()) => debug!(count = snapshot.len(), "Processed files ledger saved"),
            Err(e) => {
                let e = match e {
                    EngineError::Persistence(_) => e,
                    other => EngineError::Persistence(other.to_string()),
                };
                error!(error = %e, "Failed to persist processed files ledger");
                self.observer.persistence_failed(&e);
            }
        }
    }

    /// Sorted copy of the processed names.
    pub fn snapshot(&self) -> BTreeSet<String> {
        lock(&self.state).processed.clone()
    }
}

// =============================================================================
// JSON File Store
// =============================================================================

/// Persists the ledger as a sorted, pretty-printed JSON array.
pub struct JsonFileLedgerStore {
    path: PathBuf,
}

impl JsonFileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileLedgerStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LedgerStore for JsonFileLedgerStore {
    async fn load(&self) -> EngineResult<BTreeSet<String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No processed files ledger yet");
                return Ok(BTreeSet::new());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(BTreeSet::new());
        }

        match serde_json::from_str::<Vec<String>>(&contents) {
            Ok(names) => Ok(names.into_iter().collect()),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Processed files ledger is corrupt, starting empty");
                Ok(BTreeSet::new())
            }
        }
    }

    async fn save(&self, names: &BTreeSet<String>) -> EngineResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(names)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}
