//! # Dead-Letter Sink
//!
//! Append-only record of failures kept for offline inspection.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PollLoop ──► DeadLetterSink::record(error, name) ──► DeadLetterStore   │
//! │                         │                                    │          │
//! │                         │                     Err(Persistence)          │
//! │                         ▼                                    │          │
//! │                 never returns an error ◄──── logged + observer          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## File Format
//! One JSON object per line:
//! ```text
//! {"id":"…","error":"HTTP 503 …","kind":"transfer","name":"A_B_C.jpg","time":1700000000.5,"recorded_at":"2023-11-14T22:13:20.500Z"}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use relay_core::{now_epoch_secs, FailureKind};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::error;
use uuid::Uuid;

use crate::collaborators::DeadLetterStore;
use crate::error::{EngineError, EngineResult};
use crate::observer::PollObserver;

// =============================================================================
// Record
// =============================================================================

/// One dead-lettered failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: Uuid,
    pub error: String,
    pub kind: FailureKind,

    /// Item name; absent for tick-level failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Seconds since the Unix epoch.
    pub time: f64,

    pub recorded_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(error: impl Into<String>, kind: FailureKind, name: Option<String>, time: f64) -> Self {
        let millis = (time * 1000.0) as i64;
        DeadLetterRecord {
            id: Uuid::new_v4(),
            error: error.into(),
            kind,
            name,
            time,
            recorded_at: Utc
                .timestamp_millis_opt(millis)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Front of the dead-letter store that never fails its caller.
pub struct DeadLetterSink {
    store: Arc<dyn DeadLetterStore>,
    observer: Arc<dyn PollObserver>,
}

impl DeadLetterSink {
    pub fn new(store: Arc<dyn DeadLetterStore>, observer: Arc<dyn PollObserver>) -> Self {
        DeadLetterSink { store, observer }
    }

    /// Appends one record. Write failures are logged and reported, never returned.
    pub async fn append(&self, record: DeadLetterRecord) {
        if let Err(e) = self.store.append(&record).await {
            let e = match e {
                EngineError::Persistence(_) => e,
                other => EngineError::Persistence(other.to_string()),
            };
            error!(error = %e, record_error = %record.error, "Failed to write dead letter");
            self.observer.persistence_failed(&e);
        }
    }

    /// Builds a record stamped now and appends it.
    pub async fn record(&self, error: &str, kind: FailureKind, name: Option<&str>) {
        let record = DeadLetterRecord::new(error, kind, name.map(str::to_string), now_epoch_secs());
        self.append(record).await;
    }
}

// =============================================================================
// JSON Lines Store
// =============================================================================

/// Appends records to a local `.jsonl` file.
pub struct JsonLinesDeadLetterStore {
    path: PathBuf,
}

impl JsonLinesDeadLetterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonLinesDeadLetterStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeadLetterStore for JsonLinesDeadLetterStore {
    async fn append(&self, record: &DeadLetterRecord) -> EngineResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
