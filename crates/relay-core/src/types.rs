//! # Domain Types
//!
//! The values that flow through one poll tick.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         One Tick                                        │
//! │                                                                         │
//! │  listCandidates()  ──►  DiscoveredItem ×N   (transient, never stored)  │
//! │                               │                                         │
//! │                               ▼  pipeline (one per item)                │
//! │                       ProcessingOutcome ×N                              │
//! │                               │                                         │
//! │            ┌──────────────────┼──────────────────┐                     │
//! │            ▼                  ▼                  ▼                      │
//! │        Success            Skipped             Failed                    │
//! │     breaker reset       logged only     breaker failure +              │
//! │     success counter                     dead-letter record             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Discovered Item
// =============================================================================

/// A file found in the remote document store during one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    /// Remote item identifier (used for download).
    pub id: String,

    /// File name including extension. Also the ledger key.
    pub name: String,

    /// Size in bytes as reported by the store.
    #[serde(default)]
    pub size_bytes: u64,

    /// Last modification time as reported by the store.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl DiscoveredItem {
    /// Creates an item with only an id and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        DiscoveredItem {
            id: id.into(),
            name: name.into(),
            size_bytes: 0,
            last_modified: None,
        }
    }
}

// =============================================================================
// Outcome Kinds
// =============================================================================

/// Why an item was not transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The name is already in the ledger.
    AlreadyProcessed,

    /// The extension is not in the allow-list.
    InvalidExtension,

    /// Another worker in the same tick is transferring the same name.
    InFlight,
}

impl SkipReason {
    /// Stable string form used in logs and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyProcessed => "already_processed",
            SkipReason::InvalidExtension => "invalid_extension",
            SkipReason::InFlight => "in_flight",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a failure, carried into dead-letter records and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    Discovery,
    Validation,
    Transfer,
    Association,
    Persistence,
    Config,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Auth => "auth",
            FailureKind::Discovery => "discovery",
            FailureKind::Validation => "validation",
            FailureKind::Transfer => "transfer",
            FailureKind::Association => "association",
            FailureKind::Persistence => "persistence",
            FailureKind::Config => "config",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Processing Outcome
// =============================================================================

/// Result of running the transfer pipeline for one item.
///
/// Serialized with a `status` tag so log lines read
/// `{"status":"skipped","reason":"already_processed","name":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// Uploaded, committed to the ledger.
    Success {
        asset_id: String,
        product_code: String,
        name: String,
    },

    /// Deliberately not transferred.
    Skipped { reason: SkipReason, name: String },

    /// Something went wrong; the item will be listed again next tick.
    Failed {
        error: String,
        kind: FailureKind,
        name: String,
    },
}

impl ProcessingOutcome {
    /// Name of the item this outcome belongs to.
    pub fn name(&self) -> &str {
        match self {
            ProcessingOutcome::Success { name, .. }
            | ProcessingOutcome::Skipped { name, .. }
            | ProcessingOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessingOutcome::Failed { .. })
    }

    /// Skip reason, if this is a `Skipped` outcome.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            ProcessingOutcome::Skipped { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Short status label (`success`, `skipped`, `failed`).
    pub fn status(&self) -> &'static str {
        match self {
            ProcessingOutcome::Success { .. } => "success",
            ProcessingOutcome::Skipped { .. } => "skipped",
            ProcessingOutcome::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_serializes_with_status_tag() {
        let outcome = ProcessingOutcome::Skipped {
            reason: SkipReason::AlreadyProcessed,
            name: "ABC_FRONT_01.jpg".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "already_processed");
        assert_eq!(json["name"], "ABC_FRONT_01.jpg");
    }

    #[test]
    fn test_failed_carries_kind() {
        let outcome = ProcessingOutcome::Failed {
            error: "boom".into(),
            kind: FailureKind::Transfer,
            name: "x.jpg".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "transfer");
        assert!(outcome.is_failed());
        assert_eq!(outcome.status(), "failed");
        assert_eq!(outcome.name(), "x.jpg");
    }

    #[test]
    fn test_skip_reason_display_matches_serde() {
        for reason in [
            SkipReason::AlreadyProcessed,
            SkipReason::InvalidExtension,
            SkipReason::InFlight,
        ] {
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json, reason.to_string());
        }
    }

    #[test]
    fn test_item_defaults_when_deserializing() {
        let item: DiscoveredItem =
            serde_json::from_str(r#"{"id":"01ABC","name":"A_B_C.png"}"#).unwrap();
        assert_eq!(item.size_bytes, 0);
        assert!(item.last_modified.is_none());
    }
}
