//! # Error Types
//!
//! Domain-specific error types for relay-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  relay-core errors (this file)                                         │
//! │  └── ValidationError  - Malformed filenames (data-quality signal)      │
//! │                                                                         │
//! │  relay-engine errors (separate crate)                                  │
//! │  └── EngineError      - Auth, discovery, transfer, persistence...      │
//! │                                                                         │
//! │  Flow: ValidationError → EngineError::Validation → Failed outcome      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Input validation errors.
///
/// A validation error never aborts a poll; the pipeline turns it into a
/// `Failed` outcome so the bad file shows up in the dead-letter log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The filename stem does not split into `PRODUCTCODE_TYPE_VERSION`.
    #[error("Filename '{name}' must be PRODUCTCODE_TYPE_VERSION.ext (found {parts} part(s))")]
    MalformedFilename { name: String, parts: usize },

    /// The extension allow-list is empty.
    #[error("At least one allowed extension is required")]
    EmptyAllowList,
}
