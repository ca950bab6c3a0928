//! # Engine Error Types
//!
//! Error types for the polling engine and its collaborators.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Tick-level     │  │   Item-level    │  │     Swallowed           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Auth           │  │  Validation     │  │  Association            │ │
//! │  │  Discovery      │  │  Transfer       │  │  Persistence            │ │
//! │  │                 │  │  Http           │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Tick-level  → one breaker failure + one dead-letter record            │
//! │  Item-level  → Failed outcome (never escapes the dispatcher)           │
//! │  Swallowed   → logged and reported to the observer, never propagated   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use relay_core::{FailureKind, ValidationError};
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering every failure the poll loop can observe.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    // =========================================================================
    // Tick-level Errors
    // =========================================================================
    /// The credential provider could not produce a token.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Listing or folder resolution failed.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    // =========================================================================
    // Item-level Errors
    // =========================================================================
    /// Malformed filename.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Download or upload failed outside of an HTTP status error.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// A remote endpoint answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// Network-level failure (connect, timeout, TLS, body read).
    #[error("Network error: {0}")]
    Network(String),

    // =========================================================================
    // Swallowed Errors
    // =========================================================================
    /// Linking an uploaded asset to its product failed.
    #[error("Association failed: {0}")]
    Association(String),

    /// Ledger or dead-letter write failed.
    #[error("Persistence failed: {0}")]
    Persistence(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Unexpected internal error (e.g. a worker panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => EngineError::Http {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                body: err.to_string(),
            },
            None => EngineError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Transfer(format!("Malformed JSON: {}", err))
    }
}

impl From<url::ParseError> for EngineError {
    fn from(err: url::ParseError) -> Self {
        EngineError::Config(format!("Invalid URL: {}", err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EngineError {
    /// Maps the error onto the category recorded in dead-letter lines.
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::Config(_) => FailureKind::Config,
            EngineError::Auth(_) => FailureKind::Auth,
            EngineError::Discovery(_) => FailureKind::Discovery,
            EngineError::Validation(_) => FailureKind::Validation,
            EngineError::Transfer(_) | EngineError::Http { .. } | EngineError::Network(_) => {
                FailureKind::Transfer
            }
            EngineError::Association(_) => FailureKind::Association,
            EngineError::Persistence(_) => FailureKind::Persistence,
            EngineError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Returns true if the HTTP client may retry the call that produced this error.
    ///
    /// ## Retryable Errors
    /// - Network failures (connect, timeout)
    /// - 429 Too Many Requests
    /// - 500, 502, 503, 504
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Network(_) => true,
            EngineError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Re-labels a collaborator error as a discovery failure, keeping the
    /// auth category intact.
    pub fn into_discovery(self) -> Self {
        match self {
            EngineError::Auth(_) | EngineError::Discovery(_) => self,
            other => EngineError::Discovery(other.to_string()),
        }
    }
}
