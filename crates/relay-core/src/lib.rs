//! # relay-core: Pure Domain Types for Asset Relay
//!
//! Asset Relay watches a SharePoint folder, transfers every new image to the
//! Salsify asset catalog, and remembers what it already sent. This crate holds
//! the parts of that job that need no I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Asset Relay Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  relay-daemon (binary)                          │   │
//! │  │    config ──► wiring ──► /health /metrics /status ──► signals   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    relay-engine                                 │   │
//! │  │    PollLoop ─► Dispatcher ─► TransferPipeline ─► Ledger        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ relay-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │ filename  │  │   clock   │                  │   │
//! │  │   │  Item     │  │ AssetName │  │ epoch now │                  │   │
//! │  │   │  Outcome  │  │ Extension │  │           │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO NETWORK • NO FILE SYSTEM • PURE FUNCTIONS                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `DiscoveredItem`, `ProcessingOutcome`, skip/failure kinds
//! - [`filename`] - `PRODUCTCODE_TYPE_VERSION.ext` parsing and the extension allow-list
//! - [`clock`] - wall-clock seconds since the Unix epoch
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use relay_core::filename::{AssetName, ExtensionPolicy};
//!
//! let policy = ExtensionPolicy::default();
//! assert!(policy.allows("ABC123_FRONT_01.JPG"));
//!
//! let name = AssetName::parse("ABC123_FRONT_01.jpg").unwrap();
//! assert_eq!(name.product_code, "ABC123");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod filename;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::now_epoch_secs;
pub use error::ValidationError;
pub use filename::{content_type_for, AssetName, ExtensionPolicy, DEFAULT_ALLOWED_EXTENSIONS};
pub use types::{DiscoveredItem, FailureKind, ProcessingOutcome, SkipReason};
