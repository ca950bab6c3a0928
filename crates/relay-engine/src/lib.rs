//! # relay-engine: Polling Orchestration Engine for Asset Relay
//!
//! Discovers new files in a SharePoint folder, transfers them to Salsify,
//! and keeps enough local state to never send the same file twice.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Engine Architecture                             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    PollLoop (Main Orchestrator)                  │  │
//! │  │                                                                  │  │
//! │  │  One tokio task. Owns the CircuitBreaker. Ticks every interval,  │  │
//! │  │  stops on PollLoopHandle::shutdown().                            │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Discovery      │  │ Dispatcher     │  │ DeadLetterSink         │    │
//! │  │ Collaborator   │  │                │  │                        │    │
//! │  │ list_candidates│  │ JoinSet fan-out│  │ JSON lines, one per    │    │
//! │  │ (SharePoint)   │  │ panic isolated │  │ failed item or tick    │    │
//! │  └────────────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │                              ▼                                          │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  TransferPipeline (per item)                                     │  │
//! │  │  claim ─► extension ─► parse name ─► download ─► upload ─►       │  │
//! │  │  associate ─► commit                                             │  │
//! │  │                                                                  │  │
//! │  │  IdempotencyLedger     TokenCache          CatalogCollaborator   │  │
//! │  │  (processed names)     (Azure AD token)    (Salsify)             │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  OBSERVER CALLBACKS (to the daemon's metrics):                         │
//! │  • item_completed / item_duration                                      │
//! │  • iteration_failed / poll_suppressed                                  │
//! │  • association_failed / persistence_failed                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Orchestration
//! - [`poll_loop`] - `PollLoop` scheduler and its handle
//! - [`breaker`] - Consecutive-failure circuit breaker
//! - [`dispatcher`] - Bounded per-tick fan-out
//! - [`pipeline`] - The per-item transfer
//!
//! ### State
//! - [`token_cache`] - Cached Azure AD credential
//! - [`ledger`] - Processed-name ledger and its JSON store
//! - [`dead_letter`] - Failure records and their JSON-lines store
//!
//! ### Collaborators
//! - [`collaborators`] - Traits for everything remote or persistent
//! - [`azure_auth`] - Client-credentials token provider
//! - [`sharepoint`] - Microsoft Graph folder discovery
//! - [`salsify`] - Salsify asset upload and product association
//! - [`http`] - Shared client, status checks, retry policy
//!
//! ### Ambient
//! - [`config`] - `RelayConfig` (defaults, TOML, environment)
//! - [`error`] - `EngineError`
//! - [`observer`] - `PollObserver` callbacks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_engine::{PollLoop, PollLoopConfig, RelayConfig};
//!
//! let config = RelayConfig::load(None)?;
//! let (poll_loop, handle) = PollLoop::new(
//!     PollLoopConfig::from(&config),
//!     discovery,
//!     pipeline,
//!     dead_letters,
//!     observer,
//! );
//! tokio::spawn(poll_loop.run());
//!
//! // Later
//! handle.shutdown();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Orchestration
pub mod breaker;
pub mod dispatcher;
pub mod pipeline;
pub mod poll_loop;

// State
pub mod dead_letter;
pub mod ledger;
pub mod token_cache;

// Collaborators
pub mod azure_auth;
pub mod collaborators;
pub mod http;
pub mod salsify;
pub mod sharepoint;

// Ambient
pub mod config;
pub mod error;
pub mod observer;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

// Orchestration
pub use breaker::{BreakerPhase, CircuitBreaker};
pub use dispatcher::{Dispatcher, ItemPipeline};
pub use pipeline::TransferPipeline;
pub use poll_loop::{PollLoop, PollLoopConfig, PollLoopHandle, PollStatus, TickOutcome};

// State
pub use dead_letter::{DeadLetterRecord, DeadLetterSink, JsonLinesDeadLetterStore};
pub use ledger::{Claim, ClaimGuard, IdempotencyLedger, JsonFileLedgerStore};
pub use token_cache::{Credential, TokenCache, TokenCacheConfig};

// Collaborators
pub use azure_auth::AzureCredentialProvider;
pub use collaborators::{
    CatalogCollaborator, ContentStream, CredentialProvider, DeadLetterStore,
    DiscoveryCollaborator, LedgerStore, TokenResponse,
};
pub use http::{build_client, RetryPolicy};
pub use salsify::SalsifyCatalog;
pub use sharepoint::SharePointDiscovery;

// Ambient
pub use config::{AssociationMode, AuthScheme, LogFormat, RelayConfig};
pub use error::{EngineError, EngineResult};
pub use observer::{NoOpObserver, PollObserver};
