//! # Collaborator Contracts
//!
//! The engine reaches the outside world only through these traits. The
//! production implementations live in [`crate::azure_auth`],
//! [`crate::sharepoint`], [`crate::salsify`], [`crate::ledger`] and
//! [`crate::dead_letter`]; tests swap in in-memory fakes.
//!
//! ```text
//! ┌──────────────────────┐   acquire(scopes)        ┌────────────────────┐
//! │ TokenCache           │ ───────────────────────► │ CredentialProvider │
//! └──────────────────────┘                          └────────────────────┘
//! ┌──────────────────────┐   list_candidates()      ┌────────────────────┐
//! │ PollLoop             │ ───────────────────────► │ Discovery          │
//! │ TransferPipeline     │   download(id)           │ Collaborator       │
//! │                      │ ───────────────────────► └────────────────────┘
//! │                      │   upload / associate     ┌────────────────────┐
//! │                      │ ───────────────────────► │ Catalog            │
//! └──────────────────────┘                          │ Collaborator       │
//!                                                   └────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use relay_core::DiscoveredItem;
use serde::Deserialize;

use crate::dead_letter::DeadLetterRecord;
use crate::error::{EngineError, EngineResult};

/// Streamed file content, passed from download straight into upload.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<Bytes, EngineError>> + Send>>;

// =============================================================================
// Credentials
// =============================================================================

/// Raw answer of a token endpoint.
///
/// Either `access_token` is present, or `error`/`error_description`
/// explain why not.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,

    /// Lifetime in seconds. Some endpoints send this as a string.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<f64>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// A successful response, mostly for tests and fakes.
    pub fn granted(access_token: impl Into<String>, expires_in: f64) -> Self {
        TokenResponse {
            access_token: Some(access_token.into()),
            expires_in: Some(expires_in),
            ..Default::default()
        }
    }

    /// Best available diagnostic text when no token was issued.
    pub fn diagnostic(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "no access_token in response".to_string())
    }
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Seconds>::deserialize(deserializer)? {
        Some(Seconds::Number(n)) => Some(n),
        Some(Seconds::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Produces bearer tokens for a set of scopes.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Performs one token exchange. Transport failures are errors; a reply
    /// without a token is returned as-is for the cache to judge.
    async fn acquire(&self, scopes: &[String]) -> EngineResult<TokenResponse>;
}

// =============================================================================
// Remote Stores
// =============================================================================

/// The document store being watched.
#[async_trait]
pub trait DiscoveryCollaborator: Send + Sync {
    /// Lists the current candidate files.
    async fn list_candidates(&self) -> EngineResult<Vec<DiscoveredItem>>;

    /// Opens a content stream for one item.
    async fn download(&self, item_id: &str) -> EngineResult<ContentStream>;
}

/// The asset catalog receiving the files.
#[async_trait]
pub trait CatalogCollaborator: Send + Sync {
    /// Uploads one file and returns the catalog's asset id.
    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        content: ContentStream,
    ) -> EngineResult<String>;

    /// Links an uploaded asset to its product. Failure is non-fatal to callers.
    async fn associate(&self, product_code: &str, asset_id: &str) -> EngineResult<()>;
}

// =============================================================================
// Local Persistence
// =============================================================================

/// Durable storage behind the idempotency ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load(&self) -> EngineResult<BTreeSet<String>>;
    async fn save(&self, names: &BTreeSet<String>) -> EngineResult<()>;
}

/// Durable append-only storage behind the dead-letter sink.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn append(&self, record: &DeadLetterRecord) -> EngineResult<()>;
}
