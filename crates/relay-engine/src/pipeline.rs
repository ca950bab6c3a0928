//! # Transfer Pipeline
//!
//! What each dispatched task does with one discovered file.
//!
//! ## Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. ledger.try_claim(name)       Processed → Skipped{already_processed}│
//! │                                  InFlight  → Skipped{in_flight}        │
//! │  2. extension allow-list         miss      → Skipped{invalid_extension}│
//! │  3. AssetName::parse(name)       error     → Failed{validation}        │
//! │  4. discovery.download(id)                                             │
//! │       └─► catalog.upload(stream) error     → Failed{transfer|auth}     │
//! │  5. catalog.associate(code, id)  error     → logged, observer notified │
//! │  6. ledger.commit(claim)         error     → logged, observer notified │
//! │                                                                         │
//! │  ──► Success{asset_id, product_code, name}                             │
//! │                                                                         │
//! │  Any early return drops the claim, releasing the name for a later tick.│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use relay_core::{
    content_type_for, AssetName, DiscoveredItem, ExtensionPolicy, ProcessingOutcome, SkipReason,
};
use tracing::{debug, warn};

use crate::collaborators::{CatalogCollaborator, DiscoveryCollaborator};
use crate::dispatcher::ItemPipeline;
use crate::error::EngineError;
use crate::ledger::{Claim, IdempotencyLedger};
use crate::observer::PollObserver;

/// The SharePoint to Salsify transfer for one item.
pub struct TransferPipeline {
    ledger: Arc<IdempotencyLedger>,
    discovery: Arc<dyn DiscoveryCollaborator>,
    catalog: Arc<dyn CatalogCollaborator>,
    extensions: ExtensionPolicy,
    observer: Arc<dyn PollObserver>,
}

impl TransferPipeline {
    pub fn new(
        ledger: Arc<IdempotencyLedger>,
        discovery: Arc<dyn DiscoveryCollaborator>,
        catalog: Arc<dyn CatalogCollaborator>,
        extensions: ExtensionPolicy,
        observer: Arc<dyn PollObserver>,
    ) -> Self {
        TransferPipeline {
            ledger,
            discovery,
            catalog,
            extensions,
            observer,
        }
    }

    async fn transfer(&self, item: &DiscoveredItem) -> ProcessingOutcome {
        let name = item.name.as_str();

        let claim = match self.ledger.try_claim(name) {
            Claim::Processed => return skipped(SkipReason::AlreadyProcessed, name),
            Claim::InFlight => return skipped(SkipReason::InFlight, name),
            Claim::Claimed(claim) => claim,
        };

        if !self.extensions.allows(name) {
            return skipped(SkipReason::InvalidExtension, name);
        }

        let asset_name = match AssetName::parse(name) {
            Ok(parsed) => parsed,
            Err(e) => return failed(e.into(), name),
        };

        let asset_id = match self.upload(item).await {
            Ok(id) => id,
            Err(e) => return failed(e, name),
        };

        if let Err(e) = self
            .catalog
            .associate(&asset_name.product_code, &asset_id)
            .await
        {
            let e = match e {
                EngineError::Association(_) => e,
                other => EngineError::Association(other.to_string()),
            };
            warn!(
                name,
                asset_id = %asset_id,
                product_code = %asset_name.product_code,
                error = %e,
                "Association failed"
            );
            self.observer.association_failed(name, &e);
        }

        self.ledger.commit(claim).await;

        ProcessingOutcome::Success {
            asset_id,
            product_code: asset_name.product_code,
            name: name.to_string(),
        }
    }

    async fn upload(&self, item: &DiscoveredItem) -> Result<String, EngineError> {
        let content = self.discovery.download(&item.id).await?;
        debug!(name = %item.name, size_bytes = item.size_bytes, "Downloaded, uploading");
        self.catalog
            .upload(&item.name, content_type_for(&item.name), content)
            .await
    }
}

#[async_trait]
impl ItemPipeline for TransferPipeline {
    async fn process(&self, item: &DiscoveredItem) -> ProcessingOutcome {
        let started = Instant::now();
        let outcome = self.transfer(item).await;
        self.observer.item_duration(started.elapsed());
        outcome
    }

    fn is_settled(&self, item: &DiscoveredItem) -> bool {
        self.ledger.contains(&item.name)
    }
}

fn skipped(reason: SkipReason, name: &str) -> ProcessingOutcome {
    ProcessingOutcome::Skipped {
        reason,
        name: name.to_string(),
    }
}

fn failed(error: EngineError, name: &str) -> ProcessingOutcome {
    ProcessingOutcome::Failed {
        kind: error.kind(),
        error: error.to_string(),
        name: name.to_string(),
    }
}
