//! Builds the engine from configuration.

use std::sync::Arc;

use relay_engine::{
    build_client, AzureCredentialProvider, DeadLetterSink, EngineResult, IdempotencyLedger,
    JsonFileLedgerStore, JsonLinesDeadLetterStore, PollLoop, PollLoopConfig, PollLoopHandle,
    PollObserver, RelayConfig, RetryPolicy, SalsifyCatalog, SharePointDiscovery, TokenCache,
    TokenCacheConfig, TransferPipeline,
};
use tracing::info;

/// Connects the real collaborators and loads the ledger.
///
/// ```text
/// AzureCredentialProvider ─► TokenCache ─► SharePointDiscovery ─┐
///                                                                ├─► TransferPipeline ─► PollLoop
/// SalsifyCatalog ─────────────────────────────────────────────────┤
/// JsonFileLedgerStore ─► IdempotencyLedger ──────────────────────┘
/// JsonLinesDeadLetterStore ─► DeadLetterSink ───────────────────────────────────────────► PollLoop
/// ```
pub async fn build(
    config: &RelayConfig,
    observer: Arc<dyn PollObserver>,
) -> EngineResult<(PollLoop, PollLoopHandle)> {
    let client = build_client(&config.http)?;
    let retry = RetryPolicy::from(&config.http);
    let extensions = config.extension_policy()?;

    let provider = Arc::new(AzureCredentialProvider::new(
        client.clone(),
        &config.azure,
        retry.clone(),
    )?);
    let tokens = Arc::new(TokenCache::new(TokenCacheConfig::from(config), provider));

    let discovery = Arc::new(SharePointDiscovery::new(
        client.clone(),
        &config.sharepoint,
        tokens,
        extensions.clone(),
        retry,
    ));
    let catalog = Arc::new(SalsifyCatalog::new(client, &config.salsify, &config.http));

    let ledger_store = Arc::new(JsonFileLedgerStore::new(
        config.paths.processed_files_path.clone(),
    ));
    let ledger = Arc::new(IdempotencyLedger::load(ledger_store, observer.clone()).await);
    info!(
        processed = ledger.len(),
        path = %config.paths.processed_files_path.display(),
        "Ledger loaded"
    );

    let pipeline = Arc::new(TransferPipeline::new(
        ledger,
        discovery.clone(),
        catalog,
        extensions,
        observer.clone(),
    ));

    let dead_letters = DeadLetterSink::new(
        Arc::new(JsonLinesDeadLetterStore::new(
            config.paths.dead_letter_path.clone(),
        )),
        observer.clone(),
    );

    Ok(PollLoop::new(
        PollLoopConfig::from(config),
        discovery,
        pipeline,
        dead_letters,
        observer,
    ))
}
