//! In-memory collaborators for unit tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use relay_core::{DiscoveredItem, ProcessingOutcome};

use crate::collaborators::{
    CatalogCollaborator, ContentStream, CredentialProvider, DeadLetterStore,
    DiscoveryCollaborator, LedgerStore, TokenResponse,
};
use crate::dead_letter::DeadLetterRecord;
use crate::error::{EngineError, EngineResult};
use crate::observer::PollObserver;

// =============================================================================
// Credentials
// =============================================================================

pub struct FakeCredentialProvider {
    response: Result<TokenResponse, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeCredentialProvider {
    pub fn granting(token: &str, expires_in: f64) -> Self {
        Self::responding(TokenResponse::granted(token, expires_in))
    }

    pub fn responding(response: TokenResponse) -> Self {
        FakeCredentialProvider {
            response: Ok(response),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        FakeCredentialProvider {
            response: Err(message.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for FakeCredentialProvider {
    async fn acquire(&self, _scopes: &[String]) -> EngineResult<TokenResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone().map_err(EngineError::Network)
    }
}

// =============================================================================
// Discovery
// =============================================================================

#[derive(Default)]
pub struct FakeDiscovery {
    items: Mutex<Vec<DiscoveredItem>>,
    list_error: Mutex<Option<String>>,
    failing_downloads: HashSet<String>,
    list_calls: AtomicUsize,
    downloads: AtomicUsize,
}

impl FakeDiscovery {
    pub fn with_items(items: Vec<DiscoveredItem>) -> Self {
        FakeDiscovery {
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    /// Every listing fails with a discovery error.
    pub fn failing(message: &str) -> Self {
        FakeDiscovery {
            list_error: Mutex::new(Some(message.to_string())),
            ..Default::default()
        }
    }

    pub fn with_failing_download(mut self, item_id: &str) -> Self {
        self.failing_downloads.insert(item_id.to_string());
        self
    }

    pub fn set_items(&self, items: Vec<DiscoveredItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn heal(&self) {
        *self.list_error.lock().unwrap() = None;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryCollaborator for FakeDiscovery {
    async fn list_candidates(&self) -> EngineResult<Vec<DiscoveredItem>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.list_error.lock().unwrap().clone() {
            return Err(EngineError::Discovery(message));
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn download(&self, item_id: &str) -> EngineResult<ContentStream> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.failing_downloads.contains(item_id) {
            return Err(EngineError::Http {
                status: 404,
                url: format!("https://graph.test/items/{}/content", item_id),
                body: "itemNotFound".into(),
            });
        }
        let chunks = vec![
            Ok(Bytes::from(format!("content-of-{}", item_id))),
            Ok(Bytes::from_static(b"-tail")),
        ];
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Default)]
pub struct FakeCatalog {
    uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
    associations: Mutex<Vec<(String, String)>>,
    failing_uploads: HashSet<String>,
    fail_associations: bool,
    panic_on: HashSet<String>,
    upload_delay: Option<Duration>,
    next_id: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_failing_upload(mut self, name: &str) -> Self {
        self.failing_uploads.insert(name.to_string());
        self
    }

    pub fn with_failing_associations(mut self) -> Self {
        self.fail_associations = true;
        self
    }

    /// Panics inside `upload` for this name.
    pub fn with_panic_on(mut self, name: &str) -> Self {
        self.panic_on.insert(name.to_string());
        self
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    /// Names uploaded so far, in call order.
    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _, _)| name.clone())
            .collect()
    }

    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn associations(&self) -> Vec<(String, String)> {
        self.associations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogCollaborator for FakeCatalog {
    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        mut content: ContentStream,
    ) -> EngineResult<String> {
        if self.panic_on.contains(name) {
            panic!("catalog exploded on {}", name);
        }
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }

        let mut body = Vec::new();
        while let Some(chunk) = content.next().await {
            body.extend_from_slice(&chunk?);
        }

        if self.failing_uploads.contains(name) {
            return Err(EngineError::Http {
                status: 500,
                url: "https://salsify.test/v1/orgs/o/assets".into(),
                body: "Internal Server Error".into(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.uploads
            .lock()
            .unwrap()
            .push((name.to_string(), content_type.to_string(), body));
        Ok(format!("asset-{}", id))
    }

    async fn associate(&self, product_code: &str, asset_id: &str) -> EngineResult<()> {
        if self.fail_associations {
            return Err(EngineError::Association(format!(
                "product {} not found",
                product_code
            )));
        }
        self.associations
            .lock()
            .unwrap()
            .push((product_code.to_string(), asset_id.to_string()));
        Ok(())
    }
}

// =============================================================================
// Persistence
// =============================================================================

#[derive(Default)]
pub struct FakeLedgerStore {
    initial: BTreeSet<String>,
    fail_saves: bool,
    saved: Mutex<Vec<BTreeSet<String>>>,
}

impl FakeLedgerStore {
    pub fn with_names(names: &[&str]) -> Self {
        FakeLedgerStore {
            initial: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_saves() -> Self {
        FakeLedgerStore {
            fail_saves: true,
            ..Default::default()
        }
    }

    /// Every snapshot handed to `save`, in order.
    pub fn saved(&self) -> Vec<BTreeSet<String>> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerStore for FakeLedgerStore {
    async fn load(&self) -> EngineResult<BTreeSet<String>> {
        Ok(self.initial.clone())
    }

    async fn save(&self, names: &BTreeSet<String>) -> EngineResult<()> {
        if self.fail_saves {
            return Err(EngineError::Persistence("disk full".into()));
        }
        self.saved.lock().unwrap().push(names.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDeadLetterStore {
    fail: bool,
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl FakeDeadLetterStore {
    pub fn failing() -> Self {
        FakeDeadLetterStore {
            fail: true,
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterStore for FakeDeadLetterStore {
    async fn append(&self, record: &DeadLetterRecord) -> EngineResult<()> {
        if self.fail {
            return Err(EngineError::Persistence("read-only file system".into()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// =============================================================================
// Observer
// =============================================================================

#[derive(Default)]
pub struct RecordingObserver {
    completed: Mutex<Vec<ProcessingOutcome>>,
    durations: Mutex<Vec<Duration>>,
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl RecordingObserver {
    fn bump(&self, key: &'static str) {
        *self.counts.lock().unwrap().entry(key).or_default() += 1;
    }

    fn count(&self, key: &str) -> usize {
        self.counts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn completed(&self) -> Vec<ProcessingOutcome> {
        self.completed.lock().unwrap().clone()
    }

    pub fn durations(&self) -> usize {
        self.durations.lock().unwrap().len()
    }

    pub fn iteration_failures(&self) -> usize {
        self.count("iteration_failed")
    }

    pub fn suppressed(&self) -> usize {
        self.count("poll_suppressed")
    }

    pub fn association_failures(&self) -> usize {
        self.count("association_failed")
    }

    pub fn persistence_failures(&self) -> usize {
        self.count("persistence_failed")
    }
}

impl PollObserver for RecordingObserver {
    fn item_completed(&self, outcome: &ProcessingOutcome) {
        self.completed.lock().unwrap().push(outcome.clone());
    }

    fn item_duration(&self, elapsed: Duration) {
        self.durations.lock().unwrap().push(elapsed);
    }

    fn iteration_failed(&self, _error: &EngineError) {
        self.bump("iteration_failed");
    }

    fn poll_suppressed(&self, _retry_in: Duration) {
        self.bump("poll_suppressed");
    }

    fn association_failed(&self, _name: &str, _error: &EngineError) {
        self.bump("association_failed");
    }

    fn persistence_failed(&self, _error: &EngineError) {
        self.bump("persistence_failed");
    }
}
