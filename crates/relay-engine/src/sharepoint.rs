//! # SharePoint Discovery (Microsoft Graph)
//!
//! Lists the files in one SharePoint folder and streams their content.
//!
//! ## Listing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET /sites/{site}/drive                          ──► drive id          │
//! │  GET /drives/{drive}/root:/{folder_path}          ──► folder id         │
//! │  GET /drives/{drive}/items/{folder}/children?$select=…                  │
//! │        │                                                                │
//! │        ├─► value[]  keep entries with a `file` facet and an allowed     │
//! │        │            extension                                           │
//! │        └─► @odata.nextLink ──► GET (repeat until absent)                │
//! │                                                                         │
//! │  download(id): GET /drives/{drive}/items/{id}/content  (streamed)       │
//! │  The drive is resolved on every listing; downloads reuse the last one.  │
//! │                                                                         │
//! │  Every request carries a bearer token from the TokenCache. A 401        │
//! │  drops the cached token so the next call refreshes it.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use relay_core::{DiscoveredItem, ExtensionPolicy};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use crate::collaborators::{ContentStream, DiscoveryCollaborator};
use crate::config::SharePointSettings;
use crate::error::{EngineError, EngineResult};
use crate::http::{check_status, RetryPolicy};
use crate::token_cache::TokenCache;

const CHILD_FIELDS: &str = "id,name,file,size,lastModifiedDateTime";

// =============================================================================
// Graph Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
struct DriveRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItem>,

    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,

    /// Present only on files.
    #[serde(default)]
    file: Option<serde_json::Value>,

    #[serde(default)]
    size: Option<u64>,

    #[serde(default)]
    last_modified_date_time: Option<DateTime<Utc>>,
}

// =============================================================================
// URL Construction
// =============================================================================

/// Graph endpoints for one site and folder.
#[derive(Debug, Clone)]
struct GraphRoutes {
    base: String,
    site_id: String,
    folder_path: String,
}

impl GraphRoutes {
    fn new(settings: &SharePointSettings) -> Self {
        GraphRoutes {
            base: settings.graph_base_url.trim_end_matches('/').to_string(),
            site_id: settings.site_id.trim().to_string(),
            folder_path: settings.folder_path.trim().trim_matches('/').to_string(),
        }
    }

    fn drive(&self) -> EngineResult<Url> {
        Ok(Url::parse(&format!("{}/sites/{}/drive", self.base, self.site_id))?)
    }

    fn folder(&self, drive_id: &str) -> EngineResult<Url> {
        let url = if self.folder_path.is_empty() {
            format!("{}/drives/{}/root", self.base, drive_id)
        } else {
            format!("{}/drives/{}/root:/{}", self.base, drive_id, self.folder_path)
        };
        Ok(Url::parse(&url)?)
    }

    fn children(&self, drive_id: &str, folder_id: &str) -> EngineResult<Url> {
        Ok(Url::parse(&format!(
            "{}/drives/{}/items/{}/children?$select={}",
            self.base, drive_id, folder_id, CHILD_FIELDS
        ))?)
    }

    fn content(&self, drive_id: &str, item_id: &str) -> EngineResult<Url> {
        Ok(Url::parse(&format!(
            "{}/drives/{}/items/{}/content",
            self.base, drive_id, item_id
        ))?)
    }
}

/// Keeps files with an allowed extension, in listing order.
fn candidates(items: Vec<DriveItem>, extensions: &ExtensionPolicy) -> Vec<DiscoveredItem> {
    items
        .into_iter()
        .filter(|item| item.file.is_some())
        .filter(|item| extensions.allows(&item.name))
        .map(|item| DiscoveredItem {
            id: item.id,
            name: item.name,
            size_bytes: item.size.unwrap_or(0),
            last_modified: item.last_modified_date_time,
        })
        .collect()
}

// =============================================================================
// Discovery
// =============================================================================

/// Watches one SharePoint folder through Microsoft Graph.
pub struct SharePointDiscovery {
    client: Client,
    routes: GraphRoutes,
    tokens: Arc<TokenCache>,
    extensions: ExtensionPolicy,
    retry: RetryPolicy,
    /// Last drive resolved by a listing.
    drive_id: RwLock<Option<String>>,
}

impl SharePointDiscovery {
    pub fn new(
        client: Client,
        settings: &SharePointSettings,
        tokens: Arc<TokenCache>,
        extensions: ExtensionPolicy,
        retry: RetryPolicy,
    ) -> Self {
        SharePointDiscovery {
            client,
            routes: GraphRoutes::new(settings),
            tokens,
            extensions,
            retry,
            drive_id: RwLock::new(None),
        }
    }

    async fn resolve_drive(&self) -> EngineResult<String> {
        let drive: DriveRef = self.get_json("graph_drive", self.routes.drive()?).await?;
        let mut current = self.drive_id.write().await;
        if current.as_deref() != Some(drive.id.as_str()) {
            info!(drive_id = %drive.id, "Resolved SharePoint drive");
            *current = Some(drive.id.clone());
        }
        Ok(drive.id)
    }

    /// The drive from the last listing, resolving one if none has run yet.
    async fn current_drive(&self) -> EngineResult<String> {
        if let Some(id) = self.drive_id.read().await.clone() {
            return Ok(id);
        }
        self.resolve_drive().await
    }

    async fn get_json<T: DeserializeOwned>(&self, what: &str, url: Url) -> EngineResult<T> {
        let client = &self.client;
        let tokens = &self.tokens;
        let url = &url;

        let result = self
            .retry
            .run(what, move || async move {
                let credential = tokens.acquire().await?;
                let response = client
                    .get(url.clone())
                    .bearer_auth(&credential.value)
                    .send()
                    .await?;
                let body = check_status(response).await?.text().await?;
                Ok(serde_json::from_str::<T>(&body)?)
            })
            .await;

        self.forget_rejected_token(&result).await;
        result
    }

    async fn forget_rejected_token<T>(&self, result: &EngineResult<T>) {
        if let Err(EngineError::Http { status: 401, .. }) = result {
            self.tokens.invalidate().await;
        }
    }
}

#[async_trait]
impl DiscoveryCollaborator for SharePointDiscovery {
    async fn list_candidates(&self) -> EngineResult<Vec<DiscoveredItem>> {
        let drive_id = self.resolve_drive().await?;
        let folder: DriveRef = self
            .get_json("graph_folder", self.routes.folder(&drive_id)?)
            .await?;

        let mut items = Vec::new();
        let mut next = Some(self.routes.children(&drive_id, &folder.id)?);
        while let Some(url) = next.take() {
            let page: ChildrenPage = self.get_json("graph_children", url).await?;
            items.extend(candidates(page.value, &self.extensions));
            next = page.next_link.as_deref().map(Url::parse).transpose()?;
        }

        debug!(count = items.len(), folder = %self.routes.folder_path, "Listed folder");
        Ok(items)
    }

    async fn download(&self, item_id: &str) -> EngineResult<ContentStream> {
        let drive_id = self.current_drive().await?;
        let url = self.routes.content(&drive_id, item_id)?;
        let client = &self.client;
        let tokens = &self.tokens;
        let url = &url;

        let result = self
            .retry
            .run("graph_download", move || async move {
                let credential = tokens.acquire().await?;
                let response = client
                    .get(url.clone())
                    .bearer_auth(&credential.value)
                    .send()
                    .await?;
                check_status(response).await
            })
            .await;

        self.forget_rejected_token(&result).await;
        let stream = result?.bytes_stream().map_err(EngineError::from);
        Ok(Box::pin(stream))
    }
}
