//! # Salsify Catalog
//!
//! Uploads digital assets to a Salsify organisation and, optionally, links
//! them to their product.
//!
//! ```text
//! upload:     POST {base}/v1/orgs/{org}/assets           multipart "file"
//!             ◄── {"id": "…"} or {"asset_id": "…"}
//!
//! associate:  PUT  {base}/v1/orgs/{org}/products/{code}
//!             {"salsify:digital_assets":[{"salsify:id":"…"}]}
//!             (association_mode = digital_assets only)
//! ```
//!
//! Uploads are sent once: the body is the download stream, so there is
//! nothing left to resend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use crate::collaborators::{CatalogCollaborator, ContentStream};
use crate::config::{AssociationMode, AuthScheme, HttpSettings, SalsifySettings};
use crate::error::{EngineError, EngineResult};
use crate::http::{check_status, RetryPolicy};

/// Salsify asset API client for one organisation.
pub struct SalsifyCatalog {
    client: Client,
    base_url: String,
    org_id: String,
    api_key: String,
    auth_scheme: AuthScheme,
    association_mode: AssociationMode,
    upload_timeout: Duration,
    retry: RetryPolicy,
}

impl SalsifyCatalog {
    pub fn new(client: Client, settings: &SalsifySettings, http: &HttpSettings) -> Self {
        SalsifyCatalog {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            org_id: settings.org_id.trim().to_string(),
            api_key: settings.api_key.clone(),
            auth_scheme: settings.auth_scheme,
            association_mode: settings.association_mode,
            upload_timeout: Duration::from_secs(http.upload_timeout_secs),
            retry: RetryPolicy::from(http),
        }
    }

    fn assets_url(&self) -> EngineResult<Url> {
        Ok(Url::parse(&format!(
            "{}/v1/orgs/{}/assets",
            self.base_url, self.org_id
        ))?)
    }

    fn product_url(&self, product_code: &str) -> EngineResult<Url> {
        let mut url = Url::parse(&format!("{}/v1/orgs/{}/products/", self.base_url, self.org_id))?;
        url.path_segments_mut()
            .map_err(|_| EngineError::Config("salsify.base_url cannot be a base".into()))?
            .pop_if_empty()
            .push(product_code);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let (name, value) = auth_header(self.auth_scheme, &self.api_key);
        request.header(name, value)
    }
}

/// Header carrying the API key for the configured scheme.
fn auth_header(scheme: AuthScheme, api_key: &str) -> (HeaderName, String) {
    match scheme {
        AuthScheme::Bearer => (AUTHORIZATION, format!("Bearer {}", api_key)),
        AuthScheme::XApiKey => (HeaderName::from_static("x-api-key"), api_key.to_string()),
    }
}

/// Asset id from an upload response, accepting string or numeric ids.
fn extract_asset_id(body: &Value) -> EngineResult<String> {
    ["id", "asset_id"]
        .iter()
        .find_map(|key| match body.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| EngineError::Transfer("Salsify upload response missing asset id".into()))
}

fn digital_assets_body(asset_id: &str) -> Value {
    json!({ "salsify:digital_assets": [{ "salsify:id": asset_id }] })
}

#[async_trait]
impl CatalogCollaborator for SalsifyCatalog {
    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        content: ContentStream,
    ) -> EngineResult<String> {
        let part = Part::stream(Body::wrap_stream(content))
            .file_name(name.to_string())
            .mime_str(content_type)?;
        let form = Form::new().part("file", part);

        let request = self
            .client
            .post(self.assets_url()?)
            .timeout(self.upload_timeout)
            .multipart(form);
        let response = check_status(self.authorize(request).send().await?).await?;

        let body: Value = serde_json::from_str(&response.text().await?)?;
        let asset_id = extract_asset_id(&body)?;
        debug!(name, asset_id = %asset_id, "Uploaded asset");
        Ok(asset_id)
    }

    async fn associate(&self, product_code: &str, asset_id: &str) -> EngineResult<()> {
        if self.association_mode == AssociationMode::None {
            debug!(product_code, asset_id, "Product association disabled");
            return Ok(());
        }

        let url = self.product_url(product_code)?;
        let body = digital_assets_body(asset_id);
        let url = &url;
        let body = &body;

        self.retry
            .run("salsify_associate", move || async move {
                let request = self.client.put(url.clone()).json(body);
                check_status(self.authorize(request).send().await?).await?;
                Ok(())
            })
            .await
            .map_err(|e| EngineError::Association(e.to_string()))?;

        info!(product_code, asset_id, "Associated asset with product");
        Ok(())
    }
}
