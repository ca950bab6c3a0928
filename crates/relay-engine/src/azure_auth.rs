//! # Azure AD Credential Provider
//!
//! OAuth2 client-credentials exchange against the Microsoft identity
//! platform. Caching lives in [`crate::token_cache::TokenCache`]; this type
//! performs exactly one exchange per call (plus transport retries).
//!
//! ```text
//! POST {authority_host}/{tenant_id}/oauth2/v2.0/token
//!   grant_type=client_credentials
//!   client_id=…  client_secret=…  scope=https://graph.microsoft.com/.default
//!
//! 200 {"access_token":"…","expires_in":3599,…}
//! 400 {"error":"invalid_client","error_description":"AADSTS7000215: …"}
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::collaborators::{CredentialProvider, TokenResponse};
use crate::config::AzureSettings;
use crate::error::{EngineError, EngineResult};
use crate::http::{truncate_body, RetryPolicy};

/// Client-credentials provider for one app registration.
pub struct AzureCredentialProvider {
    client: Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    retry: RetryPolicy,
}

impl AzureCredentialProvider {
    pub fn new(client: Client, settings: &AzureSettings, retry: RetryPolicy) -> EngineResult<Self> {
        Ok(AzureCredentialProvider {
            client,
            token_url: token_endpoint(&settings.authority_host, &settings.tenant_id)?,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            retry,
        })
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }
}

/// `{authority}/{tenant}/oauth2/v2.0/token`
pub fn token_endpoint(authority_host: &str, tenant_id: &str) -> EngineResult<Url> {
    let tenant = tenant_id.trim().trim_matches('/');
    if tenant.is_empty() {
        return Err(EngineError::Config("azure.tenant_id is empty".into()));
    }
    Ok(Url::parse(&format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant
    ))?)
}

#[async_trait]
impl CredentialProvider for AzureCredentialProvider {
    async fn acquire(&self, scopes: &[String]) -> EngineResult<TokenResponse> {
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let client = &self.client;
        let url = &self.token_url;
        let form = &form;

        debug!(url = %url, "Requesting access token");
        self.retry
            .run("azure_token", move || async move {
                let response = client.post(url.clone()).form(form).send().await?;
                let status = response.status();
                let body = response.text().await?;
                parse_token_reply(status, url, &body)
            })
            .await
    }
}

/// Token replies carry a JSON body on both success and failure; only
/// throttling, server errors and non-JSON bodies become HTTP errors.
fn parse_token_reply(status: StatusCode, url: &Url, body: &str) -> EngineResult<TokenResponse> {
    let http_error = || EngineError::Http {
        status: status.as_u16(),
        url: url.to_string(),
        body: truncate_body(body),
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(http_error());
    }

    match serde_json::from_str::<TokenResponse>(body) {
        Ok(parsed) => Ok(parsed),
        Err(_) if !status.is_success() => Err(http_error()),
        Err(e) => Err(EngineError::Auth(format!("Malformed token response: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://login.test/t/oauth2/v2.0/token").unwrap()
    }

    #[test]
    fn test_token_endpoint() {
        let url = token_endpoint("https://login.microsoftonline.com/", "contoso-tenant").unwrap();
        assert_eq!(
            url.as_str(),
            "https://login.microsoftonline.com/contoso-tenant/oauth2/v2.0/token"
        );
        assert!(token_endpoint("https://login.microsoftonline.com", " ").is_err());
    }

    #[test]
    fn test_success_reply() {
        let reply = parse_token_reply(
            StatusCode::OK,
            &url(),
            r#"{"token_type":"Bearer","expires_in":3599,"access_token":"abc"}"#,
        )
        .unwrap();
        assert_eq!(reply.access_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_rejected_credentials_pass_diagnostic_through() {
        let reply = parse_token_reply(
            StatusCode::UNAUTHORIZED,
            &url(),
            r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret provided."}"#,
        )
        .unwrap();
        assert!(reply.access_token.is_none());
        assert!(reply.diagnostic().starts_with("AADSTS7000215"));
    }

    #[test]
    fn test_throttling_and_html_errors_are_http_errors() {
        let throttled = parse_token_reply(StatusCode::TOO_MANY_REQUESTS, &url(), "{}").unwrap_err();
        assert!(throttled.is_retryable());

        let gateway = parse_token_reply(StatusCode::BAD_REQUEST, &url(), "<html>bad</html>").unwrap_err();
        assert!(matches!(gateway, EngineError::Http { status: 400, .. }));
    }
}
