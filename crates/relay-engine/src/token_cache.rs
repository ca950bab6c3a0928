//! # Access Token Cache
//!
//! Holds the bearer credential used for Microsoft Graph and refreshes it
//! before it expires.
//!
//! ## Acquire Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TokenCache::acquire                             │
//! │                                                                         │
//! │   caller ──► lock ──► cached && now < expires_at - margin ?             │
//! │                            │                    │                       │
//! │                           yes                   no                      │
//! │                            │                    │                       │
//! │                            ▼                    ▼                       │
//! │                    return cached      provider.acquire(scopes)          │
//! │                    (no I/O)                     │                       │
//! │                                        ┌────────┴────────┐              │
//! │                                   token present     no token            │
//! │                                        │                 │              │
//! │                                        ▼                 ▼              │
//! │                              replace credential    AuthError            │
//! │                              return it             (nothing cached)     │
//! │                                                                         │
//! │  The lock is held across the provider call: callers that arrive         │
//! │  during a refresh wait, then see the new credential. One refresh,       │
//! │  one network call, regardless of how many workers asked.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use relay_core::now_epoch_secs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::collaborators::CredentialProvider;
use crate::config::RelayConfig;
use crate::error::{EngineError, EngineResult};

/// Refresh this long before expiry unless configured otherwise.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Assumed lifetime when the provider does not report one.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3000);

// =============================================================================
// Credential
// =============================================================================

/// A bearer token and the moment it stops being valid.
///
/// Replaced wholesale on refresh, never mutated.
#[derive(Clone, PartialEq)]
pub struct Credential {
    pub value: String,
    pub expires_at_epoch_secs: f64,
}

impl Credential {
    /// True if the credential expires within `margin` of `now`.
    pub fn needs_refresh(&self, now: f64, margin: Duration) -> bool {
        now >= self.expires_at_epoch_secs - margin.as_secs_f64()
    }

    /// Seconds left before hard expiry (zero once expired).
    pub fn remaining_secs(&self, now: f64) -> f64 {
        (self.expires_at_epoch_secs - now).max(0.0)
    }

    /// Value formatted for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("expires_at_epoch_secs", &self.expires_at_epoch_secs)
            .finish()
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Settings for a [`TokenCache`].
#[derive(Debug, Clone)]
pub struct TokenCacheConfig {
    /// Scopes requested from the provider.
    pub scopes: Vec<String>,

    /// Refresh this long before expiry.
    pub refresh_margin: Duration,

    /// Lifetime assumed when the provider omits `expires_in`.
    pub default_lifetime: Duration,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        TokenCacheConfig {
            scopes: vec!["https://graph.microsoft.com/.default".to_string()],
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            default_lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }
}

impl From<&RelayConfig> for TokenCacheConfig {
    fn from(config: &RelayConfig) -> Self {
        TokenCacheConfig {
            scopes: config.azure.scopes.clone(),
            refresh_margin: config.token_refresh_margin(),
            default_lifetime: config.default_token_lifetime(),
        }
    }
}

// =============================================================================
// Token Cache
// =============================================================================

/// Caches one credential and serializes refreshes.
pub struct TokenCache {
    config: TokenCacheConfig,
    provider: Arc<dyn CredentialProvider>,
    cached: Mutex<Option<Credential>>,
}

impl TokenCache {
    pub fn new(config: TokenCacheConfig, provider: Arc<dyn CredentialProvider>) -> Self {
        TokenCache {
            config,
            provider,
            cached: Mutex::new(None),
        }
    }

    /// Returns a credential valid for at least the refresh margin,
    /// refreshing it first if needed.
    pub async fn acquire(&self) -> EngineResult<Credential> {
        let mut guard = self.cached.lock().await;

        let now = now_epoch_secs();
        if let Some(credential) = guard.as_ref() {
            if !credential.needs_refresh(now, self.config.refresh_margin) {
                debug!(
                    remaining_secs = credential.remaining_secs(now),
                    "Using cached token"
                );
                return Ok(credential.clone());
            }
        }

        let response = self
            .provider
            .acquire(&self.config.scopes)
            .await
            .map_err(|e| match e {
                EngineError::Auth(_) => e,
                other => EngineError::Auth(other.to_string()),
            })?;

        let value = match response.access_token.as_deref() {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => {
                let diagnostic = response.diagnostic();
                warn!(error = %diagnostic, "Credential provider returned no token");
                return Err(EngineError::Auth(format!(
                    "Failed to acquire token from Azure AD: {}",
                    diagnostic
                )));
            }
        };

        let lifetime = response
            .expires_in
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .unwrap_or_else(|| self.config.default_lifetime.as_secs_f64());

        // Anchored to the time the request was made, not when it returned.
        let credential = Credential {
            value,
            expires_at_epoch_secs: now + lifetime,
        };

        info!(expires_in_secs = lifetime, "Access token refreshed");
        *guard = Some(credential.clone());
        Ok(credential)
    }

    /// The cached credential without triggering a refresh.
    pub async fn current(&self) -> Option<Credential> {
        self.cached.lock().await.clone()
    }

    /// Drops the cached credential so the next `acquire` refreshes.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::TokenResponse;
    use crate::testing::FakeCredentialProvider;

    fn cache_with(provider: Arc<FakeCredentialProvider>) -> TokenCache {
        TokenCache::new(TokenCacheConfig::default(), provider)
    }

    #[test]
    fn test_credential_needs_refresh() {
        let now = 1_000_000.0;
        let margin = Duration::from_secs(60);

        let fresh = Credential {
            value: "t".into(),
            expires_at_epoch_secs: now + 3600.0,
        };
        assert!(!fresh.needs_refresh(now, margin));

        let close = Credential {
            value: "t".into(),
            expires_at_epoch_secs: now + 30.0,
        };
        assert!(close.needs_refresh(now, margin));
        assert_eq!(close.remaining_secs(now), 30.0);
        assert_eq!(close.remaining_secs(now + 100.0), 0.0);
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential {
            value: "super-secret".into(),
            expires_at_epoch_secs: 1.0,
        };
        assert!(!format!("{:?}", credential).contains("super-secret"));
        assert_eq!(credential.bearer(), "Bearer super-secret");
    }

    #[tokio::test]
    async fn test_fresh_credential_is_served_from_cache() {
        let provider = Arc::new(FakeCredentialProvider::granting("tok", 3600.0));
        let cache = cache_with(provider.clone());

        let first = cache.acquire().await.unwrap();
        let second = cache.acquire().await.unwrap();
        let third = cache.acquire().await.unwrap();

        assert_eq!(first.value, "tok");
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_credential_inside_margin_is_refreshed() {
        // 30s lifetime is always inside the 60s margin.
        let provider = Arc::new(FakeCredentialProvider::granting("short", 30.0));
        let cache = cache_with(provider.clone());

        cache.acquire().await.unwrap();
        cache.acquire().await.unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_lifetime_uses_default() {
        let provider = Arc::new(FakeCredentialProvider::responding(TokenResponse {
            access_token: Some("tok".into()),
            ..Default::default()
        }));
        let cache = cache_with(provider.clone());

        let before = now_epoch_secs();
        let credential = cache.acquire().await.unwrap();
        assert!(credential.expires_at_epoch_secs >= before + 3000.0);

        cache.acquire().await.unwrap();
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let provider = Arc::new(
            FakeCredentialProvider::granting("shared", 3600.0)
                .with_delay(Duration::from_millis(50)),
        );
        let cache = Arc::new(cache_with(provider.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.acquire().await }));
        }

        for handle in handles {
            let credential = handle.await.unwrap().unwrap();
            assert_eq!(credential.value, "shared");
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh_of_stale_credential() {
        // One credential inside the 60s margin, one already expired.
        for remaining in [30.0, -10.0] {
            let provider = Arc::new(
                FakeCredentialProvider::granting("renewed", 3600.0)
                    .with_delay(Duration::from_millis(50)),
            );
            let cache = Arc::new(cache_with(provider.clone()));
            *cache.cached.lock().await = Some(Credential {
                value: "stale".into(),
                expires_at_epoch_secs: now_epoch_secs() + remaining,
            });

            let mut handles = Vec::new();
            for _ in 0..16 {
                let cache = cache.clone();
                handles.push(tokio::spawn(async move { cache.acquire().await }));
            }

            for handle in handles {
                let credential = handle.await.unwrap().unwrap();
                assert_eq!(credential.value, "renewed");
            }
            assert_eq!(provider.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let provider = Arc::new(FakeCredentialProvider::responding(TokenResponse {
            error: Some("invalid_client".into()),
            error_description: Some("AADSTS7000215: Invalid client secret".into()),
            ..Default::default()
        }));
        let cache = cache_with(provider.clone());

        let err = cache.acquire().await.unwrap_err();
        assert!(matches!(err, EngineError::Auth(ref msg) if msg.contains("AADSTS7000215")));
        assert!(cache.current().await.is_none());

        assert!(cache.acquire().await.is_err());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_auth_error() {
        let provider = Arc::new(FakeCredentialProvider::failing("connection refused"));
        let cache = cache_with(provider);

        let err = cache.acquire().await.unwrap_err();
        assert!(matches!(err, EngineError::Auth(ref msg) if msg.contains("connection refused")));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let provider = Arc::new(FakeCredentialProvider::granting("tok", 3600.0));
        let cache = cache_with(provider.clone());

        cache.acquire().await.unwrap();
        cache.invalidate().await;
        cache.acquire().await.unwrap();
        assert_eq!(provider.calls(), 2);
    }
}
