//! # HTTP Plumbing
//!
//! Shared `reqwest` client construction, status checking, and the retry
//! policy for idempotent calls.
//!
//! ## Retry Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt ──► Ok ─────────────────────────────────────────► return      │
//! │     │                                                                   │
//! │     └─► Err ── is_retryable()? ── no ──────────────────────► return    │
//! │                     │                                                   │
//! │                    yes ── retries left? ── no ─────────────► return    │
//! │                               │                                         │
//! │                              yes ── sleep(next backoff) ──► attempt    │
//! │                                                                         │
//! │  Retryable: connect/timeout errors, 429, 500, 502, 503, 504.           │
//! │  Streaming uploads are never retried (their body is consumed).         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::{Client, Response};
use tracing::warn;

use crate::config::HttpSettings;
use crate::error::{EngineError, EngineResult};

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Builds the client shared by every collaborator.
pub fn build_client(settings: &HttpSettings) -> EngineResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .user_agent(concat!("asset-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Turns a non-success response into [`EngineError::Http`].
pub async fn check_status(response: Response) -> EngineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(EngineError::Http {
        status: status.as_u16(),
        url,
        body: truncate_body(&body),
    })
}

pub(crate) fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY {
        return trimmed.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounded exponential backoff for idempotent requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl From<&HttpSettings> for RetryPolicy {
    fn from(settings: &HttpSettings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // Bounded by max_retries instead
            ..Default::default()
        }
    }

    /// Runs `attempt` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut attempt: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut backoff = self.backoff();
        let mut retries = 0;

        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    let delay = backoff.next_backoff().unwrap_or(self.max_backoff);
                    retries += 1;
                    warn!(
                        request = what,
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn http(status: u16) -> EngineError {
        EngineError::Http {
            status,
            url: "https://graph.test".into(),
            body: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let result = RetryPolicy::default()
            .run("list", move || async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(http(503)),
                    1 => Err(EngineError::Network("reset".into())),
                    _ => Ok(42),
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let result: EngineResult<()> = RetryPolicy::default()
            .run("list", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(http(404))
            })
            .await;

        assert!(matches!(result, Err(EngineError::Http { status: 404, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        let counter = &attempts;
        let result: EngineResult<()> = policy
            .run("list", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(http(429))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("  short  "), "short");
        let long = "é".repeat(600);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with('…'));
        assert!(truncated.len() <= MAX_ERROR_BODY + '…'.len_utf8());
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = RetryPolicy::from(&HttpSettings::default());
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
    }
}
