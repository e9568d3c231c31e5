//! Shared HTTP client with retry policy.
//!
//! Transport failures, timeouts, 429 and 5xx responses are retried with
//! exponential backoff. Authentication failures and other 4xx responses are
//! returned immediately.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::LlmError;

/// Maximum number of response body bytes kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Retry policy for [`HttpClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt
    pub backoff_base: Duration,
    /// Upper bound for a single delay
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(600),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given number of attempts and default backoff
    #[must_use]
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_cap)
    }
}

/// HTTP client shared by LLM backends and HTTP-based generation methods
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpClient {
    /// Create a client with the default retry policy
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, LlmError> {
        Self::with_policy(RetryPolicy::default())
    }

    /// Create a client with an explicit retry policy
    pub fn with_policy(policy: RetryPolicy) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reelforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, policy })
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    #[must_use]
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    #[must_use]
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send the request, retrying transient failures per the policy.
    ///
    /// `timeout` applies to each attempt. Requests whose body cannot be
    /// cloned (streams) are sent once.
    pub async fn execute_with_retry(
        &self,
        request: RequestBuilder,
        timeout: Duration,
        provider: &str,
    ) -> Result<Response, LlmError> {
        let mut attempt = 1;
        loop {
            let Some(builder) = request.try_clone() else {
                return execute_once(request, timeout).await;
            };

            match execute_once(builder, timeout).await {
                Ok(response) => {
                    debug!(provider, attempt, status = %response.status(), "HTTP request succeeded");
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        provider,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "HTTP request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

async fn execute_once(request: RequestBuilder, timeout: Duration) -> Result<Response, LlmError> {
    let response = request.timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            LlmError::Timeout { duration: timeout }
        } else {
            LlmError::Transport(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// Map a non-success HTTP status to the error taxonomy
pub(crate) fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::ProviderAuth(detail),
        StatusCode::TOO_MANY_REQUESTS => LlmError::ProviderQuota(detail),
        StatusCode::REQUEST_TIMEOUT => LlmError::Transport(detail),
        s if s.is_server_error() => LlmError::ProviderOutage(detail),
        _ => LlmError::Misconfiguration(detail),
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}…")
    }
}
