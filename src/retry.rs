//! Bounded retry with exponential backoff.
//!
//! Only errors for which [`RagError::is_retryable`] holds are retried:
//! rate limits (HTTP 429), server errors (5xx), timeouts, connection
//! failures, and an unreachable index. Client errors fail immediately.
//!
//! Backoff doubles from `base_delay` and is capped at `max_delay`; with the
//! defaults that is 1s, 2s, 4s, 8s, 16s, 32s.

use std::future::Future;
use std::time::Duration;

use crate::error::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(5);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation = what,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether an HTTP status is worth retrying (rate limited or server error).
pub(crate) fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Send a request and decode its JSON body, classifying failures.
///
/// Transport failures (timeouts, refused connections) and 429/5xx
/// responses are reported as retryable through `fail`; other statuses and
/// undecodable bodies are not.
pub(crate) async fn send_json<E>(
    request: reqwest::RequestBuilder,
    fail: E,
) -> Result<serde_json::Value>
where
    E: Fn(String, bool) -> RagError,
{
    let response = request
        .send()
        .await
        .map_err(|e| fail(describe_transport_error(&e), true))?;

    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| fail(format!("invalid response body: {}", e), false));
    }

    let body_text = response.text().await.unwrap_or_default();
    Err(fail(
        format!("API error {}: {}", status, body_text),
        is_retryable_status(status),
    ))
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
