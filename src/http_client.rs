//! C12 — shared outbound HTTP client with a retry wrapper.
//!
//! Connection pooling is `reqwest::Client`'s own concern; this module only
//! adds the retry policy from the design: 429/5xx retried with exponential
//! backoff and jitter, everything else passed straight through.

use std::time::Duration;

use rand::Rng;
use reqwest::{Response, StatusCode};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(retry: RetryPolicy) -> Result<Self> {
        let inner = reqwest::Client::builder().build()?;
        Ok(Self { inner, retry })
    }

    pub fn reqwest(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Sends a request built fresh on each attempt (so the body can be
    /// re-read). Retries on outbound 429/5xx; never retries once the caller
    /// indicates the response stream has started being consumed — that's
    /// the caller's responsibility for streaming endpoints, since this
    /// wrapper only sees the head of the response before any body is read.
    pub async fn execute_with_retry<F>(&self, mut build: F, timeout: Duration) -> Result<Response>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = build().timeout(timeout).send().await;
            match result {
                Ok(resp) if is_retryable_status(resp.status()) && attempt < self.retry.max_attempts => {
                    tokio::time::sleep(self.backoff(attempt)).await;
                    continue;
                }
                Ok(resp) => return Ok(resp),
                Err(err) if attempt < self.retry.max_attempts && err.is_timeout() => {
                    tokio::time::sleep(self.backoff(attempt)).await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.retry.base_delay * 2u32.pow(attempt.saturating_sub(1));
        let jitter = rand::rng().random_range(0.75..1.25);
        exp.mul_f64(jitter)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::OK));
    }

    #[test]
    fn backoff_grows_and_stays_within_jitter_band() {
        let client = HttpClient::new(RetryPolicy::default()).unwrap();
        for attempt in 1..=4 {
            let d = client.backoff(attempt);
            let base = client.retry.base_delay * 2u32.pow(attempt - 1);
            assert!(d >= base.mul_f64(0.75) && d <= base.mul_f64(1.25));
        }
    }
}
