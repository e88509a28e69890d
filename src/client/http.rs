//! Shared HTTP fetcher.
//!
//! One `reqwest::Client` per fetcher, 30 s timeout, caching disabled.
//! Transient failures (5xx, timeouts, connection errors) are retried up to
//! twice with exponential backoff and sub-second jitter; 429 and 401/403 are
//! surfaced immediately as distinct error kinds so callers can back off or
//! re-authenticate instead of hammering the endpoint.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{BotError, Result};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE_MS: u64 = 250;

/// Thread-safe, reentrant JSON fetcher shared by all upstream clients.
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http })
    }

    /// The underlying client, for callers that need custom headers or bodies.
    pub fn client(&self) -> &Client {
        &self.http
    }

    /// GET a URL (query string included) and decode the JSON body, retrying
    /// transient failures.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.try_get_json::<T>(url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    let delay = backoff_delay(attempt);
                    debug!(url, attempt, ?delay, error = %e, "transient http failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .header("Cache-Control", "no-cache")
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }
}

/// Map a response status onto the error taxonomy, passing 2xx through.
pub async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(BotError::RateLimited);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let body = resp.text().await.unwrap_or_default();
        return Err(BotError::Unauthorized(body));
    }

    let body = resp.text().await.unwrap_or_default();
    Err(BotError::Api {
        status: status.as_u16(),
        message: truncate(&body, 200),
    })
}

/// Exponential backoff with up to 20% deterministic jitter from the
/// nanosecond clock.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = BACKOFF_BASE_MS * 2u64.pow(attempt);
    let jitter_range = base_ms / 5;
    let jitter = if jitter_range == 0 {
        0
    } else {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        (nanos as u64) % (jitter_range + 1)
    };
    Duration::from_millis(base_ms + jitter)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempts() {
        let d0 = backoff_delay(0);
        let d2 = backoff_delay(2);
        assert!(d0 >= Duration::from_millis(250));
        assert!(d0 <= Duration::from_millis(300));
        assert!(d2 >= Duration::from_millis(1000));
        assert!(d2 <= Duration::from_millis(1200));
    }

    #[test]
    fn truncate_caps_long_bodies() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long, 200).len(), 203);
        assert_eq!(truncate("short", 200), "short");
    }
}
