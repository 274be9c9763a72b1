use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::warn;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const USER_AGENT: &str = concat!("cardsync/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for publisher pages and card images. All retrying
/// lives here; the reconciler/allocator stay synchronous and pure.
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }

    /// GET a page as text, retrying rate limits and server errors with
    /// exponential backoff.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.get_with_retry(url).await?;
        response
            .text()
            .await
            .with_context(|| format!("reading body of {}", url))
    }

    /// GET raw bytes (card images).
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get_with_retry(url).await?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("reading body of {}", url))?;
        Ok(bytes.to_vec())
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        for attempt in 0..=MAX_RETRIES {
            let result = self.client.get(url).send().await;

            let should_retry = match &result {
                Ok(resp) => is_transient(resp.status()),
                // Connection resets and timeouts are worth another try.
                Err(e) => e.is_timeout() || e.is_connect(),
            };

            if !should_retry || attempt == MAX_RETRIES {
                let resp = result.with_context(|| format!("requesting {}", url))?;
                if !resp.status().is_success() {
                    bail!("{} returned HTTP {}", url, resp.status());
                }
                return Ok(resp);
            }

            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
            warn!(
                "Transient failure on {} (attempt {}/{}), backing off {:.1}s",
                url,
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
        }
        unreachable!("retry loop always returns")
    }
}

fn is_transient(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

// ── Tests ──
