use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::fetch::Fetcher;

const ENDPOINT_ENV: &str = "CARDSYNC_UPLOAD_URL";

/// Card-image uploader backed by an HTTP storage endpoint. Images land
/// under `<prefix>/<name>.webp` and the store keeps the returned URL.
pub struct Uploader {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

impl Uploader {
    /// Build from the environment, or None when no endpoint is configured —
    /// records then keep the publisher's image URL directly.
    pub fn from_env() -> Result<Option<Self>> {
        let endpoint = match std::env::var(ENDPOINT_ENV) {
            Ok(url) if !url.is_empty() => url,
            _ => {
                info!("{} not set; keeping publisher image URLs", ENDPOINT_ENV);
                return Ok(None);
            }
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("building uploader client")?;
        Ok(Some(Self { client, endpoint }))
    }

    /// Download the source image and hand it to the storage endpoint.
    /// Returns the stored URL.
    pub async fn upload_image(
        &self,
        fetcher: &Fetcher,
        source_url: &str,
        name: &str,
        prefix: &str,
    ) -> Result<String> {
        let bytes = fetcher
            .fetch_bytes(source_url)
            .await
            .with_context(|| format!("downloading image {}", source_url))?;

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("name", name), ("prefix", prefix)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .context("calling image store")?;
        if !response.status().is_success() {
            bail!("image store returned HTTP {}", response.status());
        }
        let body: UploadResponse = response.json().await.context("decoding image store response")?;
        Ok(body.url)
    }
}
