use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

const ENDPOINT_ENV: &str = "CARDSYNC_TRANSLATE_URL";
const API_KEY_ENV: &str = "CARDSYNC_TRANSLATE_KEY";

/// JP→EN text translator backed by an HTTP endpoint. Card free-text fields
/// (name, effect, traits) go through here; rule vocabulary is mapped
/// locally in `mapping`.
pub struct Translator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    texts: &'a [String],
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<String>,
}

impl Translator {
    /// Build from the environment, or None when no endpoint is configured —
    /// records are then stored with their Japanese fields as scraped.
    pub fn from_env() -> Result<Option<Self>> {
        let endpoint = match std::env::var(ENDPOINT_ENV) {
            Ok(url) if !url.is_empty() => url,
            _ => {
                info!("{} not set; card text will be stored untranslated", ENDPOINT_ENV);
                return Ok(None);
            }
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("building translator client")?;
        Ok(Some(Self {
            client,
            endpoint,
            api_key: std::env::var(API_KEY_ENV).ok(),
        }))
    }

    /// Translate a batch of texts in order. The response must keep the
    /// request's cardinality; anything else is an error, never a silent
    /// partial overlay.
    pub async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>> {
        let mut request = self.client.post(&self.endpoint).json(&TranslateRequest {
            texts,
            source_lang,
            target_lang,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("calling translator")?;
        if !response.status().is_success() {
            bail!("translator returned HTTP {}", response.status());
        }
        let body: TranslateResponse =
            response.json().await.context("decoding translator response")?;
        if body.translations.len() != texts.len() {
            bail!(
                "translator returned {} texts for {} inputs",
                body.translations.len(),
                texts.len()
            );
        }
        Ok(body.translations)
    }
}
