use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{DroidClawError, DroidClawResult};
use crate::llm::providers::gemini::ApiKeyPool;

/// Turns text into a vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> DroidClawResult<Vec<f32>>;
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// `models/{model}:embedContent` client sharing the decision key pool.
pub struct GeminiEmbedder {
    api_base: String,
    model: String,
    keys: Arc<ApiKeyPool>,
    client: reqwest::Client,
}

impl GeminiEmbedder {
    pub fn new(
        api_base: impl Into<String>,
        model: impl Into<String>,
        keys: Arc<ApiKeyPool>,
        timeout: Duration,
    ) -> DroidClawResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
            keys,
            client,
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> DroidClawResult<Vec<f32>> {
        let key = self
            .keys
            .next_key()
            .ok_or_else(|| DroidClawError::Memory("no API key for embeddings".into()))?;
        let url = format!("{}/v1beta/models/{}:embedContent", self.api_base, self.model);
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [ { "text": text } ] },
        });

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(DroidClawError::Memory(format!("embedding request failed {status}: {detail}")));
        }
        let parsed: EmbedResponse = response.json().await?;
        if parsed.embedding.values.is_empty() {
            return Err(DroidClawError::Memory("embedding response was empty".into()));
        }
        Ok(parsed.embedding.values)
    }
}
