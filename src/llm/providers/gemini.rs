use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{DroidClawError, DroidClawResult};
use crate::llm::provider::{read_reply, DecisionTransport};
use crate::llm::types::GenerateRequest;

/// Round-robin API key rotation shared by every direct call in the process.
#[derive(Debug, Default)]
pub struct ApiKeyPool {
    keys: Vec<String>,
    next: AtomicUsize,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keys,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key after the one handed out last, wrapping around.
    pub fn next_key(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        Some(self.keys[slot].as_str())
    }
}

/// Direct `models/{model}:generateContent` transport.
pub struct GeminiTransport {
    api_base: String,
    model: String,
    keys: Arc<ApiKeyPool>,
    client: reqwest::Client,
}

impl GeminiTransport {
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

    fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, self.model)
    }
}

#[async_trait]
impl DecisionTransport for GeminiTransport {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerateRequest) -> DroidClawResult<String> {
        let key = self
            .keys
            .next_key()
            .ok_or_else(|| DroidClawError::Config("no API keys configured".into()))?;

        tracing::debug!(model = %self.model, contents = request.contents.len(), "sending generateContent request");
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", key)
            .json(request)
            .send()
            .await
            .map_err(|e| DroidClawError::Transport(format!("gemini request failed: {e}")))?;
        read_reply(self.name(), response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pool_round_robin() {
        let pool = ApiKeyPool::new(vec!["a".into(), " ".into(), "b".into()]);
        assert_eq!(pool.len(), 2);
        let seen: Vec<&str> = (0..4).filter_map(|_| pool.next_key()).collect();
        assert_eq!(seen, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_empty_pool() {
        assert!(ApiKeyPool::new(Vec::new()).next_key().is_none());
    }
}
