use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::{DroidClawError, DroidClawResult};
use crate::llm::provider::{read_reply, DecisionTransport};
use crate::llm::types::GenerateRequest;

pub const PROXY_KEY_HEADER: &str = "x-proxy-key";

#[derive(Serialize)]
struct ProxyRequest<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a GenerateRequest,
}

/// Forwards requests to a relay that holds the real credentials.
pub struct ProxyTransport {
    endpoint: String,
    shared_key: String,
    model: String,
    client: reqwest::Client,
}

impl ProxyTransport {
    pub fn new(
        endpoint: impl Into<String>,
        shared_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> DroidClawResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            shared_key: shared_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl DecisionTransport for ProxyTransport {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn generate(&self, request: &GenerateRequest) -> DroidClawResult<String> {
        tracing::debug!(endpoint = %self.endpoint, "sending proxied generate request");
        let body = ProxyRequest {
            model: &self.model,
            request,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header(PROXY_KEY_HEADER, &self.shared_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DroidClawError::Transport(format!("proxy request failed: {e}")))?;
        read_reply(self.name(), response).await
    }
}
