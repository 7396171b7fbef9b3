use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::errors::{DroidClawError, DroidClawResult};
use crate::llm::provider::DecisionTransport;
use crate::llm::providers::gemini::{ApiKeyPool, GeminiTransport};
use crate::llm::providers::proxy::ProxyTransport;

/// Pick the transport for this process: a configured proxy wins, otherwise
/// direct calls rotating through `keys`.
pub fn select_transport(
    config: &LlmConfig,
    keys: Arc<ApiKeyPool>,
) -> DroidClawResult<Arc<dyn DecisionTransport>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    if let Some(proxy) = config.proxy.as_ref().filter(|p| p.is_configured()) {
        tracing::info!(endpoint = %proxy.endpoint, "using proxy transport");
        let transport =
            ProxyTransport::new(&proxy.endpoint, &proxy.shared_key, &config.model, timeout)?;
        return Ok(Arc::new(transport));
    }

    if keys.is_empty() {
        return Err(DroidClawError::Config(
            "no LLM transport: configure [llm.proxy] or at least one API key".into(),
        ));
    }
    tracing::info!(model = %config.model, keys = keys.len(), "using direct transport");
    let transport = GeminiTransport::new(&config.api_base, &config.model, keys, timeout)?;
    Ok(Arc::new(transport))
}
