use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent_engine::state::AgentOutput;
use crate::config::LlmConfig;
use crate::errors::{truncate_message, DroidClawError, DroidClawResult};
use crate::executor::registry::response_schema;
use crate::llm::provider::DecisionTransport;
use crate::llm::retry::{with_retry, RetryPolicy};
use crate::llm::types::{Content, GenerateRequest, GenerationConfig};

const JSON_MIME: &str = "application/json";

/// Asks the model for the next decision and decodes it.
pub struct LlmOrchestrator {
    transport: Arc<dyn DecisionTransport>,
    policy: RetryPolicy,
    temperature: f32,
}

impl LlmOrchestrator {
    pub fn new(transport: Arc<dyn DecisionTransport>, policy: RetryPolicy, temperature: f32) -> Self {
        Self {
            transport,
            policy,
            temperature,
        }
    }

    pub fn from_config(transport: Arc<dyn DecisionTransport>, config: &LlmConfig) -> Self {
        Self::new(
            transport,
            RetryPolicy::from_config(&config.retry, config.request_timeout_secs),
            config.temperature,
        )
    }

    pub fn build_request(&self, messages: Vec<Content>) -> GenerateRequest {
        GenerateRequest {
            contents: messages,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: JSON_MIME.to_string(),
                response_schema: Some(response_schema()),
            },
        }
    }

    /// Send `messages` and decode the reply. Transport problems are retried;
    /// a reply that does not decode fails immediately.
    pub async fn generate_decision(
        &self,
        messages: Vec<Content>,
        cancel: &CancellationToken,
    ) -> DroidClawResult<AgentOutput> {
        let request = self.build_request(messages);
        let request = &request;
        let reply = with_retry(&self.policy, cancel, |attempt| {
            let transport = self.transport.clone();
            async move {
                tracing::debug!(transport = transport.name(), attempt, "requesting decision");
                transport.generate(request).await
            }
        })
        .await
        .map_err(|e| {
            match &e {
                DroidClawError::Blocked(reason) => {
                    tracing::warn!(reason = %reason, "model reply blocked")
                }
                other => tracing::warn!(kind = other.kind(), error = %other, "no decision from model"),
            }
            e
        })?;

        tracing::debug!(reply = %truncate_message(&reply, 500), "model reply");
        decode_reply(&reply)
    }
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub fn decode_reply(reply: &str) -> DroidClawResult<AgentOutput> {
    let body = strip_code_fence(reply);
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        DroidClawError::Decoding(format!(
            "reply is not JSON ({e}): {}",
            truncate_message(body, 120)
        ))
    })?;
    AgentOutput::from_json(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::actions::Action;
    use crate::llm::provider::DecisionTransport;
    use crate::llm::types::GenerateRequest;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Scripted {
        replies: Mutex<Vec<DroidClawResult<String>>>,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<DroidClawResult<String>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DecisionTransport for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, request: &GenerateRequest) -> DroidClawResult<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(DroidClawError::Transport("script exhausted".into())))
        }
    }

    fn orchestrator(transport: Arc<Scripted>) -> LlmOrchestrator {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            attempt_timeout: Duration::from_secs(1),
        };
        LlmOrchestrator::new(transport, policy, 0.1)
    }

    const VALID: &str = r#"{"evaluation_previous_goal":"","memory":"","next_goal":"tap","actions":[{"tap_element":{"index":1}}]}"#;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[tokio::test]
    async fn test_request_uses_structured_output() {
        let transport = Scripted::new(vec![Ok(VALID.into())]);
        let out = orchestrator(transport.clone())
            .generate_decision(vec![Content::user("hi")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.actions, vec![Action::TapElement { index: 1 }]);

        let seen = transport.seen.lock().unwrap();
        let cfg = &seen[0].generation_config;
        assert_eq!(cfg.response_mime_type, "application/json");
        assert!(cfg.response_schema.is_some());
    }

    #[tokio::test]
    async fn test_fenced_reply_after_transient_failure() {
        let fenced = format!("```json\n{VALID}\n```");
        let transport = Scripted::new(vec![
            Err(DroidClawError::Transport("503".into())),
            Ok(fenced),
        ]);
        let out = orchestrator(transport.clone())
            .generate_decision(vec![Content::user("hi")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.next_goal, "tap");
        assert_eq!(transport.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_prose_reply_fails_without_retry() {
        let transport = Scripted::new(vec![Ok("I will tap the button.".into()), Ok(VALID.into())]);
        let err = orchestrator(transport.clone())
            .generate_decision(vec![Content::user("hi")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DroidClawError::Decoding(_)));
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_three_failures_exhaust_attempts() {
        let transport = Scripted::new(vec![
            Err(DroidClawError::Transport("a".into())),
            Err(DroidClawError::Blocked("SAFETY".into())),
            Err(DroidClawError::Transport("c".into())),
        ]);
        let err = orchestrator(transport.clone())
            .generate_decision(vec![Content::user("hi")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "LLM transport error: c");
        assert_eq!(transport.seen.lock().unwrap().len(), 3);
    }
}
