use async_trait::async_trait;

use crate::errors::{DroidClawError, DroidClawResult};
use crate::llm::types::{GenerateRequest, GenerateResponse, ReplyProblem};

/// One way of reaching the decision model. Implementations return the raw
/// reply text; decoding it is the orchestrator's job.
#[async_trait]
pub trait DecisionTransport: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest) -> DroidClawResult<String>;
}

/// Map an HTTP reply to the first candidate's text.
///
/// Non-2xx and empty replies are `Transport` errors; withheld content is `Blocked`.
pub(crate) async fn read_reply(transport: &str, response: reqwest::Response) -> DroidClawResult<String> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DroidClawError::Transport(format!(
            "{transport} returned {status}: {}",
            crate::errors::truncate_message(&body, 300)
        )));
    }

    let parsed: GenerateResponse = response
        .json()
        .await
        .map_err(|e| DroidClawError::Transport(format!("{transport} reply unreadable: {e}")))?;
    match parsed.first_text() {
        Ok(text) => Ok(text),
        Err(ReplyProblem::Blocked(reason)) => Err(DroidClawError::Blocked(reason)),
        Err(ReplyProblem::Empty) => Err(DroidClawError::Transport(format!(
            "{transport} returned no candidate text"
        ))),
    }
}
