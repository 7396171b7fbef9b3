use async_trait::async_trait;

use crate::errors::DroidClawResult;

/// Voice/text channel to the person the agent works for.
#[async_trait]
pub trait UserChannel: Send + Sync {
    /// Deliver a message without waiting for a reply.
    async fn speak(&self, text: &str) -> DroidClawResult<()>;

    /// Ask a question and wait for the answer.
    async fn ask(&self, question: &str) -> DroidClawResult<String>;
}
