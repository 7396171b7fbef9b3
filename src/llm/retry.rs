//! Retry with exponential backoff around a single model call.
//!
//! Every attempt is bounded by its own timeout. Transport failures, blocked
//! and empty replies and timeouts are retried; configuration problems and
//! cancellation are not.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::errors::{DroidClawError, DroidClawResult};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(retry: &RetryConfig, request_timeout_secs: u64) -> Self {
        Self {
            max_attempts: retry.max_attempts.max(1),
            initial_delay: Duration::from_millis(retry.initial_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            attempt_timeout: Duration::from_secs(request_timeout_secs),
        }
    }

    /// Delay before retrying after failed attempt `attempt` (1-based): the
    /// initial delay doubled per prior attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

fn is_retryable(err: &DroidClawError) -> bool {
    matches!(
        err,
        DroidClawError::Transport(_) | DroidClawError::Blocked(_) | DroidClawError::Http(_)
    )
}

/// Run `operation` until it succeeds, a non-retryable error occurs, attempts
/// run out (the last error is returned) or `cancel` fires.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> DroidClawResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DroidClawResult<T>>,
{
    let mut attempt = 1;
    loop {
        tracing::debug!(attempt, max_attempts = policy.max_attempts, "model call attempt");

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(DroidClawError::Cancelled),
            r = tokio::time::timeout(policy.attempt_timeout, operation(attempt)) => r,
        };

        let err = match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    tracing::info!(attempt, "model call succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(_) => DroidClawError::Transport(format!(
                "attempt timed out after {}s",
                policy.attempt_timeout.as_secs()
            )),
        };

        if !is_retryable(&err) {
            tracing::debug!(error = %err, "error is not retryable");
            return Err(err);
        }
        if attempt >= policy.max_attempts {
            tracing::warn!(attempt, kind = err.kind(), error = %err, "model call attempts exhausted");
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            attempt,
            kind = err.kind(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "model call failed, backing off"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(DroidClawError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
