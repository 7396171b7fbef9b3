//! Entry point for externally triggered tasks.
//!
//! Alarms, notifications and similar sources all go through
//! [`TaskDispatcher::submit`], which drops repeats of the same task text inside
//! the debounce window before handing the task to the agent loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agent_engine::state::{AgentEvent, TaskRequest};
use crate::config::TriggerConfig;
use crate::errors::{DroidClawError, DroidClawResult};

/// Re-arms periodic triggers after they fire.
#[async_trait]
pub trait TriggerScheduler: Send + Sync {
    async fn reschedule(&self, trigger_id: &str) -> DroidClawResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Dispatched { task_id: String },
    Debounced,
}

pub struct TaskDispatcher {
    tx: mpsc::Sender<AgentEvent>,
    recent: DashMap<String, Instant>,
    window: Duration,
    scheduler: Option<Arc<dyn TriggerScheduler>>,
}

impl TaskDispatcher {
    pub fn new(tx: mpsc::Sender<AgentEvent>, window: Duration) -> Self {
        Self {
            tx,
            recent: DashMap::new(),
            window,
            scheduler: None,
        }
    }

    pub fn from_config(tx: mpsc::Sender<AgentEvent>, config: &TriggerConfig) -> Self {
        Self::new(tx, Duration::from_secs(config.debounce_secs))
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn TriggerScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Hand `task` to the agent loop unless the same text was accepted within
    /// the window. A trigger id is rescheduled either way; a `Security` error
    /// from the scheduler is returned, other scheduler errors are only logged.
    pub async fn submit(&self, task: &str, trigger_id: Option<&str>) -> DroidClawResult<SubmitOutcome> {
        let outcome = if !self.accept(task) {
            tracing::info!(task, trigger_id, "task debounced");
            SubmitOutcome::Debounced
        } else {
            let request = TaskRequest::new(task);
            let task_id = request.task_id.clone();
            if self.tx.send(AgentEvent::Task(request)).await.is_err() {
                self.recent.remove(task);
                return Err(DroidClawError::Executor("agent loop is not running".into()));
            }
            tracing::info!(task, trigger_id, %task_id, "task dispatched");
            SubmitOutcome::Dispatched { task_id }
        };

        if let (Some(id), Some(scheduler)) = (trigger_id, &self.scheduler) {
            match scheduler.reschedule(id).await {
                Ok(()) => tracing::debug!(trigger_id = id, "trigger rescheduled"),
                Err(e @ DroidClawError::Security(_)) => {
                    tracing::error!(trigger_id = id, error = %e, "trigger reschedule refused");
                    return Err(e);
                }
                Err(e) => tracing::warn!(trigger_id = id, error = %e, "trigger reschedule failed"),
            }
        }
        Ok(outcome)
    }

    /// Record `task` as accepted now, unless it already was within the window.
    fn accept(&self, task: &str) -> bool {
        let now = Instant::now();
        let window = self.window;
        self.recent.retain(|_, seen| now.duration_since(*seen) < window);

        let mut accepted = false;
        self.recent.entry(task.to_string()).or_insert_with(|| {
            accepted = true;
            now
        });
        accepted
    }

    pub fn pending_keys(&self) -> usize {
        self.recent.len()
    }
}
