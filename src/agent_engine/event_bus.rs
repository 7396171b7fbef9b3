use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::agent_engine::state::AgentState;
use crate::errors::DroidClawError;

const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    StateChanged {
        task_id: String,
        state: AgentState,
    },
    StepCompleted {
        task_id: String,
        step: u32,
        actions: Vec<String>,
        errors: Vec<String>,
    },
    DecisionFailed {
        task_id: String,
        step: u32,
        reason: FailureReason,
        message: String,
    },
    TaskFinished {
        task_id: String,
        success: bool,
        summary: String,
        steps: u32,
    },
}

/// Why the model produced no usable decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Transport,
    Blocked,
    Decoding,
    Other,
}

impl From<&DroidClawError> for FailureReason {
    fn from(err: &DroidClawError) -> Self {
        match err {
            DroidClawError::Blocked(_) => Self::Blocked,
            DroidClawError::Decoding(_) => Self::Decoding,
            DroidClawError::Transport(_) | DroidClawError::Http(_) => Self::Transport,
            _ => Self::Other,
        }
    }
}

/// Fan-out of loop progress to any number of observers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentMessage> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn send(&self, msg: AgentMessage) -> usize {
        self.tx.send(msg).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
