use crate::agent_engine::state::{LoopConfig, LoopMode};

/// Decides when a task has to stop for reasons other than a `done` action.
pub struct LoopController {
    config: LoopConfig,
    consecutive_failures: u32,
}

impl LoopController {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Summary for stopping before step `steps_taken + 1`, if the loop must stop.
    pub fn stop_reason(&self, steps_taken: u32) -> Option<String> {
        if let LoopMode::StepLimit { max_steps } = self.config.mode {
            if steps_taken >= max_steps {
                return Some(format!(
                    "Step limit of {max_steps} reached before the task was completed"
                ));
            }
        }
        match self.config.max_failures {
            Some(max) if self.consecutive_failures >= max => Some(format!(
                "Stopped after {} consecutive failed decisions",
                self.consecutive_failures
            )),
            _ => None,
        }
    }
}
