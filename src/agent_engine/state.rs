use serde::{Deserialize, Serialize};

use crate::agent_engine::history::HistoryItem;
use crate::errors::{truncate_message, DroidClawError, DroidClawResult, MAX_ERROR_CHARS};
use crate::executor::actions::Action;
use crate::executor::registry::decode_action;

/// Lifecycle states of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Perceiving,
    Deciding,
    Acting,
    Updating,
    Done,
    Failed,
}

/// Outcome of one executed action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Short note kept in history.
    pub long_term_memory: Option<String>,
    pub extracted_content: Option<String>,
    /// Extracted content is shown in the next prompt only, then dropped.
    pub include_extracted_content_only_once: bool,
    pub error: Option<String>,
    pub is_done: bool,
    pub success: Option<bool>,
    pub attachments: Vec<String>,
}

impl ActionResult {
    pub fn memory(note: impl Into<String>) -> Self {
        Self {
            long_term_memory: Some(note.into()),
            ..Self::default()
        }
    }

    pub fn one_shot(content: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            long_term_memory: Some(note.into()),
            extracted_content: Some(content.into()),
            include_extracted_content_only_once: true,
            ..Self::default()
        }
    }

    /// Error text is cut to [`MAX_ERROR_CHARS`].
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            error: Some(truncate_message(&message.to_string(), MAX_ERROR_CHARS)),
            ..Self::default()
        }
    }

    pub fn done(success: bool, text: impl Into<String>, attachments: Vec<String>) -> Self {
        Self {
            extracted_content: Some(text.into()),
            is_done: true,
            success: Some(success),
            attachments,
            ..Self::default()
        }
    }
}

/// One decision from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub evaluation_previous_goal: String,
    pub memory: String,
    pub next_goal: String,
    pub actions: Vec<Action>,
}

#[derive(Deserialize)]
struct RawAgentOutput {
    #[serde(default)]
    evaluation_previous_goal: Option<String>,
    #[serde(default)]
    memory: Option<String>,
    #[serde(default)]
    next_goal: Option<String>,
    actions: Vec<serde_json::Value>,
}

impl AgentOutput {
    /// Decode the reply object. Any malformed action fails the whole decision.
    pub fn from_json(value: serde_json::Value) -> DroidClawResult<Self> {
        let raw: RawAgentOutput = serde_json::from_value(value)
            .map_err(|e| DroidClawError::Decoding(format!("invalid agent output: {e}")))?;
        let actions = raw
            .actions
            .iter()
            .map(decode_action)
            .collect::<DroidClawResult<Vec<_>>>()?;
        Ok(Self {
            evaluation_previous_goal: raw.evaluation_previous_goal.unwrap_or_default(),
            memory: raw.memory.unwrap_or_default(),
            next_goal: raw.next_goal.unwrap_or_default(),
            actions,
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "evaluation_previous_goal": self.evaluation_previous_goal,
            "memory": self.memory,
            "next_goal": self.next_goal,
            "actions": self.actions.iter().map(Action::to_wire).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    pub step_number: u32,
    pub max_steps: Option<u32>,
}

impl std::fmt::Display for StepInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max_steps {
            Some(max) => write!(f, "Step {} of {} max possible steps", self.step_number, max),
            None => write!(f, "Step {}", self.step_number),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    pub text: String,
}

impl TaskRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AgentEvent {
    Task(TaskRequest),
    Stop,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub success: bool,
    pub summary: String,
    pub attachments: Vec<String>,
    pub steps: u32,
    pub history: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    pub mode: LoopMode,
    pub max_failures: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    UntilDone,
    StepLimit { max_steps: u32 },
}

impl LoopConfig {
    pub fn from_max_steps(max_steps: Option<u32>) -> Self {
        Self {
            mode: max_steps
                .map(|max_steps| LoopMode::StepLimit { max_steps })
                .unwrap_or(LoopMode::UntilDone),
            max_failures: None,
        }
    }

    pub fn max_steps(&self) -> Option<u32> {
        match self.mode {
            LoopMode::StepLimit { max_steps } => Some(max_steps),
            LoopMode::UntilDone => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_output_decodes_actions_in_order() {
        let out = AgentOutput::from_json(json!({
            "evaluation_previous_goal": "ok",
            "memory": "on home screen",
            "next_goal": "open settings",
            "actions": [ { "tap_element": { "index": 2 } }, { "wait": {} } ]
        }))
        .unwrap();
        assert_eq!(out.actions, vec![Action::TapElement { index: 2 }, Action::Wait]);
        assert_eq!(out.memory, "on home screen");
    }

    #[test]
    fn test_agent_output_missing_actions() {
        let err = AgentOutput::from_json(json!({ "next_goal": "x" })).unwrap_err();
        assert!(matches!(err, DroidClawError::Decoding(_)));
    }

    #[test]
    fn test_agent_output_bad_action_fails_decision() {
        let err = AgentOutput::from_json(json!({ "actions": [ { "foo_bar": {} } ] })).unwrap_err();
        assert!(err.to_string().contains("foo_bar"));
    }

    #[test]
    fn test_error_result_is_truncated() {
        let long = "x".repeat(500);
        let result = ActionResult::error(long);
        assert!(result.error.unwrap().chars().count() <= MAX_ERROR_CHARS);
    }

    #[test]
    fn test_step_info_display() {
        let info = StepInfo { step_number: 3, max_steps: Some(10) };
        assert_eq!(info.to_string(), "Step 3 of 10 max possible steps");
    }

    #[test]
    fn test_loop_config_from_max_steps() {
        assert_eq!(LoopConfig::from_max_steps(Some(5)).max_steps(), Some(5));
        assert_eq!(LoopConfig::from_max_steps(None).mode, LoopMode::UntilDone);
    }
}
