use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::DroidClawResult;

/// One entry of the agent's step history. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub step_number: u32,
    #[serde(flatten)]
    pub kind: HistoryKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryKind {
    Outcome {
        evaluation_previous_goal: String,
        memory: String,
        next_goal: String,
        action_results: String,
    },
    Error {
        error: String,
    },
    SystemNote {
        note: String,
    },
}

impl HistoryItem {
    pub fn error(step_number: u32, error: impl Into<String>) -> Self {
        Self {
            step_number,
            kind: HistoryKind::Error { error: error.into() },
        }
    }

    pub fn note(step_number: u32, note: impl Into<String>) -> Self {
        Self {
            step_number,
            kind: HistoryKind::SystemNote { note: note.into() },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, HistoryKind::Error { .. })
    }

    /// Prompt form of the item.
    pub fn render(&self) -> String {
        let n = self.step_number;
        match &self.kind {
            HistoryKind::Outcome {
                evaluation_previous_goal,
                memory,
                next_goal,
                action_results,
            } => {
                let mut lines = Vec::new();
                if !evaluation_previous_goal.is_empty() {
                    lines.push(format!("Evaluation of Previous Step: {evaluation_previous_goal}"));
                }
                if !memory.is_empty() {
                    lines.push(format!("Memory: {memory}"));
                }
                if !next_goal.is_empty() {
                    lines.push(format!("Next Goal: {next_goal}"));
                }
                if !action_results.is_empty() {
                    lines.push(action_results.clone());
                }
                format!("<step_{n}>\n{}\n</step_{n}>", lines.join("\n"))
            }
            HistoryKind::Error { error } => format!("<step_{n}>\n{error}\n</step_{n}>"),
            HistoryKind::SystemNote { note } => format!("<sys>\n{note}\n</sys>"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: i64,
    pub task_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// JSONL record of every task and step, one file per process session.
pub struct SessionLog {
    pub session_id: String,
    file_path: PathBuf,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::in_dir(&sessions_dir())
    }

    pub fn in_dir(dir: &Path) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot create session dir");
        }
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Append one line to the log file.
    pub fn append(
        &self,
        task_id: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> DroidClawResult<()> {
        let entry = LogEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            task_id: task_id.to_string(),
            event: event.to_string(),
            payload,
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{line}")?;
        tracing::debug!(path = %self.file_path.display(), event, "session entry flushed");
        Ok(())
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

/// `<data_local_dir>/droidclaw/sessions`, falling back to the working directory.
fn sessions_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("droidclaw").join("sessions"))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
