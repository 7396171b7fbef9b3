//! Per-task conversation state: system prompt, step history, transient
//! context and the one-shot read buffer, plus the outbound message list.

use crate::agent_engine::history::{HistoryItem, HistoryKind};
use crate::agent_engine::state::{ActionResult, AgentOutput, StepInfo};
use crate::errors::{truncate_message, MAX_ERROR_CHARS};
use crate::llm::types::Content;
use crate::perception::types::ScreenAnalysis;

const NOT_ASKED_YET: &str = "Agent has not been asked for a decision yet";
const INVALID_OUTPUT: &str = "Agent failed to produce valid output";

/// Replaces configured secret values with `<secret>NAME</secret>`.
#[derive(Debug, Clone, Default)]
pub struct SensitiveDataFilter {
    /// (name, value), longest value first.
    secrets: Vec<(String, String)>,
}

impl SensitiveDataFilter {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut secrets: Vec<(String, String)> = entries
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();
        secrets.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        Self { secrets }
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, value) in &self.secrets {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), &format!("<secret>{name}</secret>"));
            }
        }
        out
    }
}

pub struct ConversationState {
    system_message: String,
    state_message: Option<String>,
    context_messages: Vec<String>,
    history: Vec<HistoryItem>,
    read_state: Option<String>,
    max_history_items: usize,
    filter: SensitiveDataFilter,
}

impl ConversationState {
    pub fn new(system_message: String, max_history_items: usize, filter: SensitiveDataFilter) -> Self {
        Self {
            system_message,
            state_message: None,
            context_messages: Vec::new(),
            history: Vec::new(),
            read_state: None,
            max_history_items: max_history_items.max(1),
            filter,
        }
    }

    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    pub fn read_state(&self) -> Option<&str> {
        self.read_state.as_deref()
    }

    pub fn context_messages(&self) -> &[String] {
        &self.context_messages
    }

    /// Extra message for the next request only.
    pub fn add_context_message(&mut self, text: impl Into<String>) {
        self.context_messages.push(text.into());
    }

    /// Record a note that is not tied to a model decision (cancellation, limits).
    pub fn add_note(&mut self, step_number: u32, note: impl Into<String>) {
        self.history.push(HistoryItem::note(step_number, note));
    }

    /// Append exactly one history item for the step that just ran.
    pub fn update_history(
        &mut self,
        output: Option<&AgentOutput>,
        results: &[ActionResult],
        step: StepInfo,
        failure: Option<&str>,
    ) {
        self.read_state = None;

        let item = match output {
            None => {
                let base = if step.step_number <= 1 {
                    NOT_ASKED_YET
                } else {
                    INVALID_OUTPUT
                };
                let text = match failure {
                    Some(cause) => format!("{base}: {}", truncate_message(cause, MAX_ERROR_CHARS)),
                    None => base.to_string(),
                };
                HistoryItem::error(step.step_number, text)
            }
            Some(output) => HistoryItem {
                step_number: step.step_number,
                kind: HistoryKind::Outcome {
                    evaluation_previous_goal: output.evaluation_previous_goal.clone(),
                    memory: output.memory.clone(),
                    next_goal: output.next_goal.clone(),
                    action_results: summarize_results(results),
                },
            },
        };
        self.history.push(item);

        let one_shot: Vec<&str> = results
            .iter()
            .filter(|r| r.include_extracted_content_only_once)
            .filter_map(|r| r.extracted_content.as_deref())
            .collect();
        if !one_shot.is_empty() {
            self.read_state = Some(one_shot.join("\n"));
        }

        self.context_messages.clear();
    }

    /// First item, an omission marker and the newest `cap - 1` items once the
    /// history outgrows the cap.
    pub fn render_history(&self) -> String {
        let cap = self.max_history_items;
        let total = self.history.len();
        if total <= cap {
            return self
                .history
                .iter()
                .map(HistoryItem::render)
                .collect::<Vec<_>>()
                .join("\n");
        }

        let omitted = total - cap;
        let mut parts = Vec::with_capacity(cap + 1);
        parts.push(self.history[0].render());
        parts.push(format!("<sys>[... {omitted} previous steps omitted...]</sys>"));
        parts.extend(self.history[total - (cap - 1)..].iter().map(HistoryItem::render));
        parts.join("\n")
    }

    /// Rebuild the state message for the coming decision.
    pub fn create_state_message(&mut self, task: &str, analysis: &ScreenAnalysis, step: StepInfo) {
        let date = chrono::Local::now().format("%Y-%m-%d %H:%M");
        let keyboard = if analysis.keyboard_visible { "open" } else { "closed" };
        let activity = if analysis.foreground_activity.is_empty() {
            "unknown"
        } else {
            analysis.foreground_activity.as_str()
        };

        let mut message = format!(
            "<agent_history>\n{}\n</agent_history>\n\
             <agent_state>\n<user_request>\n{task}\n</user_request>\n\
             <step_info>\n{step}. Today's date: {date}\n</step_info>\n</agent_state>\n\
             <android_state>\nCurrent activity: {activity}\nKeyboard: {keyboard}\n\
             Interactive elements:\n{}\n</android_state>",
            self.render_history(),
            analysis.ui_representation,
        );
        if let Some(read) = &self.read_state {
            message.push_str(&format!("\n<read_state>\n{read}\n</read_state>"));
        }
        self.state_message = Some(message);
    }

    /// Outbound messages, all as user contents, with secrets masked.
    pub fn messages(&self) -> Vec<Content> {
        std::iter::once(&self.system_message)
            .chain(self.state_message.iter())
            .chain(self.context_messages.iter())
            .map(|text| Content::user(self.filter.apply(text)))
            .collect()
    }
}

/// `Action i/N: ...` lines for every result that has something to say.
fn summarize_results(results: &[ActionResult]) -> String {
    let total = results.len();
    results
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let text = if let Some(memory) = &r.long_term_memory {
                memory.clone()
            } else if let (Some(content), false) =
                (&r.extracted_content, r.include_extracted_content_only_once)
            {
                content.clone()
            } else if let Some(error) = &r.error {
                format!("Error: {}", truncate_message(error, MAX_ERROR_CHARS))
            } else {
                return None;
            };
            Some(format!("Action {}/{total}: {text}", i + 1))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
