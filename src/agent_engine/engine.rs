use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::conversation::{ConversationState, SensitiveDataFilter};
use crate::agent_engine::event_bus::{AgentMessage, EventBus, FailureReason};
use crate::agent_engine::history::SessionLog;
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::prompt::system_prompt;
use crate::agent_engine::state::{
    ActionResult, AgentEvent, AgentOutput, AgentState, LoopConfig, StepInfo, TaskOutcome,
    TaskRequest,
};
use crate::config::AgentConfig;
use crate::errors::{truncate_message, DroidClawError, MAX_ERROR_CHARS};
use crate::executor::dispatcher::ActionExecutor;
use crate::llm::orchestrator::LlmOrchestrator;
use crate::memory::embedder::Embedder;
use crate::memory::index::MemoryIndex;
use crate::memory::writer::{MemoryRecord, MemoryWriter};
use crate::perception::pipeline::ScreenPerceiver;
use crate::perception::types::ScreenAnalysis;

const CANCELLED_SUMMARY: &str = "Task cancelled by operator";

/// Long-term memory used around a task: recall before, write after success.
#[derive(Clone)]
pub struct MemoryHooks {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn MemoryIndex>,
    pub writer: MemoryWriter,
    pub recall_top_k: usize,
    pub min_similarity: f32,
}

/// How one task ended, before it is packed into a [`TaskOutcome`].
struct Finish {
    success: bool,
    summary: String,
    attachments: Vec<String>,
}

impl Finish {
    fn failed(summary: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: summary.into(),
            attachments: Vec::new(),
        }
    }
}

/// Drives the perceive, decide, act cycle for one task at a time.
pub struct AgentEngine {
    state: AgentState,
    perceiver: ScreenPerceiver,
    executor: ActionExecutor,
    orchestrator: LlmOrchestrator,
    loop_config: LoopConfig,
    max_actions_per_step: usize,
    max_history_items: usize,
    filter: SensitiveDataFilter,
    session_log: Option<SessionLog>,
    memory: Option<MemoryHooks>,
    events: EventBus,
    cancel: CancellationToken,
    current_task: String,
}

impl AgentEngine {
    pub fn new(
        perceiver: ScreenPerceiver,
        executor: ActionExecutor,
        orchestrator: LlmOrchestrator,
        agent: &AgentConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: AgentState::Idle,
            perceiver,
            executor,
            orchestrator,
            loop_config: LoopConfig::from_max_steps(agent.max_steps),
            max_actions_per_step: agent.max_actions_per_step.max(1),
            max_history_items: agent.max_history_items,
            filter: SensitiveDataFilter::default(),
            session_log: None,
            memory: None,
            events: EventBus::new(),
            cancel,
            current_task: String::new(),
        }
    }

    pub fn with_loop_config(mut self, loop_config: LoopConfig) -> Self {
        self.loop_config = loop_config;
        self
    }

    pub fn with_sensitive_data(mut self, filter: SensitiveDataFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_session_log(mut self, log: SessionLog) -> Self {
        self.session_log = Some(log);
        self
    }

    pub fn with_memory(mut self, hooks: MemoryHooks) -> Self {
        self.memory = Some(hooks);
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Serve tasks from `rx` one at a time until `Stop`, channel close or
    /// cancellation.
    pub async fn run_loop(&mut self, mut rx: mpsc::Receiver<AgentEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Some(AgentEvent::Task(request)) => {
                    let outcome = self.run_task(&request).await;
                    tracing::info!(
                        task_id = %outcome.task_id,
                        success = outcome.success,
                        steps = outcome.steps,
                        "task finished"
                    );
                }
                Some(AgentEvent::Stop) | None => break,
            }
        }
        tracing::info!("agent loop exited");
    }

    /// Run one task to completion. Errors never abort the task early; they
    /// are recorded in history and the loop continues.
    pub async fn run_task(&mut self, request: &TaskRequest) -> TaskOutcome {
        tracing::info!(task_id = %request.task_id, task = %request.text, "task started");
        self.current_task = request.task_id.clone();
        self.perceiver.reset();
        self.log("task_started", serde_json::json!({ "task": request.text }));

        let mut conversation = ConversationState::new(
            system_prompt(self.max_actions_per_step),
            self.max_history_items,
            self.filter.clone(),
        );
        self.recall_memories(&request.text, &mut conversation).await;

        let max_steps = self.loop_config.max_steps();
        let mut loop_ctrl = LoopController::new(self.loop_config.clone());
        let mut steps_taken = 0u32;

        let finish = loop {
            if self.cancel.is_cancelled() {
                conversation.add_note(steps_taken, CANCELLED_SUMMARY);
                break Finish::failed(CANCELLED_SUMMARY);
            }
            if let Some(reason) = loop_ctrl.stop_reason(steps_taken) {
                tracing::warn!(steps_taken, reason = %reason, "loop limit reached");
                conversation.add_note(steps_taken, reason.clone());
                break Finish::failed(reason);
            }

            steps_taken += 1;
            let step = StepInfo {
                step_number: steps_taken,
                max_steps,
            };

            self.set_state(AgentState::Perceiving);
            let analysis = self.perceiver.perceive().await;
            tracing::debug!(
                step = steps_taken,
                analysis_id = %analysis.analysis_id,
                elements = analysis.element_count(),
                degraded = analysis.degraded,
                "screen perceived"
            );
            conversation.create_state_message(&request.text, &analysis, step);

            self.set_state(AgentState::Deciding);
            let output = match self
                .orchestrator
                .generate_decision(conversation.messages(), &self.cancel)
                .await
            {
                Ok(output) => output,
                Err(DroidClawError::Cancelled) => {
                    conversation.add_note(steps_taken, CANCELLED_SUMMARY);
                    break Finish::failed(CANCELLED_SUMMARY);
                }
                Err(e) => {
                    self.set_state(AgentState::Updating);
                    loop_ctrl.record_failure();
                    let message = truncate_message(&e.to_string(), MAX_ERROR_CHARS);
                    tracing::warn!(step = steps_taken, kind = e.kind(), error = %message, "no decision this step");
                    conversation.update_history(None, &[], step, Some(&message));
                    self.events.send(AgentMessage::DecisionFailed {
                        task_id: request.task_id.clone(),
                        step: steps_taken,
                        reason: FailureReason::from(&e),
                        message: message.clone(),
                    });
                    self.log(
                        "decision_failed",
                        serde_json::json!({ "step": steps_taken, "kind": e.kind(), "error": message }),
                    );
                    continue;
                }
            };
            loop_ctrl.record_success();

            self.set_state(AgentState::Acting);
            let Some(results) = self.act(&output, &analysis).await else {
                conversation.add_note(steps_taken, CANCELLED_SUMMARY);
                break Finish::failed(CANCELLED_SUMMARY);
            };
            drop(analysis);

            self.set_state(AgentState::Updating);
            conversation.update_history(Some(&output), &results, step, None);
            self.record_step(steps_taken, &output, &results);

            if let Some(done) = results.last().filter(|r| r.is_done) {
                break Finish {
                    success: done.success.unwrap_or(false),
                    summary: done.extracted_content.clone().unwrap_or_default(),
                    attachments: done.attachments.clone(),
                };
            }
        };

        self.finish(request, finish, steps_taken, &conversation)
    }

    /// Execute up to `max_actions_per_step` actions in order, stopping after a
    /// terminal result. `None` when cancelled mid-step.
    async fn act(&self, output: &AgentOutput, analysis: &ScreenAnalysis) -> Option<Vec<ActionResult>> {
        if output.actions.len() > self.max_actions_per_step {
            tracing::warn!(
                requested = output.actions.len(),
                allowed = self.max_actions_per_step,
                "dropping actions beyond the per-step limit"
            );
        }

        let mut results = Vec::new();
        for action in output.actions.iter().take(self.max_actions_per_step) {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                r = self.executor.execute(action, analysis) => r,
            };
            let terminal = result.is_done;
            results.push(result);
            if terminal {
                break;
            }
        }
        Some(results)
    }

    fn record_step(&self, step: u32, output: &AgentOutput, results: &[ActionResult]) {
        let actions: Vec<String> = output
            .actions
            .iter()
            .take(results.len())
            .map(|a| a.wire_name().to_string())
            .collect();
        let errors: Vec<String> = results.iter().filter_map(|r| r.error.clone()).collect();

        self.log(
            "step",
            serde_json::json!({
                "step": step,
                "output": output.to_json(),
                "results": results,
            }),
        );
        self.events.send(AgentMessage::StepCompleted {
            task_id: self.current_task.clone(),
            step,
            actions,
            errors,
        });
    }

    fn finish(
        &mut self,
        request: &TaskRequest,
        finish: Finish,
        steps: u32,
        conversation: &ConversationState,
    ) -> TaskOutcome {
        self.set_state(if finish.success {
            AgentState::Done
        } else {
            AgentState::Failed
        });

        self.log(
            "task_finished",
            serde_json::json!({
                "success": finish.success,
                "summary": finish.summary,
                "steps": steps,
            }),
        );
        self.events.send(AgentMessage::TaskFinished {
            task_id: request.task_id.clone(),
            success: finish.success,
            summary: finish.summary.clone(),
            steps,
        });

        if finish.success {
            if let Some(memory) = &self.memory {
                let record = MemoryRecord {
                    task: request.text.clone(),
                    summary: finish.summary.clone(),
                    steps,
                };
                if let Err(e) = memory.writer.submit(record) {
                    tracing::warn!(error = %e, "memory write not queued");
                }
            }
        }

        self.state = AgentState::Idle;
        TaskOutcome {
            task_id: request.task_id.clone(),
            success: finish.success,
            summary: finish.summary,
            attachments: finish.attachments,
            steps,
            history: conversation.history().to_vec(),
        }
    }

    async fn recall_memories(&self, task: &str, conversation: &mut ConversationState) {
        let Some(memory) = &self.memory else {
            return;
        };
        match crate::memory::recall(
            memory.embedder.as_ref(),
            memory.index.as_ref(),
            task,
            memory.recall_top_k,
            memory.min_similarity,
        )
        .await
        {
            Ok(Some(text)) => conversation.add_context_message(text),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "memory recall failed"),
        }
    }

    fn set_state(&mut self, state: AgentState) {
        self.state = state;
        tracing::debug!(?state, "agent state");
        self.events.send(AgentMessage::StateChanged {
            task_id: self.current_task.clone(),
            state,
        });
    }

    fn log(&self, event: &str, payload: serde_json::Value) {
        if let Some(log) = &self.session_log {
            if let Err(e) = log.append(&self.current_task, event, payload) {
                tracing::warn!(event, error = %e, "session log write failed");
            }
        }
    }
}
