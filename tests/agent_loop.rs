//! End-to-end runs of the agent loop against scripted collaborators.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use droidclaw::agent_engine::conversation::SensitiveDataFilter;
use droidclaw::agent_engine::engine::{AgentEngine, MemoryHooks};
use droidclaw::agent_engine::event_bus::{AgentMessage, FailureReason};
use droidclaw::agent_engine::history::{HistoryKind, SessionLog};
use droidclaw::agent_engine::state::{AgentEvent, LoopConfig, TaskRequest};
use droidclaw::config::AgentConfig;
use droidclaw::errors::{DroidClawError, DroidClawResult};
use droidclaw::executor::apps::{AppCatalog, InstalledApp};
use droidclaw::executor::dispatcher::{ActionExecutor, Collaborators, ExecutorSettings};
use droidclaw::executor::files::WorkspaceFiles;
use droidclaw::executor::input::Finger;
use droidclaw::executor::intents::IntentDescriptor;
use droidclaw::executor::user::UserChannel;
use droidclaw::llm::orchestrator::LlmOrchestrator;
use droidclaw::llm::provider::DecisionTransport;
use droidclaw::llm::retry::RetryPolicy;
use droidclaw::llm::types::GenerateRequest;
use droidclaw::memory::embedder::Embedder;
use droidclaw::memory::index::{JsonlMemoryIndex, MemoryIndex};
use droidclaw::memory::writer::MemoryWriter;
use droidclaw::perception::pipeline::{ScreenPerceiver, EMPTY_SCREEN};
use droidclaw::perception::traits::Eyes;
use droidclaw::AgentHandle;

const INBOX_SCREEN: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node class="android.widget.FrameLayout" bounds="[0,0][1080,2400]" enabled="true">
    <node text="Search" class="android.widget.Button" clickable="true" enabled="true" bounds="[0,0][100,100]" />
    <node text="Inbox" class="android.widget.Button" clickable="true" enabled="true" bounds="[0,100][100,200]" />
    <node text="Compose" resource-id="com.mail:id/compose" class="android.widget.Button" clickable="true" enabled="true" bounds="[100,200][300,400]" />
  </node>
</hierarchy>"#;

const EMPTY_DUMP: &str = r#"<hierarchy rotation="0"></hierarchy>"#;

const DONE: &str = r#"{"evaluation_previous_goal":"Success","memory":"","next_goal":"finish","actions":[{"done":{"success":true,"text":"all done"}}]}"#;

fn decision(actions: &str) -> String {
    format!(r#"{{"evaluation_previous_goal":"Unknown","memory":"working","next_goal":"continue","actions":{actions}}}"#)
}

struct StaticEyes {
    dump: Option<String>,
}

#[async_trait]
impl Eyes for StaticEyes {
    async fn raw_tree(&self) -> Option<String> {
        self.dump.clone()
    }
    async fn keyboard_visible(&self) -> bool {
        false
    }
    async fn foreground_activity(&self) -> String {
        "com.mail/.InboxActivity".into()
    }
}

#[derive(Default)]
struct RecordingFinger {
    calls: Mutex<Vec<String>>,
}

impl RecordingFinger {
    fn log(&self, call: impl Into<String>) -> DroidClawResult<()> {
        self.calls.lock().unwrap().push(call.into());
        Ok(())
    }
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Finger for RecordingFinger {
    async fn tap(&self, x: i32, y: i32) -> DroidClawResult<()> {
        self.log(format!("tap {x} {y}"))
    }
    async fn long_press(&self, x: i32, y: i32) -> DroidClawResult<()> {
        self.log(format!("long_press {x} {y}"))
    }
    async fn type_text(&self, text: &str) -> DroidClawResult<()> {
        self.log(format!("type {text}"))
    }
    async fn press_enter(&self) -> DroidClawResult<()> {
        self.log("enter")
    }
    async fn scroll_up(&self, amount: u32) -> DroidClawResult<()> {
        self.log(format!("scroll_up {amount}"))
    }
    async fn scroll_down(&self, amount: u32) -> DroidClawResult<()> {
        self.log(format!("scroll_down {amount}"))
    }
    async fn back(&self) -> DroidClawResult<()> {
        self.log("back")
    }
    async fn home(&self) -> DroidClawResult<()> {
        self.log("home")
    }
    async fn switch_app(&self) -> DroidClawResult<()> {
        self.log("switch_app")
    }
    async fn open_app(&self, package: &str) -> DroidClawResult<bool> {
        self.log(format!("open {package}"))?;
        Ok(true)
    }
    async fn launch_intent(&self, intent: &IntentDescriptor) -> DroidClawResult<bool> {
        self.log(format!("intent {}", intent.action))?;
        Ok(true)
    }
}

struct NoApps;

#[async_trait]
impl AppCatalog for NoApps {
    async fn installed_apps(&self) -> DroidClawResult<Vec<InstalledApp>> {
        Ok(Vec::new())
    }
}

struct SilentUser;

#[async_trait]
impl UserChannel for SilentUser {
    async fn speak(&self, _text: &str) -> DroidClawResult<()> {
        Ok(())
    }
    async fn ask(&self, _question: &str) -> DroidClawResult<String> {
        Ok("yes".into())
    }
}

/// Replays scripted replies, then answers `done`.
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<DroidClawResult<String>>>,
    seen: Mutex<Vec<String>>,
    hang: bool,
}

impl ScriptedModel {
    fn new(replies: Vec<DroidClawResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    /// Prompt text of every request, system message included.
    fn prompts(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionTransport for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> DroidClawResult<String> {
        let prompt: Vec<String> = request.contents.iter().map(|c| c.text()).collect();
        self.seen.lock().unwrap().push(prompt.join("\n"));
        if self.hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(DONE.to_string()))
    }
}

struct Harness {
    engine: AgentEngine,
    finger: Arc<RecordingFinger>,
    model: Arc<ScriptedModel>,
    cancel: CancellationToken,
    workspace: tempfile::TempDir,
}

fn harness_with(model: Arc<ScriptedModel>, dump: Option<&str>, agent: AgentConfig) -> Harness {
    let finger = Arc::new(RecordingFinger::default());
    let workspace = tempfile::tempdir().unwrap();
    let collaborators = Collaborators {
        finger: finger.clone(),
        apps: Arc::new(NoApps),
        files: Arc::new(WorkspaceFiles::new(workspace.path())),
        user: Arc::new(SilentUser),
    };
    let perceiver = ScreenPerceiver::new(
        Arc::new(StaticEyes {
            dump: dump.map(str::to_string),
        }),
        Some((1080, 2400)),
    );
    let executor = ActionExecutor::new(collaborators, ExecutorSettings::from(&agent));
    let policy = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        attempt_timeout: Duration::from_secs(60),
    };
    let orchestrator = LlmOrchestrator::new(model.clone(), policy, 0.0);
    let cancel = CancellationToken::new();
    let engine = AgentEngine::new(perceiver, executor, orchestrator, &agent, cancel.clone());
    Harness {
        engine,
        finger,
        model,
        cancel,
        workspace,
    }
}

fn fast_agent() -> AgentConfig {
    AgentConfig {
        settle_delay_ms: 1,
        wait_delay_ms: 1,
        ..AgentConfig::default()
    }
}

fn harness(replies: Vec<DroidClawResult<String>>) -> Harness {
    harness_with(ScriptedModel::new(replies), Some(INBOX_SCREEN), fast_agent())
}

#[tokio::test]
async fn test_tap_by_index_hits_element_center() {
    let mut h = harness(vec![Ok(decision(r#"[{"tap_element":{"index":3}}]"#))]);

    let outcome = h.engine.run_task(&TaskRequest::new("compose an email")).await;

    assert!(outcome.success);
    assert_eq!(outcome.summary, "all done");
    assert_eq!(outcome.steps, 2);
    assert_eq!(h.finger.calls(), vec!["tap 200 300"]);
    match &outcome.history[0].kind {
        HistoryKind::Outcome { action_results, .. } => {
            assert!(action_results.starts_with("Action 1/1: Tapped element [3]"));
        }
        other => panic!("unexpected history item: {other:?}"),
    }
    // The second prompt sees the first step's outcome.
    assert!(h.model.prompts()[1].contains("<step_1>"));
}

#[tokio::test]
async fn test_unknown_action_is_recorded_and_loop_continues() {
    let mut h = harness(vec![Ok(decision(r#"[{"foo_bar":{}}]"#))]);

    let outcome = h.engine.run_task(&TaskRequest::new("do something")).await;

    assert!(outcome.success);
    assert_eq!(outcome.steps, 2);
    assert!(outcome.history[0].is_error());
    match &outcome.history[0].kind {
        HistoryKind::Error { error } => assert!(error.contains("foo_bar")),
        other => panic!("unexpected history item: {other:?}"),
    }
    assert!(h.model.prompts()[1].contains("foo_bar"));
    assert!(h.finger.calls().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_skip_the_step() {
    let mut h = harness(vec![
        Err(DroidClawError::Transport("first".into())),
        Err(DroidClawError::Transport("second".into())),
        Err(DroidClawError::Transport("third".into())),
    ]);
    let mut events = h.engine.events().subscribe();

    let outcome = h.engine.run_task(&TaskRequest::new("do something")).await;

    assert!(outcome.success);
    assert_eq!(outcome.steps, 2);
    assert_eq!(h.model.prompts().len(), 4);
    match &outcome.history[0].kind {
        HistoryKind::Error { error } => assert!(error.contains("LLM transport error: third")),
        other => panic!("unexpected history item: {other:?}"),
    }

    let mut saw_failure = false;
    while let Ok(msg) = events.try_recv() {
        if let AgentMessage::DecisionFailed { reason, step, .. } = msg {
            assert_eq!(reason, FailureReason::Transport);
            assert_eq!(step, 1);
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn test_read_file_content_is_shown_once() {
    let mut h = harness(vec![
        Ok(decision(r#"[{"read_file":{"file_name":"notes.txt"}}]"#)),
        Ok(decision(r#"[{"wait":{}}]"#)),
    ]);
    std::fs::write(h.workspace.path().join("notes.txt"), "buy milk").unwrap();

    let outcome = h.engine.run_task(&TaskRequest::new("check my notes")).await;

    assert!(outcome.success);
    let prompts = h.model.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains("<read_state>"));
    assert!(prompts[1].contains("<read_state>"));
    assert!(prompts[1].contains("buy milk"));
    assert!(!prompts[2].contains("<read_state>"));
}

#[tokio::test]
async fn test_empty_screen_uses_sentinel() {
    let mut h = harness_with(ScriptedModel::new(Vec::new()), Some(EMPTY_DUMP), fast_agent());

    let outcome = h.engine.run_task(&TaskRequest::new("look around")).await;

    assert!(outcome.success);
    assert!(h.model.prompts()[0].contains(EMPTY_SCREEN));
}

#[tokio::test]
async fn test_unreadable_screen_still_reaches_the_model() {
    let mut h = harness_with(ScriptedModel::new(Vec::new()), None, fast_agent());

    let outcome = h.engine.run_task(&TaskRequest::new("look around")).await;

    assert!(outcome.success);
    assert!(h.model.prompts()[0].contains("Screen reader service is not available"));
}

#[tokio::test]
async fn test_step_limit_fails_task() {
    let model = ScriptedModel::new(vec![
        Ok(decision(r#"[{"back":{}}]"#)),
        Ok(decision(r#"[{"back":{}}]"#)),
        Ok(decision(r#"[{"back":{}}]"#)),
    ]);
    let h = harness_with(model, Some(INBOX_SCREEN), fast_agent());
    let mut engine = h.engine.with_loop_config(LoopConfig::from_max_steps(Some(2)));

    let outcome = engine.run_task(&TaskRequest::new("go back forever")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.steps, 2);
    assert!(outcome.summary.contains("Step limit of 2"));
    assert!(matches!(
        outcome.history.last().map(|i| &i.kind),
        Some(HistoryKind::SystemNote { .. })
    ));
    assert_eq!(h.finger.calls(), vec!["back", "back"]);
    assert!(h.model.prompts()[1].contains("Step 2 of 2 max possible steps"));
}

#[tokio::test]
async fn test_actions_are_capped_per_step() {
    let agent = AgentConfig {
        max_actions_per_step: 2,
        ..fast_agent()
    };
    let model = ScriptedModel::new(vec![Ok(decision(
        r#"[{"back":{}},{"home":{}},{"switch_app":{}}]"#,
    ))]);
    let mut h = harness_with(model, Some(INBOX_SCREEN), agent);

    h.engine.run_task(&TaskRequest::new("navigate")).await;

    assert_eq!(h.finger.calls(), vec!["back", "home"]);
}

#[tokio::test]
async fn test_done_stops_remaining_actions() {
    let mut h = harness(vec![Ok(decision(
        r#"[{"back":{}},{"done":{"success":false,"text":"gave up"}},{"home":{}}]"#,
    ))]);

    let outcome = h.engine.run_task(&TaskRequest::new("navigate")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.summary, "gave up");
    assert_eq!(outcome.steps, 1);
    assert_eq!(h.finger.calls(), vec!["back"]);
}

#[tokio::test]
async fn test_cancellation_interrupts_model_call() {
    let model = Arc::new(ScriptedModel {
        hang: true,
        ..ScriptedModel::default()
    });
    let mut h = harness_with(model, Some(INBOX_SCREEN), fast_agent());
    let cancel = h.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        h.engine.run_task(&TaskRequest::new("wait forever")),
    )
    .await
    .expect("cancellation should end the task");

    assert!(!outcome.success);
    assert_eq!(outcome.summary, "Task cancelled by operator");
}

#[tokio::test]
async fn test_secrets_never_leave_the_process() {
    let h = harness(Vec::new());
    let mut engine = h.engine.with_sensitive_data(SensitiveDataFilter::new([(
        "PIN".to_string(),
        "4921".to_string(),
    )]));

    engine.run_task(&TaskRequest::new("unlock the phone with 4921")).await;

    let prompt = &h.model.prompts()[0];
    assert!(prompt.contains("<secret>PIN</secret>"));
    assert!(!prompt.contains("4921"));
}

#[tokio::test]
async fn test_session_log_records_task() {
    let logs = tempfile::tempdir().unwrap();
    let log = SessionLog::in_dir(logs.path());
    let path = log.path().to_path_buf();
    let h = harness(vec![Ok(decision(r#"[{"wait":{}}]"#))]);
    let mut engine = h.engine.with_session_log(log);

    engine.run_task(&TaskRequest::new("wait a bit")).await;

    let content = std::fs::read_to_string(path).unwrap();
    let events: Vec<String> = content
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["event"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(events, vec!["task_started", "step", "step", "task_finished"]);
}

#[tokio::test]
async fn test_run_loop_serves_tasks_until_stop() {
    let h = harness(Vec::new());
    let mut engine = h.engine;
    let mut events = engine.events().subscribe();
    let (tx, rx) = mpsc::channel(4);
    let handle = AgentHandle {
        tx,
        cancel: h.cancel.clone(),
    };
    let worker = tokio::spawn(async move { engine.run_loop(rx).await });

    let first = handle.submit("first").await.unwrap();
    let second = handle.submit("second").await.unwrap();
    assert_ne!(first, second);

    let mut finished = Vec::new();
    while finished.len() < 2 {
        let msg = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        if let AgentMessage::TaskFinished { task_id, success: true, .. } = msg {
            finished.push(task_id);
        }
    }
    assert_eq!(finished, vec![first, second]);

    handle.stop().await;
    tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
    assert_eq!(h.model.prompts().len(), 2);
    assert!(handle.submit("third").await.is_err());
}

#[tokio::test]
async fn test_repeated_trigger_runs_task_once() {
    use droidclaw::triggers::{SubmitOutcome, TaskDispatcher};

    let h = harness(Vec::new());
    let mut engine = h.engine;
    let (tx, rx) = mpsc::channel(4);
    let dispatcher = TaskDispatcher::new(tx.clone(), Duration::from_secs(60));

    let first = dispatcher.submit("read the news", Some("morning")).await.unwrap();
    let second = dispatcher.submit("read the news", Some("morning")).await.unwrap();
    assert!(matches!(first, SubmitOutcome::Dispatched { .. }));
    assert_eq!(second, SubmitOutcome::Debounced);

    tx.send(AgentEvent::Stop).await.unwrap();
    engine.run_loop(rx).await;
    assert_eq!(h.model.prompts().len(), 1);
}

/// Embeds by counting a couple of keywords.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> DroidClawResult<Vec<f32>> {
        let t = text.to_lowercase();
        Ok(["wifi", "alarm"]
            .iter()
            .map(|k| t.matches(k).count() as f32 + 0.01)
            .collect())
    }
}

async fn memory_engine(path: &std::path::Path) -> (Harness, tokio::task::JoinHandle<()>) {
    let mut h = harness(Vec::new());
    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder);
    let index: Arc<dyn MemoryIndex> = Arc::new(JsonlMemoryIndex::open(path).await.unwrap());
    let (writer, _errors, handle) = MemoryWriter::spawn(embedder.clone(), index.clone(), 0.85);
    h.engine = h.engine.with_memory(MemoryHooks {
        embedder,
        index,
        writer,
        recall_top_k: 3,
        min_similarity: 0.6,
    });
    (h, handle)
}

#[tokio::test]
async fn test_memory_carries_over_to_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory").join("index.jsonl");

    let (mut first, writer) = memory_engine(&path).await;
    assert!(first.engine.run_task(&TaskRequest::new("turn on wifi")).await.success);
    assert!(!first.model.prompts()[0].contains("Experience from earlier tasks"));
    drop(first);
    tokio::time::timeout(Duration::from_secs(5), writer).await.unwrap().unwrap();
    assert_eq!(JsonlMemoryIndex::open(&path).await.unwrap().len().await, 1);

    let (mut second, writer) = memory_engine(&path).await;
    second.engine.run_task(&TaskRequest::new("turn on wifi again")).await;
    let prompt = &second.model.prompts()[0];
    assert!(prompt.contains("Experience from earlier tasks"));
    assert!(prompt.contains("Task: turn on wifi; Outcome: all done"));
    drop(second);
    tokio::time::timeout(Duration::from_secs(5), writer).await.unwrap().unwrap();

    let (mut unrelated, _writer) = memory_engine(&path).await;
    unrelated.engine.run_task(&TaskRequest::new("set an alarm")).await;
    assert!(!unrelated.model.prompts()[0].contains("Experience from earlier tasks"));
}
