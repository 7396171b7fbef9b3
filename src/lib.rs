pub mod agent_engine;
pub mod config;
pub mod device;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod memory;
pub mod perception;
pub mod triggers;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::conversation::SensitiveDataFilter;
use crate::agent_engine::engine::{AgentEngine, MemoryHooks};
use crate::agent_engine::history::SessionLog;
use crate::agent_engine::state::{AgentEvent, TaskRequest};
use crate::config::AppConfig;
use crate::errors::{DroidClawError, DroidClawResult};
use crate::executor::dispatcher::{ActionExecutor, Collaborators, ExecutorSettings};
use crate::llm::orchestrator::LlmOrchestrator;
use crate::llm::providers::gemini::ApiKeyPool;
use crate::llm::registry::select_transport;
use crate::memory::embedder::GeminiEmbedder;
use crate::memory::index::JsonlMemoryIndex;
use crate::memory::writer::MemoryWriter;
use crate::perception::pipeline::ScreenPerceiver;
use crate::perception::traits::Eyes;

/// Install the global `tracing` subscriber. `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // A second call (tests, embedding applications) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Handle for feeding tasks into a running agent loop and stopping it.
#[derive(Clone)]
pub struct AgentHandle {
    pub tx: mpsc::Sender<AgentEvent>,
    pub cancel: CancellationToken,
}

impl AgentHandle {
    pub async fn submit(&self, text: impl Into<String>) -> DroidClawResult<String> {
        let request = TaskRequest::new(text);
        let task_id = request.task_id.clone();
        self.tx
            .send(AgentEvent::Task(request))
            .await
            .map_err(|_| DroidClawError::Executor("agent loop is not running".into()))?;
        Ok(task_id)
    }

    /// Interrupt the running task, including an in-flight model call, and
    /// end the loop.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let _ = self.tx.send(AgentEvent::Stop).await;
    }
}

/// Device-side collaborators for [`build_engine`].
pub struct DeviceParts {
    pub eyes: Arc<dyn Eyes>,
    pub collaborators: Collaborators,
    /// Viewport used for pruning when the config does not set one.
    pub screen_size: Option<(i32, i32)>,
}

/// Background memory writer started by [`build_engine`].
pub struct MemoryTask {
    pub errors: mpsc::Receiver<DroidClawError>,
    /// Finishes once every `MemoryWriter` clone is dropped and the queue is
    /// drained.
    pub handle: JoinHandle<()>,
}

/// Assemble an engine from configuration. With memory enabled this opens the
/// on-disk index and spawns the background writer, so it must run inside a
/// tokio runtime. Drop the engine and await [`MemoryTask::handle`] before
/// exiting so queued memories reach the index.
pub async fn build_engine(
    config: &AppConfig,
    device: DeviceParts,
    cancel: CancellationToken,
) -> DroidClawResult<(AgentEngine, Option<MemoryTask>)> {
    let keys = Arc::new(ApiKeyPool::new(config.llm.api_keys.clone()));
    let transport = select_transport(&config.llm, keys.clone())?;
    let orchestrator = LlmOrchestrator::from_config(transport, &config.llm);

    let screen_size = match (config.agent.screen_width, config.agent.screen_height) {
        (Some(w), Some(h)) => Some((w, h)),
        _ => device.screen_size,
    };
    let perceiver = ScreenPerceiver::new(device.eyes, screen_size);
    let executor = ActionExecutor::new(device.collaborators, ExecutorSettings::from(&config.agent));
    let filter = SensitiveDataFilter::new(
        config
            .sensitive_data
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );

    let mut engine = AgentEngine::new(perceiver, executor, orchestrator, &config.agent, cancel)
        .with_sensitive_data(filter)
        .with_session_log(SessionLog::new());

    let mut memory_task = None;
    if config.memory.enabled {
        if keys.is_empty() {
            tracing::warn!("memory enabled but no API key for embeddings; memory disabled");
        } else {
            let embedder = Arc::new(GeminiEmbedder::new(
                &config.llm.api_base,
                &config.memory.embedding_model,
                keys,
                Duration::from_secs(config.llm.request_timeout_secs),
            )?);
            let index = Arc::new(JsonlMemoryIndex::open(config.memory.resolved_index_path()).await?);
            tracing::info!(path = %index.path().display(), "memory index ready");
            let (writer, errors, handle) =
                MemoryWriter::spawn(embedder.clone(), index.clone(), config.memory.duplicate_threshold);
            engine = engine.with_memory(MemoryHooks {
                embedder,
                index,
                writer,
                recall_top_k: config.memory.recall_top_k,
                min_similarity: config.memory.min_similarity,
            });
            memory_task = Some(MemoryTask { errors, handle });
        }
    }

    Ok((engine, memory_task))
}
