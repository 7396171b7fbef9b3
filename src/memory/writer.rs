//! Background long-term memory writes.
//!
//! Finished tasks are embedded and indexed on a spawned task so the agent loop
//! never waits on it. Near-duplicates of an existing memory are skipped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::{DroidClawError, DroidClawResult};
use crate::memory::embedder::Embedder;
use crate::memory::index::MemoryIndex;

const QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub task: String,
    pub summary: String,
    pub steps: u32,
}

impl MemoryRecord {
    pub fn to_text(&self) -> String {
        format!(
            "Task: {}\nOutcome: {}\nSteps: {}",
            self.task, self.summary, self.steps
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored,
    Duplicate,
}

/// Handle for queueing memory writes.
#[derive(Clone)]
pub struct MemoryWriter {
    tx: mpsc::Sender<MemoryRecord>,
}

impl MemoryWriter {
    /// Spawn the writer task. Failures are logged and forwarded on the returned
    /// error channel.
    pub fn spawn(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn MemoryIndex>,
        duplicate_threshold: f32,
    ) -> (Self, mpsc::Receiver<DroidClawError>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<MemoryRecord>(QUEUE_DEPTH);
        let (err_tx, err_rx) = mpsc::channel::<DroidClawError>(QUEUE_DEPTH);

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                match store(embedder.as_ref(), index.as_ref(), &record, duplicate_threshold).await {
                    Ok(WriteOutcome::Stored) => {
                        tracing::info!(task = %record.task, "memory stored")
                    }
                    Ok(WriteOutcome::Duplicate) => {
                        tracing::debug!(task = %record.task, "memory skipped as duplicate")
                    }
                    Err(e) => {
                        tracing::warn!(task = %record.task, error = %e, "memory write failed");
                        if err_tx.try_send(e).is_err() {
                            tracing::debug!("memory error channel full or closed");
                        }
                    }
                }
            }
            tracing::debug!("memory writer stopped");
        });

        (Self { tx }, err_rx, handle)
    }

    /// Queue a record without waiting for it to be written.
    pub fn submit(&self, record: MemoryRecord) -> DroidClawResult<()> {
        self.tx
            .try_send(record)
            .map_err(|e| DroidClawError::Memory(format!("memory queue unavailable: {e}")))
    }
}

/// Embed `record` and insert it unless a stored memory is at least
/// `duplicate_threshold` similar.
pub async fn store(
    embedder: &dyn Embedder,
    index: &dyn MemoryIndex,
    record: &MemoryRecord,
    duplicate_threshold: f32,
) -> DroidClawResult<WriteOutcome> {
    let text = record.to_text();
    let vector = embedder.embed(&text).await?;
    let nearest = index.search(&vector, 1).await?;
    if nearest.first().is_some_and(|hit| hit.score >= duplicate_threshold) {
        return Ok(WriteOutcome::Duplicate);
    }
    let id = uuid::Uuid::new_v4().to_string();
    index.insert(&id, &vector, &text).await?;
    Ok(WriteOutcome::Stored)
}
