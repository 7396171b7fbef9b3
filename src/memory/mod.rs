pub mod embedder;
pub mod index;
pub mod writer;

use crate::errors::DroidClawResult;
use crate::memory::embedder::Embedder;
use crate::memory::index::MemoryIndex;

/// Memories related to `task` scoring at least `min_score`, formatted as a
/// context message. `None` when nothing qualifies.
pub async fn recall(
    embedder: &dyn Embedder,
    index: &dyn MemoryIndex,
    task: &str,
    top_k: usize,
    min_score: f32,
) -> DroidClawResult<Option<String>> {
    if top_k == 0 {
        return Ok(None);
    }
    let vector = embedder.embed(task).await?;
    let mut hits = index.search(&vector, top_k).await?;
    hits.retain(|h| h.score >= min_score);
    if hits.is_empty() {
        return Ok(None);
    }
    let lines: Vec<String> = hits
        .iter()
        .map(|h| format!("- {}", h.text.replace('\n', "; ")))
        .collect();
    Ok(Some(format!(
        "Experience from earlier tasks that may help:\n{}",
        lines.join("\n")
    )))
}
