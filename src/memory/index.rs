use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::errors::{DroidClawError, DroidClawResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Vector store for long-term memories.
#[async_trait]
pub trait MemoryIndex: Send + Sync {
    /// Best `top_k` matches, highest score first.
    async fn search(&self, query: &[f32], top_k: usize) -> DroidClawResult<Vec<MemoryHit>>;

    async fn insert(&self, id: &str, vector: &[f32], text: &str) -> DroidClawResult<()>;
}

#[derive(Serialize, Deserialize)]
struct Entry {
    id: String,
    vector: Vec<f32>,
    text: String,
}

/// Brute-force cosine index held in memory.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn upsert(&self, entry: Entry) {
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.id != entry.id);
        entries.push(entry);
    }
}

fn check_vector(vector: &[f32]) -> DroidClawResult<()> {
    if vector.is_empty() {
        return Err(DroidClawError::Memory("refusing to index an empty vector".into()));
    }
    Ok(())
}

/// Cosine index persisted as one JSON line per insert. A later line for the
/// same id replaces the earlier one when the file is loaded.
pub struct JsonlMemoryIndex {
    inner: InMemoryIndex,
    path: PathBuf,
    file_lock: Mutex<()>,
}

impl JsonlMemoryIndex {
    /// Load `path` if it exists. Unreadable lines are skipped.
    pub async fn open(path: impl Into<PathBuf>) -> DroidClawResult<Self> {
        let path = path.into();
        let inner = InMemoryIndex::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                for (n, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Entry>(line) {
                        Ok(entry) => inner.upsert(entry).await,
                        Err(e) => {
                            tracing::warn!(path = %path.display(), line = n + 1, error = %e, "skipping memory line")
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(path = %path.display(), entries = inner.len().await, "memory index loaded");
        Ok(Self {
            inner,
            path,
            file_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl MemoryIndex for JsonlMemoryIndex {
    async fn search(&self, query: &[f32], top_k: usize) -> DroidClawResult<Vec<MemoryHit>> {
        self.inner.search(query, top_k).await
    }

    async fn insert(&self, id: &str, vector: &[f32], text: &str) -> DroidClawResult<()> {
        check_vector(vector)?;
        let entry = Entry {
            id: id.to_string(),
            vector: vector.to_vec(),
            text: text.to_string(),
        };
        let line = serde_json::to_string(&entry)?;
        {
            let _guard = self.file_lock.lock().await;
            if let Some(dir) = self.path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(format!("{line}\n").as_bytes()).await?;
            file.flush().await?;
        }
        self.inner.upsert(entry).await;
        Ok(())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl MemoryIndex for InMemoryIndex {
    async fn search(&self, query: &[f32], top_k: usize) -> DroidClawResult<Vec<MemoryHit>> {
        let entries = self.entries.read().await;
        let mut hits: Vec<MemoryHit> = entries
            .iter()
            .map(|e| MemoryHit {
                id: e.id.clone(),
                text: e.text.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn insert(&self, id: &str, vector: &[f32], text: &str) -> DroidClawResult<()> {
        check_vector(vector)?;
        self.upsert(Entry {
            id: id.to_string(),
            vector: vector.to_vec(),
            text: text.to_string(),
        })
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_by_score() {
        let index = InMemoryIndex::new();
        index.insert("a", &[1.0, 0.0], "east").await.unwrap();
        index.insert("b", &[0.7, 0.7], "north-east").await.unwrap();
        index.insert("c", &[0.0, 1.0], "north").await.unwrap();
        let hits = index.search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_insert_replaces_same_id() {
        let index = InMemoryIndex::new();
        index.insert("a", &[1.0], "old").await.unwrap();
        index.insert("a", &[1.0], "new").await.unwrap();
        assert_eq!(index.len().await, 1);
        assert_eq!(index.search(&[1.0], 1).await.unwrap()[0].text, "new");
    }

    #[tokio::test]
    async fn test_jsonl_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory").join("index.jsonl");

        let index = JsonlMemoryIndex::open(&path).await.unwrap();
        index.insert("a", &[1.0, 0.0], "first").await.unwrap();
        index.insert("b", &[0.0, 1.0], "second").await.unwrap();
        index.insert("a", &[1.0, 0.0], "first, revised").await.unwrap();
        drop(index);

        let reopened = JsonlMemoryIndex::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        let hits = reopened.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].text, "first, revised");
    }

    #[tokio::test]
    async fn test_jsonl_index_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        std::fs::write(
            &path,
            "not json\n{\"id\":\"x\",\"vector\":[1.0],\"text\":\"kept\"}\n",
        )
        .unwrap();
        let index = JsonlMemoryIndex::open(&path).await.unwrap();
        assert_eq!(index.len().await, 1);
        assert!(JsonlMemoryIndex::open(dir.path().join("missing.jsonl")).await.is_ok());
    }
}
