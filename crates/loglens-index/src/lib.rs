//! Embedded persistent vector index
//!
//! One collection per log corpus (and embedding model), stored as a
//! directory holding `meta.json` (dimension + entry count) and
//! `chunks.json` (content, vector, source per chunk). Collections are
//! append/replace only: upsert replaces by chunk id, rebuild swaps the
//! whole collection. The recorded dimension makes a stale embedding model
//! detectable without a dry-run query.
//!
//! Locking is single-writer/multiple-reader PER COLLECTION, so queries on
//! one corpus never contend with a rebuild of another.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock as StdRwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use loglens_core::{LogChunk, RetrievedContext, ScoredChunk};

const META_FILE: &str = "meta.json";
const CHUNKS_FILE: &str = "chunks.json";

#[derive(Error, Debug)]
pub enum IndexError {
    /// The classic switched-models-without-rebuilding failure. Fatal for
    /// the affected corpus until an explicit rebuild.
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("chunk/vector count mismatch: {chunks} chunks, {vectors} vectors")]
    CountMismatch { chunks: usize, vectors: usize },

    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index data corrupt: {0}")]
    Corrupt(String),
}

#[derive(Serialize, Deserialize)]
struct Meta {
    dimension: Option<usize>,
    len: usize,
}

#[derive(Serialize, Deserialize, Clone)]
struct Entry {
    chunk: LogChunk,
    vector: Vec<f32>,
}

// A single corpus collection. Entries keep insertion order, which is also
// the tie-break order for equal similarity scores.
struct Collection {
    dir: PathBuf,
    dimension: Option<usize>,
    entries: Vec<Entry>,
    by_id: HashMap<Uuid, usize>,
}

impl Collection {
    fn load_or_create(root: &Path, name: &str) -> Result<Self, IndexError> {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir)?;

        let meta_path = dir.join(META_FILE);
        let chunks_path = dir.join(CHUNKS_FILE);

        let (dimension, entries) = if meta_path.exists() {
            let meta: Meta = serde_json::from_slice(&std::fs::read(&meta_path)?)
                .map_err(|e| IndexError::Corrupt(format!("{}: {}", META_FILE, e)))?;
            let entries: Vec<Entry> = if chunks_path.exists() {
                serde_json::from_slice(&std::fs::read(&chunks_path)?)
                    .map_err(|e| IndexError::Corrupt(format!("{}: {}", CHUNKS_FILE, e)))?
            } else {
                Vec::new()
            };
            (meta.dimension, entries)
        } else {
            (None, Vec::new())
        };

        let by_id = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.chunk.id, idx))
            .collect();

        Ok(Self {
            dir,
            dimension,
            entries,
            by_id,
        })
    }

    fn check_dimension(&self, got: usize) -> Result<(), IndexError> {
        if let Some(expected) = self.dimension {
            if expected != got {
                return Err(IndexError::DimensionMismatch { expected, got });
            }
        }
        Ok(())
    }

    /// Insert or replace by chunk id. All vectors are validated before any
    /// mutation happens, so a failed upsert leaves the collection untouched.
    fn upsert(&mut self, chunks: Vec<LogChunk>, vectors: Vec<Vec<f32>>) -> Result<usize, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        // establish the dimension from the first vector on a fresh
        // collection; ragged batches are rejected either way
        let established = self.dimension.or_else(|| vectors.first().map(|v| v.len()));
        if let Some(expected) = established {
            for vector in &vectors {
                if vector.len() != expected {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        got: vector.len(),
                    });
                }
            }
        }
        self.dimension = established;

        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            match self.by_id.get(&chunk.id) {
                Some(&idx) => {
                    // same id replaces, never duplicates
                    self.entries[idx] = Entry { chunk, vector };
                }
                None => {
                    self.by_id.insert(chunk.id, self.entries.len());
                    self.entries.push(Entry { chunk, vector });
                }
            }
        }

        self.persist()?;
        Ok(self.entries.len())
    }

    /// Replace the whole collection. This is the explicit path out of a
    /// dimension mismatch: the recorded dimension resets to the new vectors.
    fn rebuild(&mut self, chunks: Vec<LogChunk>, vectors: Vec<Vec<f32>>) -> Result<usize, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        let dimension = vectors.first().map(|v| v.len());
        if let Some(dim) = dimension {
            for vector in &vectors {
                if vector.len() != dim {
                    return Err(IndexError::DimensionMismatch {
                        expected: dim,
                        got: vector.len(),
                    });
                }
            }
        }

        self.dimension = dimension;
        self.entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Entry { chunk, vector })
            .collect();
        self.by_id = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.chunk.id, idx))
            .collect();

        self.persist()?;
        Ok(self.entries.len())
    }

    /// Top-k cosine similarity. Returns fewer than k when the collection is
    /// small and never errors on an empty one. The sort is stable, so ties
    /// keep insertion order.
    fn query(&self, vector: &[f32], k: usize) -> Result<RetrievedContext, IndexError> {
        self.check_dimension(vector.len())?;

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    // write-temp-then-rename so a crash never leaves a half-written file
    fn persist(&self) -> Result<(), IndexError> {
        let meta = Meta {
            dimension: self.dimension,
            len: self.entries.len(),
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        let chunk_bytes = serde_json::to_vec(&self.entries)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;

        write_atomic(&self.dir.join(META_FILE), &meta_bytes)?;
        write_atomic(&self.dir.join(CHUNKS_FILE), &chunk_bytes)?;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Handle over all collections under one root directory. Collections load
/// lazily and each gets its own reader/writer lock.
pub struct VectorIndex {
    root: PathBuf,
    collections: StdRwLock<HashMap<String, Arc<RwLock<Collection>>>>,
}

impl VectorIndex {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            collections: StdRwLock::new(HashMap::new()),
        }
    }

    fn handle(&self, name: &str) -> Result<Arc<RwLock<Collection>>, IndexError> {
        if let Some(collection) = self.collections.read().unwrap().get(name) {
            return Ok(collection.clone());
        }
        let mut map = self.collections.write().unwrap();
        if let Some(collection) = map.get(name) {
            return Ok(collection.clone());
        }
        let collection = Collection::load_or_create(&self.root, name)?;
        info!(collection = %name, len = collection.entries.len(), "Collection opened");
        let handle = Arc::new(RwLock::new(collection));
        map.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Idempotent insert-or-replace keyed by chunk id. Returns the
    /// collection size afterwards.
    pub async fn upsert(
        &self,
        collection: &str,
        chunks: Vec<LogChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize, IndexError> {
        let handle = self.handle(collection)?;
        let mut guard = handle.write().await;
        guard.upsert(chunks, vectors)
    }

    /// Replace the collection wholesale (the explicit rebuild path).
    pub async fn rebuild(
        &self,
        collection: &str,
        chunks: Vec<LogChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize, IndexError> {
        let handle = self.handle(collection)?;
        let mut guard = handle.write().await;
        let len = guard.rebuild(chunks, vectors)?;
        info!(collection = %collection, len, "Collection rebuilt");
        Ok(len)
    }

    pub async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<RetrievedContext, IndexError> {
        let handle = self.handle(collection)?;
        let guard = handle.read().await;
        guard.query(vector, k)
    }

    /// The recorded vector dimension, None until the first upsert/rebuild
    pub async fn dimension(&self, collection: &str) -> Result<Option<usize>, IndexError> {
        let handle = self.handle(collection)?;
        let guard = handle.read().await;
        Ok(guard.dimension)
    }

    pub async fn count(&self, collection: &str) -> Result<usize, IndexError> {
        let handle = self.handle(collection)?;
        let guard = handle.read().await;
        Ok(guard.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loglens_core::chunker::chunk_logs;

    fn test_chunks(n: usize) -> Vec<LogChunk> {
        let raw: String = (0..n)
            .map(|i| format!("log line number {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        chunk_logs("test-corpus", &raw)
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path());

        let chunks = test_chunks(3);
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];

        let len = index
            .upsert("c1", chunks.clone(), vectors.clone())
            .await
            .unwrap();
        assert_eq!(len, 3);

        // identical re-upsert replaces, never duplicates
        let len = index.upsert("c1", chunks, vectors).await.unwrap();
        assert_eq!(len, 3);
        assert_eq!(index.count("c1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path());

        let chunks = test_chunks(3);
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        index.upsert("c1", chunks, vectors).await.unwrap();

        // closest to the second chunk's vector
        let results = index.query("c1", &[0.1, 0.9, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.content, "log line number 1");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_query_small_and_empty_collections() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path());

        // empty collection: no error, no results
        let results = index.query("empty", &[1.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());

        let chunks = test_chunks(2);
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        index.upsert("c1", chunks, vectors).await.unwrap();

        // asking for more than the collection holds returns what exists
        let results = index.query("c1", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path());

        let chunks = test_chunks(1);
        index
            .upsert("c1", chunks.clone(), vec![vec![1.0, 0.0, 0.0]])
            .await
            .unwrap();

        // wrong-length query vector
        let err = index.query("c1", &[1.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                got: 2
            }
        ));

        // wrong-length upsert vector
        let err = index
            .upsert("c1", test_chunks(1), vec![vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_rebuild_resets_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path());

        index
            .upsert("c1", test_chunks(1), vec![vec![1.0, 0.0, 0.0]])
            .await
            .unwrap();
        assert_eq!(index.dimension("c1").await.unwrap(), Some(3));

        // explicit rebuild accepts the new dimension
        index
            .rebuild("c1", test_chunks(2), vec![vec![1.0, 0.0], vec![0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(index.dimension("c1").await.unwrap(), Some(2));
        assert_eq!(index.count("c1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();

        {
            let index = VectorIndex::open(dir.path());
            let chunks = test_chunks(3);
            let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]];
            index.upsert("c1", chunks, vectors).await.unwrap();
        }

        // a fresh handle over the same root sees the persisted state
        let index = VectorIndex::open(dir.path());
        assert_eq!(index.count("c1").await.unwrap(), 3);
        assert_eq!(index.dimension("c1").await.unwrap(), Some(2));

        let results = index.query("c1", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].chunk.content, "log line number 0");
    }

    #[tokio::test]
    async fn test_tie_break_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path());

        // identical vectors -> identical scores -> insertion order wins
        let chunks = test_chunks(3);
        let vectors = vec![vec![1.0, 0.0]; 3];
        index.upsert("c1", chunks, vectors).await.unwrap();

        let results = index.query("c1", &[1.0, 0.0], 3).await.unwrap();
        assert_eq!(results[0].chunk.content, "log line number 0");
        assert_eq!(results[1].chunk.content, "log line number 1");
        assert_eq!(results[2].chunk.content, "log line number 2");
    }

    #[tokio::test]
    async fn test_count_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path());

        let err = index
            .upsert("c1", test_chunks(2), vec![vec![1.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::CountMismatch { .. }));
    }
}
