// Retriever - chunk raw logs, embed, and query the vector index
//
// Embedding failures propagate immediately as retrieval failures; a
// dimension mismatch from the index comes back as the distinct
// "stale, rebuild required" signal. Neither is ever retried here.

use std::sync::Arc;

use tracing::info;

use loglens_core::chunker::chunk_logs;
use loglens_core::{slugify, RetrievedContext};
use loglens_index::VectorIndex;
use loglens_providers::ProviderSnapshot;

use crate::error::EngineError;

// keep embed_batch requests a sane size for big corpora
const EMBED_BATCH: usize = 32;

pub struct Retriever {
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    /// Collection identity combines the corpus and the embedding model, so
    /// switching models can never silently reuse another model's vectors.
    pub fn collection_name(corpus: &str, snapshot: &ProviderSnapshot) -> String {
        format!("{}__{}", slugify(corpus), snapshot.collection_suffix)
    }

    /// (Re)build the corpus collection from raw log text. Idempotent per
    /// corpus identity: identical input produces identical chunks and a
    /// collection of the same size.
    pub async fn index_corpus(
        &self,
        snapshot: &ProviderSnapshot,
        corpus: &str,
        raw_logs: &str,
    ) -> Result<usize, EngineError> {
        let collection = Self::collection_name(corpus, snapshot);
        let chunks = chunk_logs(corpus, raw_logs);
        info!(corpus = %corpus, chunks = chunks.len(), "Indexing corpus");

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            vectors.extend(snapshot.embedding.embed_batch(&texts).await?);
        }

        let len = self
            .index
            .rebuild(&collection, chunks, vectors)
            .await
            .map_err(|e| EngineError::from_index(corpus, e))?;
        info!(corpus = %corpus, len, "Corpus indexed");
        Ok(len)
    }

    /// Embed the query and return the top-k context passages. An empty
    /// result is a legitimate outcome, not an error.
    pub async fn retrieve(
        &self,
        snapshot: &ProviderSnapshot,
        corpus: &str,
        query: &str,
        k: usize,
    ) -> Result<RetrievedContext, EngineError> {
        let collection = Self::collection_name(corpus, snapshot);
        let vector = snapshot.embedding.embed(query).await?;

        let context = self
            .index
            .query(&collection, &vector, k)
            .await
            .map_err(|e| EngineError::from_index(corpus, e))?;
        info!(corpus = %corpus, k, hits = context.len(), "Context retrieved");
        Ok(context)
    }
}
