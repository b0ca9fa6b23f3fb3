// LogLens engine
// Orchestrates: retrieval -> prompt assembly -> guarded generation -> cleaning
//
// Every request clones the provider snapshot once at entry, so a
// reselection mid-request never mixes backends within one answer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use loglens_core::{CleanedAnswer, ProviderKind};
use loglens_index::VectorIndex;
use loglens_providers::{ConfigError, ProviderConfig, ProviderRegistry, ProviderSnapshot};

use crate::cleaner::OutputCleaner;
use crate::error::EngineError;
use crate::guard::GenerationGuard;
use crate::prompt::PromptAssembler;
use crate::retriever::Retriever;

/// What the web-layer collaborator gets back for a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: CleanedAnswer,
    pub sources_count: usize,
    pub provider: String,
}

pub struct LogLensEngine {
    registry: ProviderRegistry,
    retriever: Retriever,
    assembler: PromptAssembler,
    guard: GenerationGuard,
    cleaner: OutputCleaner,
    top_k: usize,
}

impl LogLensEngine {
    /// Build the whole pipeline from a validated config. Template problems
    /// and provider-section problems both fail here, at startup.
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        let shape = config.limits.shape();
        let assembler = PromptAssembler::from_config(&config.prompt, shape)?;
        let guard = GenerationGuard::new(
            config.limits.generation_retries,
            config.limits.min_output_chars,
        );
        let cleaner = OutputCleaner::new(shape);
        let top_k = config.retrieval.top_k;

        let index = Arc::new(VectorIndex::open(config.storage.data_dir.clone()));
        let retriever = Retriever::new(index);

        let registry = ProviderRegistry::new(config)?;

        Ok(Self {
            registry,
            retriever,
            assembler,
            guard,
            cleaner,
            top_k,
        })
    }

    /// Answer a question against the active provider snapshot
    pub async fn answer(&self, query: &str, corpus: &str) -> Result<Answer, EngineError> {
        let snapshot = self.registry.active();
        self.answer_with(&snapshot, query, corpus).await
    }

    /// Answer against an explicit snapshot. The request runs start to
    /// finish on this snapshot regardless of concurrent reselection.
    pub async fn answer_with(
        &self,
        snapshot: &Arc<ProviderSnapshot>,
        query: &str,
        corpus: &str,
    ) -> Result<Answer, EngineError> {
        info!(corpus = %corpus, query = %query, "ANSWER request");

        let context = self
            .retriever
            .retrieve(snapshot, corpus, query, self.top_k)
            .await?;

        // empty context is a legitimate "nothing relevant" outcome; the
        // prompt tells the model so instead of failing the request
        let prompt = self.assembler.render(&context, query);

        let raw = self
            .guard
            .run(snapshot.generation.as_ref(), &prompt, &snapshot.params)
            .await?;

        let cleaned = self.cleaner.clean(&raw);
        info!(
            corpus = %corpus,
            sources = context.len(),
            parts = cleaned.parts.len(),
            provider = %snapshot.generation_kind(),
            "ANSWER complete"
        );

        Ok(Answer {
            answer: cleaned,
            sources_count: context.len(),
            provider: snapshot.generation_kind().to_string(),
        })
    }

    /// Rebuild the vector collection for a corpus from raw log text
    pub async fn rebuild_index(&self, corpus: &str, raw_logs: &str) -> Result<usize, EngineError> {
        let snapshot = self.registry.active();
        self.rebuild_index_with(&snapshot, corpus, raw_logs).await
    }

    pub async fn rebuild_index_with(
        &self,
        snapshot: &Arc<ProviderSnapshot>,
        corpus: &str,
        raw_logs: &str,
    ) -> Result<usize, EngineError> {
        self.retriever.index_corpus(snapshot, corpus, raw_logs).await
    }

    /// Switch the active generation backend (embedding follows when the
    /// config says auto). Returns the newly active pair for confirmation.
    pub fn select_provider(
        &self,
        kind: ProviderKind,
        model: Option<&str>,
    ) -> Result<(ProviderKind, String), EngineError> {
        Ok(self.registry.select(kind, model)?)
    }

    pub fn list_providers(&self) -> Vec<ProviderKind> {
        self.registry.list_providers()
    }

    pub async fn list_local_models(&self, kind: ProviderKind) -> Vec<String> {
        self.registry.list_local_models(kind).await
    }

    /// Current snapshot, for callers that pin one across several calls
    pub fn snapshot(&self) -> Arc<ProviderSnapshot> {
        self.registry.active()
    }
}
