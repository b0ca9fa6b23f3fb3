// Provider capability traits
//
// One concrete implementation per backend kind. Every backend is reachable
// through these two traits only, so retrieval and generation stay
// individually swappable at runtime.

use async_trait::async_trait;

use loglens_core::{GenerationParams, ProviderKind};

use crate::error::{EmbedError, GenError};

/// Turns text into fixed-length vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Batch form. Preserves input order and uses the same dimensionality
    /// as single-item calls.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    fn model(&self) -> &str;

    /// Vector length, when the backend knows it without a dry-run call
    fn dimension(&self) -> Option<usize>;

    fn kind(&self) -> ProviderKind;
}

/// Turns a prompt into natural-language text
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Params the backend does not support are ignored, never an error.
    async fn generate(&self, prompt: &str, params: &GenerationParams)
        -> Result<String, GenError>;

    fn model(&self) -> &str;

    fn kind(&self) -> ProviderKind;
}
