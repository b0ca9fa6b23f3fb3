// Engine-level error taxonomy
//
// The web-layer collaborator maps these onto HTTP statuses; the engine
// itself does no presentation formatting. Embedding and retrieval errors
// are never retried and never collapse into an empty-context fallback.

use thiserror::Error;

use loglens_index::IndexError;
use loglens_providers::{ConfigError, EmbedError, GenError};

/// Terminal generation outcome after the retry budget is spent.
/// Carries the last raw output (if any) for diagnostics.
#[derive(Error, Debug)]
#[error("generation failed after {attempts} attempts")]
pub struct GenerationFailed {
    pub attempts: u32,
    pub last_output: Option<String>,
    pub last_error: Option<GenError>,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    /// Dimension mismatch against a stored collection. The operator must
    /// rebuild the corpus index; nothing here auto-resolves it.
    #[error("index for corpus '{corpus}' is stale, rebuild required: {source}")]
    IndexStale {
        corpus: String,
        #[source]
        source: IndexError,
    },

    #[error("index error: {0}")]
    Index(IndexError),

    #[error(transparent)]
    Generation(#[from] GenerationFailed),
}

impl EngineError {
    /// Route index errors: dimension mismatches become the distinct
    /// "stale, rebuild required" signal, everything else stays an index error.
    pub fn from_index(corpus: &str, source: IndexError) -> Self {
        match source {
            IndexError::DimensionMismatch { .. } => EngineError::IndexStale {
                corpus: corpus.to_string(),
                source,
            },
            other => EngineError::Index(other),
        }
    }
}
