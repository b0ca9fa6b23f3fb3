//! Core types for the LogLens query engine
//! shared data structures used across the provider, index and rag crates.

pub mod chunker;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// PROVIDER KIND //

/// The four inference backends a provider can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// in-process inference (fastembed / candle)
    Local,
    /// local Ollama daemon
    Ollama,
    /// any OpenAI-compatible cloud endpoint
    OpenaiCompat,
    /// DashScope managed cloud
    Dashscope,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenaiCompat => "openai_compat",
            ProviderKind::Dashscope => "dashscope",
        }
    }

    /// Parse provider kind from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" | "transformers" => Some(Self::Local),
            "ollama" => Some(Self::Ollama),
            "openai_compat" | "openai-compat" => Some(Self::OpenaiCompat),
            "dashscope" => Some(Self::Dashscope),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// GENERATION PARAMS //

/// Sampling parameters forwarded to the generation backend.
/// Backends that do not support a given field ignore it silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub max_new_tokens: u32,
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            repetition_penalty: 1.1,
            max_new_tokens: 600,
            do_sample: true,
        }
    }
}

// LOG CHUNK (unit of indexed content) //

/// Where a chunk came from in the raw input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSource {
    pub file: String, // source file / corpus label
    pub line: usize,  // 1-based line number in the raw input
}

/// A unit of indexed log content. Immutable once stored; re-indexing
/// replaces chunks wholesale rather than mutating them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogChunk {
    pub id: Uuid, // stable identifier, derived from corpus + position + content
    pub content: String,
    pub source: ChunkSource,
}

/// A chunk with its similarity score from a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: LogChunk,
    pub score: f32,
}

/// Ranked context passages, highest similarity first, capped at K
pub type RetrievedContext = Vec<ScoredChunk>;

// OUTPUT SHAPE //

/// Output shape limits for cleaned answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeLimits {
    pub max_parts: usize,
    pub max_part_length: usize,
}

impl ShapeLimits {
    /// Zero-valued limits make no sense; everything else is honored as-is.
    pub fn new(max_parts: usize, max_part_length: usize) -> Self {
        Self {
            max_parts: max_parts.max(1),
            max_part_length: max_part_length.max(1),
        }
    }
}

impl Default for ShapeLimits {
    fn default() -> Self {
        Self {
            max_parts: 3,
            max_part_length: 50,
        }
    }
}

/// Final structured answer: at most `max_parts` entries, each at most
/// `max_part_length` characters (character count, not bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedAnswer {
    pub parts: Vec<String>,
}

impl CleanedAnswer {
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

// helpers //

/// Reduce a model name to a filesystem/collection-safe slug
pub fn slugify(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_roundtrip() {
        for kind in [
            ProviderKind::Local,
            ProviderKind::Ollama,
            ProviderKind::OpenaiCompat,
            ProviderKind::Dashscope,
        ] {
            assert_eq!(ProviderKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::from_str("groq"), None);
    }

    #[test]
    fn test_shape_limits_floor() {
        let limits = ShapeLimits::new(0, 0);
        assert_eq!(limits.max_parts, 1);
        assert_eq!(limits.max_part_length, 1);

        // configured values pass through untouched
        let limits = ShapeLimits::new(2, 5);
        assert_eq!(limits.max_parts, 2);
        assert_eq!(limits.max_part_length, 5);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("bge-large:latest"), "bge_large_latest");
        assert_eq!(
            slugify("sentence-transformers/all-MiniLM-L6-v2"),
            "sentence_transformers_all_MiniLM_L6_v2"
        );
    }
}
