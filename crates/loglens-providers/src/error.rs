// Error types for configuration and provider calls
//
// Embedding and generation share the same cause taxonomy but stay separate
// types: embedding errors are never retried, generation errors feed the
// retry loop in the rag crate.

use thiserror::Error;

/// Startup-time configuration failures. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown provider kind: {0}")]
    UnknownProvider(String),

    #[error("config has no [{0}] section for the selected provider")]
    MissingSection(&'static str),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),

    #[error("prompt template is missing the {{{0}}} placeholder")]
    MissingPlaceholder(&'static str),

    #[error("prompt rendered with unresolved placeholder {{{0}}}")]
    UnresolvedPlaceholder(String),

    #[error("failed to read prompt template {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("provider init failed: {0}")]
    Init(String),
}

/// Embedding call failures. Propagate immediately, no retry.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("embedding backend unreachable: {0}")]
    Unreachable(String),

    #[error("embedding model not found: {0}")]
    ModelNotFound(String),

    #[error("embedding backend error: {0}")]
    Backend(String),
}

/// Generation call failures. Only the GenerationGuard retries these.
#[derive(Error, Debug)]
pub enum GenError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("generation request timed out after {0}s")]
    Timeout(u64),

    #[error("generation backend unreachable: {0}")]
    Unreachable(String),

    #[error("generation model not found: {0}")]
    ModelNotFound(String),

    #[error("generation backend error: {0}")]
    Backend(String),
}
