// LogLens provider abstraction - one contract over four inference backends

pub mod config;
pub mod dashscope;
pub mod error;
pub mod local;
pub mod ollama;
pub mod openai_compat;
pub mod provider;
pub mod registry;

pub use config::{
    DashscopeConfig, EmbeddingSelector, Limits, LocalConfig, OllamaConfig, OpenaiCompatConfig,
    PromptConfig, ProviderConfig, ProxyConfig, RetrievalConfig, StorageConfig,
};
pub use dashscope::DashscopeClient;
pub use error::{ConfigError, EmbedError, GenError};
pub use local::{LocalEmbedding, LocalGeneration};
pub use ollama::OllamaClient;
pub use openai_compat::OpenaiCompatClient;
pub use provider::{EmbeddingProvider, GenerationProvider};
pub use registry::{ProviderRegistry, ProviderSnapshot};
