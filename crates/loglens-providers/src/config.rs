//! Configuration for provider selection and output shaping
//!
//! One TOML file selects the generation backend, the embedding backend (or
//! "auto" to follow generation), and carries one parameter section per
//! backend. The loaded config is immutable; reselection at runtime builds a
//! new provider snapshot instead of mutating this.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use loglens_core::{GenerationParams, ProviderKind, ShapeLimits};

use crate::error::ConfigError;

// Main config structure
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    // generation backend kind
    #[serde(default = "default_generation_provider")]
    pub generation_provider: ProviderKind,

    // embedding backend kind, or auto to follow the generation backend
    #[serde(default)]
    pub embedding_provider: EmbeddingSelector,

    #[serde(default)]
    pub limits: Limits,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub prompt: PromptConfig,

    #[serde(default)]
    pub proxy: Option<ProxyConfig>,

    // one section per backend; only the selected ones are required
    pub local: Option<LocalConfig>,
    pub ollama: Option<OllamaConfig>,
    pub openai_compat: Option<OpenaiCompatConfig>,
    pub dashscope: Option<DashscopeConfig>,
}

fn default_generation_provider() -> ProviderKind {
    ProviderKind::Ollama
}

/// Embedding backend selection. Auto resolves to the generation backend's
/// kind but always uses the embedding model fields of that backend section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingSelector {
    #[default]
    Auto,
    Local,
    Ollama,
    OpenaiCompat,
    Dashscope,
}

impl EmbeddingSelector {
    pub fn resolve(&self, generation: ProviderKind) -> ProviderKind {
        match self {
            EmbeddingSelector::Auto => generation,
            EmbeddingSelector::Local => ProviderKind::Local,
            EmbeddingSelector::Ollama => ProviderKind::Ollama,
            EmbeddingSelector::OpenaiCompat => ProviderKind::OpenaiCompat,
            EmbeddingSelector::Dashscope => ProviderKind::Dashscope,
        }
    }
}

// Generation robustness and output shape limits
#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
    // retry budget for generation (attempts = retries + 1)
    #[serde(default = "default_generation_retries")]
    pub generation_retries: u32,

    // minimum accepted output length, in characters
    #[serde(default = "default_min_output_chars")]
    pub min_output_chars: usize,

    #[serde(default = "default_max_parts")]
    pub max_parts: usize,

    #[serde(default = "default_max_part_length")]
    pub max_part_length: usize,
}

impl Limits {
    pub fn shape(&self) -> ShapeLimits {
        ShapeLimits::new(self.max_parts, self.max_part_length)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            generation_retries: default_generation_retries(),
            min_output_chars: default_min_output_chars(),
            max_parts: default_max_parts(),
            max_part_length: default_max_part_length(),
        }
    }
}

fn default_generation_retries() -> u32 {
    2
}
fn default_min_output_chars() -> usize {
    50
}
fn default_max_parts() -> usize {
    3
}
fn default_max_part_length() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    // how many context passages retrieval returns
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    // root directory for persisted vector collections
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data/vector_stores".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptConfig {
    // optional path to a prompt template; the built-in template is used when unset
    #[serde(default)]
    pub template_path: Option<String>,
}

// Proxy settings, injected into the process environment before any model
// download or remote call happens
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub all_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl ProxyConfig {
    /// Set both upper- and lower-case variants, matching what the various
    /// HTTP stacks actually read.
    pub fn apply_to_env(&self) {
        let all_proxy = self.all_proxy.clone().or_else(|| self.http_proxy.clone());
        let pairs = [
            ("HTTP_PROXY", &self.http_proxy),
            ("http_proxy", &self.http_proxy),
            ("HTTPS_PROXY", &self.https_proxy),
            ("https_proxy", &self.https_proxy),
            ("ALL_PROXY", &all_proxy),
            ("all_proxy", &all_proxy),
            ("NO_PROXY", &self.no_proxy),
            ("no_proxy", &self.no_proxy),
        ];
        for (key, val) in pairs {
            if let Some(val) = val {
                if !val.is_empty() {
                    std::env::set_var(key, val);
                }
            }
        }
    }
}

// In-process backend (fastembed embeddings + candle GGUF generation)
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    // fastembed model code, e.g. "sentence-transformers/all-MiniLM-L6-v2"
    #[serde(default = "default_local_embedding_model")]
    pub embedding_model: String,

    // GGUF weights: hub repo + file inside it
    #[serde(default = "default_gguf_repo")]
    pub gguf_repo: String,
    #[serde(default = "default_gguf_file")]
    pub gguf_file: String,

    // hub repo the tokenizer.json comes from
    #[serde(default = "default_tokenizer_repo")]
    pub tokenizer_repo: String,

    #[serde(default = "default_eos_token")]
    pub eos_token: String,

    #[serde(default = "default_context_length")]
    pub context_length: usize,

    #[serde(default)]
    pub params: GenerationParams,
}

fn default_local_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_gguf_repo() -> String {
    "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF".to_string()
}
fn default_gguf_file() -> String {
    "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf".to_string()
}
fn default_tokenizer_repo() -> String {
    "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string()
}
fn default_eos_token() -> String {
    "</s>".to_string()
}
fn default_context_length() -> usize {
    2048
}

// Ollama daemon backend
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_host")]
    pub host: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,

    #[serde(default = "default_ollama_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_ollama_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub params: GenerationParams,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_model() -> String {
    "qwen3:8b".to_string()
}
fn default_ollama_embedding_model() -> String {
    "bge-large:latest".to_string()
}
fn default_ollama_timeout() -> u64 {
    120
}

// OpenAI-compatible cloud backend
#[derive(Debug, Clone, Deserialize)]
pub struct OpenaiCompatConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    // env var NAME holding the key; the key itself never lives in config
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub organization: Option<String>,

    #[serde(default = "default_openai_model")]
    pub model: String,

    #[serde(default = "default_openai_embedding_model")]
    pub embedding_model: String,

    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    #[serde(default = "default_cloud_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub params: GenerationParams,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_openai_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}
fn default_cloud_timeout() -> u64 {
    60
}

// DashScope managed cloud backend. Chat goes through the OpenAI-compatible
// surface; embeddings go through the native endpoint (separate wire shape).
#[derive(Debug, Clone, Deserialize)]
pub struct DashscopeConfig {
    #[serde(default = "default_dashscope_base_url")]
    pub base_url: String,

    #[serde(default = "default_dashscope_embeddings_url")]
    pub embeddings_url: String,

    #[serde(default = "default_dashscope_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_dashscope_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_dashscope_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_dashscope_dimensions")]
    pub embedding_dimensions: Option<usize>,

    #[serde(default = "default_cloud_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub params: GenerationParams,
}

fn default_dashscope_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}
fn default_dashscope_embeddings_url() -> String {
    "https://dashscope.aliyuncs.com/api/v1/services/embeddings/text-embedding/text-embedding"
        .to_string()
}
fn default_dashscope_key_env() -> String {
    "DASHSCOPE_API_KEY".to_string()
}
fn default_dashscope_chat_model() -> String {
    "qwen-turbo".to_string()
}
fn default_dashscope_embedding_model() -> String {
    "text-embedding-v4".to_string()
}
fn default_dashscope_dimensions() -> Option<usize> {
    Some(1024)
}

impl ProviderConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path_str,
            source,
        })?;
        let config: ProviderConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every selected backend has its section present.
    /// Local and ollama sections have full defaults, so only their absence
    /// AND selection together is an error for the remote kinds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let embedding_kind = self.embedding_provider.resolve(self.generation_provider);
        for kind in [self.generation_provider, embedding_kind] {
            self.section_check(kind)?;
        }
        Ok(())
    }

    pub fn section_check(&self, kind: ProviderKind) -> Result<(), ConfigError> {
        match kind {
            // in-process backends fall back to defaults when the section is absent
            ProviderKind::Local | ProviderKind::Ollama => Ok(()),
            ProviderKind::OpenaiCompat => {
                if self.openai_compat.is_none() {
                    return Err(ConfigError::MissingSection("openai_compat"));
                }
                Ok(())
            }
            ProviderKind::Dashscope => {
                if self.dashscope.is_none() {
                    return Err(ConfigError::MissingSection("dashscope"));
                }
                Ok(())
            }
        }
    }

    /// Resolved embedding backend kind
    pub fn embedding_kind(&self) -> ProviderKind {
        self.embedding_provider.resolve(self.generation_provider)
    }

    pub fn local(&self) -> LocalConfig {
        self.local.clone().unwrap_or_else(default_local_config)
    }

    pub fn ollama(&self) -> OllamaConfig {
        self.ollama.clone().unwrap_or_else(default_ollama_config)
    }
}

fn default_local_config() -> LocalConfig {
    LocalConfig {
        embedding_model: default_local_embedding_model(),
        gguf_repo: default_gguf_repo(),
        gguf_file: default_gguf_file(),
        tokenizer_repo: default_tokenizer_repo(),
        eos_token: default_eos_token(),
        context_length: default_context_length(),
        params: GenerationParams::default(),
    }
}

fn default_ollama_config() -> OllamaConfig {
    OllamaConfig {
        host: default_ollama_host(),
        model: default_ollama_model(),
        embedding_model: default_ollama_embedding_model(),
        timeout_seconds: default_ollama_timeout(),
        params: GenerationParams::default(),
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            generation_provider: default_generation_provider(),
            embedding_provider: EmbeddingSelector::Auto,
            limits: Limits::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::default(),
            prompt: PromptConfig::default(),
            proxy: None,
            local: None,
            ollama: None,
            openai_compat: None,
            dashscope: None,
        }
    }
}
