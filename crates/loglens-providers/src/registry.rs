// Provider registry - resolves config into live provider instances
//
// Instances are cached by (backend kind, model) so repeated resolution does
// not reload local models or rebuild HTTP clients. The active pair lives in
// an immutable snapshot behind an RwLock<Arc<_>>: requests clone the Arc
// once at entry and finish on that snapshot even if a reselection swaps the
// active one mid-flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{info, warn};

use loglens_core::{slugify, GenerationParams, ProviderKind};

use crate::config::ProviderConfig;
use crate::dashscope::DashscopeClient;
use crate::error::ConfigError;
use crate::local::{LocalEmbedding, LocalGeneration};
use crate::ollama::OllamaClient;
use crate::openai_compat::OpenaiCompatClient;
use crate::provider::{EmbeddingProvider, GenerationProvider};

// short timeout for the best-effort model listing calls
const LIST_TIMEOUT_SECONDS: u64 = 3;

type GenCache = Mutex<HashMap<(ProviderKind, String), Arc<dyn GenerationProvider>>>;
type EmbedCache = Mutex<HashMap<(ProviderKind, String), Arc<dyn EmbeddingProvider>>>;

/// The active providers a request runs against. Immutable once built.
pub struct ProviderSnapshot {
    pub generation: Arc<dyn GenerationProvider>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub params: GenerationParams,
    /// slug of the embedding model, appended to collection names so a model
    /// switch never silently reuses stale vectors
    pub collection_suffix: String,
}

impl ProviderSnapshot {
    pub fn generation_kind(&self) -> ProviderKind {
        self.generation.kind()
    }

    pub fn embedding_kind(&self) -> ProviderKind {
        self.embedding.kind()
    }
}

pub struct ProviderRegistry {
    config: ProviderConfig,
    gen_cache: GenCache,
    embed_cache: EmbedCache,
    active: RwLock<Arc<ProviderSnapshot>>,
}

impl ProviderRegistry {
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        // proxies must land in the environment before any model download
        if let Some(proxy) = &config.proxy {
            proxy.apply_to_env();
        }

        let gen_cache: GenCache = Mutex::new(HashMap::new());
        let embed_cache: EmbedCache = Mutex::new(HashMap::new());
        let snapshot = Self::build_snapshot(
            &config,
            &gen_cache,
            &embed_cache,
            config.generation_provider,
            None,
        )?;

        info!(
            generation = %snapshot.generation_kind(),
            generation_model = %snapshot.generation.model(),
            embedding = %snapshot.embedding_kind(),
            embedding_model = %snapshot.embedding.model(),
            "Providers resolved"
        );

        Ok(Self {
            config,
            gen_cache,
            embed_cache,
            active: RwLock::new(snapshot),
        })
    }

    /// Current snapshot. Callers hold the returned Arc for the whole
    /// request so reselection never changes a request mid-flight.
    pub fn active(&self) -> Arc<ProviderSnapshot> {
        self.active.read().unwrap().clone()
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Switch the generation backend (and, when embedding is auto, the
    /// embedding backend with it). Builds a fresh snapshot and swaps it in
    /// atomically; snapshots already handed out stay valid.
    pub fn select(
        &self,
        kind: ProviderKind,
        model: Option<&str>,
    ) -> Result<(ProviderKind, String), ConfigError> {
        // stale entries for this kind would otherwise shadow the new model
        if let Some(model) = model {
            self.gen_cache
                .lock()
                .unwrap()
                .retain(|(k, m), _| *k != kind || m == model);
        }

        let snapshot =
            Self::build_snapshot(&self.config, &self.gen_cache, &self.embed_cache, kind, model)?;
        let active = (snapshot.generation_kind(), snapshot.generation.model().to_string());

        *self.active.write().unwrap() = snapshot;
        info!(kind = %active.0, model = %active.1, "Provider reselected");
        Ok(active)
    }

    /// Backends the operator may select. Local and ollama are always
    /// offered; remote kinds only when their section is configured.
    pub fn list_providers(&self) -> Vec<ProviderKind> {
        let mut kinds = vec![ProviderKind::Local, ProviderKind::Ollama];
        if self.config.openai_compat.is_some() {
            kinds.push(ProviderKind::OpenaiCompat);
        }
        if self.config.dashscope.is_some() {
            kinds.push(ProviderKind::Dashscope);
        }
        kinds
    }

    /// Best-effort local model discovery: the Ollama daemon's tag list, or
    /// the HF hub cache for the in-process backend. Remote kinds have no
    /// local models. Failures log and return empty rather than erroring.
    pub async fn list_local_models(&self, kind: ProviderKind) -> Vec<String> {
        match kind {
            ProviderKind::Ollama => {
                let cfg = self.config.ollama();
                let client =
                    match OllamaClient::new(&cfg.host, &cfg.model, LIST_TIMEOUT_SECONDS) {
                        Ok(client) => client,
                        Err(e) => {
                            warn!(error = %e, "Failed to build ollama client for listing");
                            return Vec::new();
                        }
                    };
                match client.list_models().await {
                    Ok(mut models) => {
                        models.sort();
                        models.dedup();
                        models
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to list ollama models");
                        Vec::new()
                    }
                }
            }
            ProviderKind::Local => scan_hub_cache(),
            ProviderKind::OpenaiCompat | ProviderKind::Dashscope => Vec::new(),
        }
    }

    fn build_snapshot(
        config: &ProviderConfig,
        gen_cache: &GenCache,
        embed_cache: &EmbedCache,
        gen_kind: ProviderKind,
        gen_model: Option<&str>,
    ) -> Result<Arc<ProviderSnapshot>, ConfigError> {
        config.section_check(gen_kind)?;
        let embed_kind = config.embedding_provider.resolve(gen_kind);
        config.section_check(embed_kind)?;

        let generation = Self::generation_for(config, gen_cache, gen_kind, gen_model)?;
        let embedding = Self::embedding_for(config, embed_cache, embed_kind)?;
        let params = Self::params_for(config, gen_kind);
        let collection_suffix = slugify(embedding.model());

        Ok(Arc::new(ProviderSnapshot {
            generation,
            embedding,
            params,
            collection_suffix,
        }))
    }

    fn generation_for(
        config: &ProviderConfig,
        cache: &GenCache,
        kind: ProviderKind,
        model_override: Option<&str>,
    ) -> Result<Arc<dyn GenerationProvider>, ConfigError> {
        let model = Self::generation_model(config, kind, model_override)?;
        let key = (kind, model.clone());
        if let Some(provider) = cache.lock().unwrap().get(&key) {
            return Ok(provider.clone());
        }

        let provider: Arc<dyn GenerationProvider> = match kind {
            ProviderKind::Local => {
                if model_override.is_some() {
                    // local weights are a (repo, file, tokenizer) triple in
                    // config; a bare model id cannot select them
                    warn!("Ignoring model override for the local backend");
                }
                Arc::new(LocalGeneration::load(&config.local())?)
            }
            ProviderKind::Ollama => {
                let cfg = config.ollama();
                Arc::new(OllamaClient::new(&cfg.host, &model, cfg.timeout_seconds)?)
            }
            ProviderKind::OpenaiCompat => {
                let cfg = config
                    .openai_compat
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("openai_compat"))?;
                Arc::new(OpenaiCompatClient::from_config(cfg, &model)?)
            }
            ProviderKind::Dashscope => {
                let cfg = config
                    .dashscope
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("dashscope"))?;
                Arc::new(DashscopeClient::from_config(cfg, &model)?)
            }
        };

        cache.lock().unwrap().insert(key, provider.clone());
        Ok(provider)
    }

    fn embedding_for(
        config: &ProviderConfig,
        cache: &EmbedCache,
        kind: ProviderKind,
    ) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
        let model = Self::embedding_model(config, kind)?;
        let key = (kind, model.clone());
        if let Some(provider) = cache.lock().unwrap().get(&key) {
            return Ok(provider.clone());
        }

        let provider: Arc<dyn EmbeddingProvider> = match kind {
            ProviderKind::Local => Arc::new(LocalEmbedding::new(&model)?),
            ProviderKind::Ollama => {
                let cfg = config.ollama();
                Arc::new(OllamaClient::new(&cfg.host, &model, cfg.timeout_seconds)?)
            }
            ProviderKind::OpenaiCompat => {
                let cfg = config
                    .openai_compat
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("openai_compat"))?;
                Arc::new(OpenaiCompatClient::from_config(cfg, &model)?)
            }
            ProviderKind::Dashscope => {
                let cfg = config
                    .dashscope
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("dashscope"))?;
                Arc::new(DashscopeClient::from_config(cfg, &model)?)
            }
        };

        cache.lock().unwrap().insert(key, provider.clone());
        Ok(provider)
    }

    fn generation_model(
        config: &ProviderConfig,
        kind: ProviderKind,
        model_override: Option<&str>,
    ) -> Result<String, ConfigError> {
        if let Some(model) = model_override {
            if kind != ProviderKind::Local {
                return Ok(model.to_string());
            }
        }
        Ok(match kind {
            ProviderKind::Local => {
                let cfg = config.local();
                format!("{}/{}", cfg.gguf_repo, cfg.gguf_file)
            }
            ProviderKind::Ollama => config.ollama().model,
            ProviderKind::OpenaiCompat => {
                config
                    .openai_compat
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("openai_compat"))?
                    .model
                    .clone()
            }
            ProviderKind::Dashscope => {
                config
                    .dashscope
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("dashscope"))?
                    .chat_model
                    .clone()
            }
        })
    }

    /// The embedding model always comes from the embedding fields of the
    /// backend section - never from the generation model name.
    fn embedding_model(config: &ProviderConfig, kind: ProviderKind) -> Result<String, ConfigError> {
        Ok(match kind {
            ProviderKind::Local => config.local().embedding_model,
            ProviderKind::Ollama => config.ollama().embedding_model,
            ProviderKind::OpenaiCompat => {
                config
                    .openai_compat
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("openai_compat"))?
                    .embedding_model
                    .clone()
            }
            ProviderKind::Dashscope => {
                config
                    .dashscope
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("dashscope"))?
                    .embedding_model
                    .clone()
            }
        })
    }

    fn params_for(config: &ProviderConfig, kind: ProviderKind) -> GenerationParams {
        match kind {
            ProviderKind::Local => config.local().params,
            ProviderKind::Ollama => config.ollama().params,
            ProviderKind::OpenaiCompat => config
                .openai_compat
                .as_ref()
                .map(|c| c.params.clone())
                .unwrap_or_default(),
            ProviderKind::Dashscope => config
                .dashscope
                .as_ref()
                .map(|c| c.params.clone())
                .unwrap_or_default(),
        }
    }
}

/// Scan the HF hub cache for downloaded model repos
/// (`models--owner--name` directories under the hub dir).
fn scan_hub_cache() -> Vec<String> {
    let cache_root = std::env::var("HF_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            std::path::PathBuf::from(home).join(".cache").join("huggingface")
        });
    let hub_dir = cache_root.join("hub");

    let entries = match std::fs::read_dir(&hub_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut models: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| {
            name.strip_prefix("models--")
                .map(|rest| rest.replace("--", "/"))
        })
        .collect();
    models.sort();
    models.dedup();
    models
}
