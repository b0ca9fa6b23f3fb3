// Local in-process backend
//
// Embeddings run on fastembed ONNX models, generation on candle with
// quantized GGUF weights. Both load once and are reused behind a mutex;
// calls run on the blocking pool so a slow local inference never stalls
// unrelated requests on the async runtime.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama::ModelWeights;
use fastembed::{InitOptions, TextEmbedding};
use tokenizers::Tokenizer;
use tracing::info;

use loglens_core::{GenerationParams, ProviderKind};

use crate::config::LocalConfig;
use crate::error::{ConfigError, EmbedError, GenError};
use crate::provider::{EmbeddingProvider, GenerationProvider};

// fixed seed keeps sampled runs reproducible for a fixed model + prompt
const GEN_SEED: u64 = 299792458;
// how far back repetition penalty looks
const REPEAT_LAST_N: usize = 64;

// EMBEDDING //

#[derive(Clone)]
pub struct LocalEmbedding {
    model_name: String,
    dim: usize,
    model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedding {
    /// Load the ONNX embedding model once. `model_name` must be one of
    /// fastembed's supported model codes.
    pub fn new(model_name: &str) -> Result<Self, ConfigError> {
        let info = TextEmbedding::list_supported_models()
            .into_iter()
            .find(|m| m.model_code.eq_ignore_ascii_case(model_name))
            .ok_or_else(|| {
                ConfigError::Init(format!("unsupported local embedding model: {}", model_name))
            })?;

        info!(model = %info.model_code, dim = info.dim, "Loading local embedding model");
        let model = TextEmbedding::try_new(InitOptions::new(info.model.clone()))
            .map_err(|e| ConfigError::Init(e.to_string()))?;

        Ok(Self {
            model_name: info.model_code.clone(),
            dim: info.dim,
            model: Arc::new(Mutex::new(model)),
        })
    }

    fn embed_blocking(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut model = self.model.lock().unwrap();
        model
            .embed(texts, None)
            .map_err(|e| EmbedError::Backend(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::Backend("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let this = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || this.embed_blocking(texts))
            .await
            .map_err(|e| EmbedError::Backend(e.to_string()))?
    }

    fn model(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dim)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }
}

// GENERATION //

#[derive(Clone)]
pub struct LocalGeneration {
    model: Arc<Mutex<ModelWeights>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    eos_token: String,
    context_length: usize,
}

impl LocalGeneration {
    /// Fetch GGUF weights + tokenizer from the hub cache (downloading on
    /// first use) and load them once.
    pub fn load(cfg: &LocalConfig) -> Result<Self, ConfigError> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| ConfigError::Init(e.to_string()))?;

        let weights_path = api
            .model(cfg.gguf_repo.clone())
            .get(&cfg.gguf_file)
            .map_err(|e| ConfigError::Init(format!("fetch {}: {}", cfg.gguf_file, e)))?;
        let tokenizer_path = api
            .model(cfg.tokenizer_repo.clone())
            .get("tokenizer.json")
            .map_err(|e| ConfigError::Init(format!("fetch tokenizer.json: {}", e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ConfigError::Init(e.to_string()))?;

        info!(file = %cfg.gguf_file, "Loading GGUF weights");
        let mut file = std::fs::File::open(&weights_path)
            .map_err(|e| ConfigError::Init(e.to_string()))?;
        let content =
            gguf_file::Content::read(&mut file).map_err(|e| ConfigError::Init(e.to_string()))?;
        let model = ModelWeights::from_gguf(content, &mut file, &Device::Cpu)
            .map_err(|e| ConfigError::Init(e.to_string()))?;
        info!(model = %cfg.gguf_repo, "Local generation model ready");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            tokenizer: Arc::new(tokenizer),
            model_name: format!("{}/{}", cfg.gguf_repo, cfg.gguf_file),
            eos_token: cfg.eos_token.clone(),
            context_length: cfg.context_length,
        })
    }

    fn run(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenError> {
        let device = Device::Cpu;

        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| GenError::Backend(e.to_string()))?;
        let mut tokens: Vec<u32> = encoding.get_ids().to_vec();
        if tokens.is_empty() {
            return Err(GenError::Backend("prompt tokenized to nothing".to_string()));
        }

        // keep room in the context window for the new tokens
        let max_new = params.max_new_tokens as usize;
        if tokens.len() + max_new > self.context_length {
            let keep = self.context_length.saturating_sub(max_new).max(8);
            tokens = tokens.split_off(tokens.len() - keep.min(tokens.len()));
        }

        let sampling = if !params.do_sample || params.temperature <= 0.0 {
            Sampling::ArgMax
        } else {
            Sampling::TopP {
                p: params.top_p as f64,
                temperature: params.temperature as f64,
            }
        };
        let mut logits_processor = LogitsProcessor::from_sampling(GEN_SEED, sampling);
        let eos = self.tokenizer.token_to_id(&self.eos_token);

        let mut model = self.model.lock().unwrap();

        // index_pos 0 resets the kv cache, so each call starts clean
        let input = Tensor::new(tokens.as_slice(), &device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| GenError::Backend(e.to_string()))?;
        let logits = model
            .forward(&input, 0)
            .and_then(|l| l.squeeze(0))
            .map_err(|e| GenError::Backend(e.to_string()))?;
        let mut next = logits_processor
            .sample(&logits)
            .map_err(|e| GenError::Backend(e.to_string()))?;

        let mut all_tokens = tokens.clone();
        let mut generated: Vec<u32> = Vec::new();

        for index in 0..max_new {
            if Some(next) == eos {
                break;
            }
            generated.push(next);
            all_tokens.push(next);

            let input = Tensor::new(&[next], &device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| GenError::Backend(e.to_string()))?;
            let logits = model
                .forward(&input, tokens.len() + index)
                .and_then(|l| l.squeeze(0))
                .map_err(|e| GenError::Backend(e.to_string()))?;

            let logits = if (params.repetition_penalty - 1.0).abs() < f32::EPSILON {
                logits
            } else {
                let start = all_tokens.len().saturating_sub(REPEAT_LAST_N);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    params.repetition_penalty,
                    &all_tokens[start..],
                )
                .map_err(|e| GenError::Backend(e.to_string()))?
            };

            next = logits_processor
                .sample(&logits)
                .map_err(|e| GenError::Backend(e.to_string()))?;
        }

        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| GenError::Backend(e.to_string()))?;
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl GenerationProvider for LocalGeneration {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenError> {
        let this = self.clone();
        let prompt = prompt.to_string();
        let params = params.clone();
        tokio::task::spawn_blocking(move || this.run(&prompt, &params))
            .await
            .map_err(|e| GenError::Backend(e.to_string()))?
    }

    fn model(&self) -> &str {
        &self.model_name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }
}
