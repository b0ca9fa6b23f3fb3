// DashScope managed cloud backend
//
// Chat goes through DashScope's OpenAI-compatible surface. Embeddings do
// NOT: the compat embeddings shim rejects this provider's batch request
// shape, so the embedding path speaks the native embeddings contract
// (different endpoint, different request/response types). This is a hard
// per-provider branch, not a generic code path.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use loglens_core::{GenerationParams, ProviderKind};

use crate::config::DashscopeConfig;
use crate::error::{ConfigError, EmbedError, GenError};
use crate::provider::{EmbeddingProvider, GenerationProvider};

// native embeddings endpoint caps inputs per request
const EMBED_BATCH_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct DashscopeClient {
    client: Client,
    base_url: String,
    embeddings_url: String,
    api_key: String,
    model: String,
    embedding_dimensions: Option<usize>,
    timeout_seconds: u64,
}

// chat: OpenAI-compatible wire shapes

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

// embeddings: native wire shapes

#[derive(Serialize)]
struct NativeEmbeddingRequest<'a> {
    model: &'a str,
    input: NativeInput<'a>,
    parameters: NativeParameters,
}

#[derive(Serialize)]
struct NativeInput<'a> {
    texts: &'a [String],
}

#[derive(Serialize)]
struct NativeParameters {
    text_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
}

#[derive(Deserialize)]
struct NativeEmbeddingResponse {
    output: NativeOutput,
}

#[derive(Deserialize)]
struct NativeOutput {
    embeddings: Vec<NativeEmbeddingItem>,
}

#[derive(Deserialize)]
struct NativeEmbeddingItem {
    text_index: usize,
    embedding: Vec<f32>,
}

impl DashscopeClient {
    pub fn from_config(cfg: &DashscopeConfig, model: &str) -> Result<Self, ConfigError> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| ConfigError::MissingApiKey(cfg.api_key_env.clone()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| ConfigError::Init(e.to_string()))?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            embeddings_url: cfg.embeddings_url.clone(),
            api_key,
            model: model.to_string(),
            embedding_dimensions: cfg.embedding_dimensions,
            timeout_seconds: cfg.timeout_seconds,
        })
    }

    async fn embed_batch_native(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let request = NativeEmbeddingRequest {
            model: &self.model,
            input: NativeInput { texts },
            parameters: NativeParameters {
                text_type: "document",
                dimension: self.embedding_dimensions,
            },
        };

        let response = self
            .client
            .post(&self.embeddings_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbedError::Timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    EmbedError::Unreachable(format!("{}: {}", self.embeddings_url, e))
                } else {
                    EmbedError::Backend(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => EmbedError::Auth(error_text),
                404 => EmbedError::ModelNotFound(format!("{}: {}", self.model, error_text)),
                _ => EmbedError::Backend(error_text),
            });
        }

        let result: NativeEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Backend(format!("failed to parse response: {}", e)))?;

        let mut items = result.output.embeddings;
        items.sort_by_key(|item| item.text_index);
        if items.len() != texts.len() {
            return Err(EmbedError::Backend(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                items.len()
            )));
        }
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl GenerationProvider for DashscopeClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenError> {
        let url = format!("{}/chat/completions", self.base_url);

        let temperature = if params.do_sample {
            params.temperature
        } else {
            0.0
        };

        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature,
            top_p: params.top_p,
            max_tokens: params.max_new_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenError::Timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    GenError::Unreachable(format!("{}: {}", self.base_url, e))
                } else {
                    GenError::Backend(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => GenError::Auth(error_text),
                404 => GenError::ModelNotFound(format!("{}: {}", self.model, error_text)),
                _ => GenError::Backend(error_text),
            });
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenError::Backend(format!("failed to parse response: {}", e)))?;
        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenError::Backend("empty choices in response".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Dashscope
    }
}

#[async_trait]
impl EmbeddingProvider for DashscopeClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch_native(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::Backend("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        // stay under the native endpoint's per-request input ceiling
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_LIMIT) {
            vectors.extend(self.embed_batch_native(batch).await?);
        }
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        self.embedding_dimensions
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Dashscope
    }
}
