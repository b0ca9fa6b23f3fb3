// OpenAI-compatible cloud backend
//
// Works against OpenAI itself, DeepSeek, or any self-hosted compatible
// gateway: /chat/completions for generation, /embeddings for vectors.
// Separate instances carry the chat model and the embedding model.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use loglens_core::{GenerationParams, ProviderKind};

use crate::config::OpenaiCompatConfig;
use crate::error::{ConfigError, EmbedError, GenError};
use crate::provider::{EmbeddingProvider, GenerationProvider};

#[derive(Debug, Clone)]
pub struct OpenaiCompatClient {
    client: Client,
    base_url: String,
    api_key: String,
    organization: Option<String>,
    model: String,
    embedding_dimensions: Option<usize>,
    timeout_seconds: u64,
}

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

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenaiCompatClient {
    /// Build a client for the given model name. The API key comes from the
    /// env var named in the config, never from the config itself.
    pub fn from_config(cfg: &OpenaiCompatConfig, model: &str) -> Result<Self, ConfigError> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| ConfigError::MissingApiKey(cfg.api_key_env.clone()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| ConfigError::Init(e.to_string()))?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            organization: cfg.organization.clone().filter(|o| !o.is_empty()),
            model: model.to_string(),
            embedding_dimensions: cfg.embedding_dimensions,
            timeout_seconds: cfg.timeout_seconds,
        })
    }

    fn auth_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org.clone());
        }
        builder
    }
}

fn classify_gen(status: u16, body: String, model: &str) -> GenError {
    match status {
        401 | 403 => GenError::Auth(body),
        404 => GenError::ModelNotFound(format!("{}: {}", model, body)),
        _ => GenError::Backend(body),
    }
}

fn classify_embed(status: u16, body: String, model: &str) -> EmbedError {
    match status {
        401 | 403 => EmbedError::Auth(body),
        404 => EmbedError::ModelNotFound(format!("{}: {}", model, body)),
        _ => EmbedError::Backend(body),
    }
}

#[async_trait]
impl GenerationProvider for OpenaiCompatClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenError> {
        let url = format!("{}/chat/completions", self.base_url);

        // repetition_penalty has no compatible wire field here; ignored.
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

        let response = self.auth_request(&url).json(&request).send().await.map_err(|e| {
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
            return Err(classify_gen(status.as_u16(), error_text, &self.model));
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
        ProviderKind::OpenaiCompat
    }
}

#[async_trait]
impl EmbeddingProvider for OpenaiCompatClient {
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
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
            dimensions: self.embedding_dimensions,
        };

        let response = self.auth_request(&url).json(&request).send().await.map_err(|e| {
            if e.is_timeout() {
                EmbedError::Timeout(self.timeout_seconds)
            } else if e.is_connect() {
                EmbedError::Unreachable(format!("{}: {}", self.base_url, e))
            } else {
                EmbedError::Backend(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_embed(status.as_u16(), error_text, &self.model));
        }

        let result: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Backend(format!("failed to parse response: {}", e)))?;

        // the wire order is not guaranteed; restore input order by index
        let mut items = result.data;
        items.sort_by_key(|item| item.index);
        if items.len() != texts.len() {
            return Err(EmbedError::Backend(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                items.len()
            )));
        }
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        self.embedding_dimensions
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenaiCompat
    }
}
