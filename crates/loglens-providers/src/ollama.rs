// Ollama daemon backend
//
// HTTP client for a locally running Ollama service. One instance per model:
// the registry constructs separate instances for generation and embedding.
// Connection refusal surfaces as Unreachable, a missing model as
// ModelNotFound - the two mean very different operator actions.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use loglens_core::{GenerationParams, ProviderKind};

use crate::error::{ConfigError, EmbedError, GenError};
use crate::provider::{EmbeddingProvider, GenerationProvider};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    timeout_seconds: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ConfigError::Init(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            timeout_seconds,
        })
    }

    /// List models the daemon has pulled (GET /api/tags)
    pub async fn list_models(&self) -> Result<Vec<String>, GenError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_err(e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenError::Backend(error_text));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GenError::Backend(format!("failed to parse tags: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn request_err(&self, e: reqwest::Error) -> GenError {
        if e.is_timeout() {
            GenError::Timeout(self.timeout_seconds)
        } else if e.is_connect() {
            GenError::Unreachable(format!("{}: {}", self.base_url, e))
        } else {
            GenError::Backend(e.to_string())
        }
    }

    fn embed_request_err(&self, e: reqwest::Error) -> EmbedError {
        if e.is_timeout() {
            EmbedError::Timeout(self.timeout_seconds)
        } else if e.is_connect() {
            EmbedError::Unreachable(format!("{}: {}", self.base_url, e))
        } else {
            EmbedError::Backend(e.to_string())
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingsRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.embed_request_err(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 404 {
                return Err(EmbedError::ModelNotFound(format!(
                    "{}: {}",
                    self.model, error_text
                )));
            }
            return Err(EmbedError::Backend(error_text));
        }

        let result: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Backend(format!("failed to parse response: {}", e)))?;
        Ok(result.embedding)
    }
}

#[async_trait]
impl GenerationProvider for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenError> {
        let url = format!("{}/api/generate", self.base_url);

        // do_sample has no Ollama equivalent; temperature 0 is the closest
        let temperature = if params.do_sample {
            params.temperature
        } else {
            0.0
        };

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature,
                top_p: params.top_p,
                repeat_penalty: params.repetition_penalty,
                num_predict: params.max_new_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_err(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 404 {
                return Err(GenError::ModelNotFound(format!(
                    "{}: {}",
                    self.model, error_text
                )));
            }
            return Err(GenError::Backend(error_text));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenError::Backend(format!("failed to parse response: {}", e)))?;

        Ok(result.response)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_one(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        // the daemon's embeddings endpoint takes one prompt per call
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        // the daemon does not expose this cheaply; the index records it on
        // first upsert instead
        None
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }
}
