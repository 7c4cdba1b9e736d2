//! Ollama client (`/api/generate` and `/api/embed`).

use async_trait::async_trait;
use cascade_core::{EmbeddingService, Error, LlmClient, ModelConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{http_client, join_url};
use crate::error::RouterResult;

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, embedding_model: Option<String>) -> RouterResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.to_string(),
            model: model.to_string(),
            embedding_model,
        })
    }

    fn generate_request<'a>(&'a self, prompt: &'a str, config: &'a ModelConfig) -> GenerateRequest<'a> {
        GenerateRequest {
            model: if config.model.is_empty() {
                self.model.as_str()
            } else {
                config.model.as_str()
            },
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str, config: &ModelConfig) -> cascade_core::Result<String> {
        let body = self.generate_request(prompt, config);
        debug!(model = body.model, "ollama generate request");

        let resp = self
            .client
            .post(join_url(&self.base_url, "api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::llm(format!("request failed: {}. Is Ollama running?", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::llm(format!("Ollama error {}: {}", status, text)));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| Error::llm(format!("failed to parse response: {}", e)))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl EmbeddingService for OllamaClient {
    async fn embed(&self, text: &str) -> cascade_core::Result<Vec<f32>> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or_else(|| Error::embedding("no embedding model configured"))?;

        let resp = self
            .client
            .post(join_url(&self.base_url, "api/embed"))
            .json(&EmbedRequest { model, input: text })
            .send()
            .await
            .map_err(|e| Error::embedding(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::embedding(format!("Ollama error {}: {}", status, text)));
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| Error::embedding(format!("failed to parse response: {}", e)))?;
        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("empty embedding response"))
    }
}
