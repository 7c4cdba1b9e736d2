//! OpenAI-compatible chat completion and embedding client.

use async_trait::async_trait;
use cascade_core::{EmbeddingService, Error, LlmClient, ModelConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{http_client, join_url};
use crate::error::RouterResult;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    embedding_model: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        embedding_model: Option<String>,
    ) -> RouterResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.to_string(),
            api_key,
            model: model.to_string(),
            embedding_model,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(join_url(&self.base_url, path));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    fn chat_request<'a>(&'a self, prompt: &'a str, config: &'a ModelConfig) -> ChatRequest<'a> {
        let model = if config.model.is_empty() {
            self.model.as_str()
        } else {
            config.model.as_str()
        };
        ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

fn first_choice(response: ChatResponse) -> cascade_core::Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::llm("empty completion"))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str, config: &ModelConfig) -> cascade_core::Result<String> {
        let body = self.chat_request(prompt, config);
        debug!(model = body.model, "chat completion request");

        let resp = self
            .post("chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::llm(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::llm(format!("API error {}: {}", status, text)));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::llm(format!("failed to parse response: {}", e)))?;
        first_choice(parsed)
    }
}

#[async_trait]
impl EmbeddingService for OpenAiClient {
    async fn embed(&self, text: &str) -> cascade_core::Result<Vec<f32>> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or_else(|| Error::embedding("no embedding model configured"))?;

        let resp = self
            .post("embeddings")
            .json(&EmbeddingRequest { model, input: text })
            .send()
            .await
            .map_err(|e| Error::embedding(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::embedding(format!("API error {}: {}", status, text)));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| Error::embedding(format!("failed to parse response: {}", e)))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::embedding("empty embedding response"))
    }
}
