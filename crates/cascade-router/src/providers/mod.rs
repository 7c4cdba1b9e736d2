//! LLM and embedding provider adapters.
//!
//! Each provider is one adapter implementing the core [`LlmClient`] and/or
//! [`EmbeddingService`] traits. [`ProviderConfig`] selects which one to build.

pub mod ollama;
pub mod openai;

#[cfg(feature = "local-embeddings")]
pub mod local;

use cascade_core::{EmbeddingService, LlmClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::RouterResult;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

/// HTTP timeout applied to provider clients. The classifier enforces its own,
/// usually shorter, deadline on top.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Any OpenAI-compatible `/chat/completions` + `/embeddings` endpoint.
    #[serde(rename = "openai")]
    OpenAi {
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
        model: String,
        #[serde(default)]
        embedding_model: Option<String>,
    },
    /// A local Ollama server.
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        model: String,
        #[serde(default)]
        embedding_model: Option<String>,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Build the completion client for `config`.
pub fn build_llm_client(config: &ProviderConfig) -> RouterResult<Arc<dyn LlmClient>> {
    Ok(match config {
        ProviderConfig::OpenAi {
            base_url,
            api_key,
            model,
            embedding_model,
        } => Arc::new(OpenAiClient::new(
            base_url,
            api_key.clone(),
            model,
            embedding_model.clone(),
        )?),
        ProviderConfig::Ollama {
            base_url,
            model,
            embedding_model,
        } => Arc::new(OllamaClient::new(base_url, model, embedding_model.clone())?),
    })
}

/// Build the embedding client for `config`, if it names an embedding model.
pub fn build_embedder(config: &ProviderConfig) -> RouterResult<Option<Arc<dyn EmbeddingService>>> {
    Ok(match config {
        ProviderConfig::OpenAi {
            base_url,
            api_key,
            model,
            embedding_model: Some(embedding_model),
        } => Some(Arc::new(OpenAiClient::new(
            base_url,
            api_key.clone(),
            model,
            Some(embedding_model.clone()),
        )?)),
        ProviderConfig::Ollama {
            base_url,
            model,
            embedding_model: Some(embedding_model),
        } => Some(Arc::new(OllamaClient::new(
            base_url,
            model,
            Some(embedding_model.clone()),
        )?)),
        _ => None,
    })
}

/// In-process embedding provider backed by `fastembed`.
#[cfg(feature = "local-embeddings")]
pub fn local_embedder() -> Arc<dyn EmbeddingService> {
    Arc::new(local::LocalEmbedder::new())
}

fn http_client() -> RouterResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()?)
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_from_toml() {
        let config: ProviderConfig = toml::from_str(
            r#"
            kind = "openai"
            base_url = "https://api.example.com/v1"
            api_key = "sk-test"
            model = "qwen2.5-7b-instruct"
            "#,
        )
        .unwrap();
        assert!(matches!(config, ProviderConfig::OpenAi { ref api_key, .. } if api_key.as_deref() == Some("sk-test")));

        let config: ProviderConfig = toml::from_str(
            r#"
            kind = "ollama"
            model = "qwen2.5:0.5b"
            embedding_model = "nomic-embed-text"
            "#,
        )
        .unwrap();
        match config {
            ProviderConfig::Ollama { base_url, .. } => assert_eq!(base_url, "http://localhost:11434"),
            other => panic!("unexpected provider: {:?}", other),
        }
    }

    #[test]
    fn test_build_clients() {
        let config = ProviderConfig::Ollama {
            base_url: default_ollama_url(),
            model: "qwen2.5:0.5b".into(),
            embedding_model: None,
        };
        assert!(build_llm_client(&config).is_ok());
        assert!(build_embedder(&config).unwrap().is_none());

        let config = ProviderConfig::OpenAi {
            base_url: "https://api.example.com/v1".into(),
            api_key: None,
            model: "m".into(),
            embedding_model: Some("e".into()),
        };
        assert!(build_embedder(&config).unwrap().is_some());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://x/v1/", "/chat/completions"), "http://x/v1/chat/completions");
        assert_eq!(join_url("http://x", "api/generate"), "http://x/api/generate");
    }
}
