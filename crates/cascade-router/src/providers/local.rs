//! Local embeddings via `fastembed` (all-MiniLM-L6-v2, 384 dimensions).
//!
//! The model is loaded lazily on first use.

use async_trait::async_trait;
use cascade_core::{EmbeddingService, Error};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Embedding dimensions for all-MiniLM-L6-v2
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// In-process embedding provider.
#[derive(Clone, Default)]
pub struct LocalEmbedder {
    model: Arc<RwLock<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ensure_model(&self) -> cascade_core::Result<()> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        if self.model.read().await.is_some() {
            return Ok(());
        }

        let mut model_guard = self.model.write().await;
        if model_guard.is_some() {
            return Ok(());
        }

        tracing::info!("Loading embedding model: all-MiniLM-L6-v2");
        let start = std::time::Instant::now();

        let mut init_options = InitOptions::default();
        init_options.model_name = EmbeddingModel::AllMiniLML6V2;
        init_options.show_download_progress = false;

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| Error::embedding(format!("failed to load embedding model: {}", e)))?;
        tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "embedding model loaded");

        *model_guard = Some(model);
        Ok(())
    }
}

#[async_trait]
impl EmbeddingService for LocalEmbedder {
    async fn embed(&self, text: &str) -> cascade_core::Result<Vec<f32>> {
        self.ensure_model().await?;

        let model_guard = self.model.read().await;
        let model = model_guard
            .as_ref()
            .ok_or_else(|| Error::embedding("embedding model not initialized"))?;

        model
            .embed(vec![text], None)
            .map_err(|e| Error::embedding(format!("failed to generate embedding: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("no embedding generated"))
    }
}
