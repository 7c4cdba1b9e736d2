//! Collaborator traits consumed by the routing layers.
//!
//! Implementations handle the actual backends (SQLite, in-memory, HTTP
//! providers, etc.). None of these traits impose a wire format.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::{EpisodicMemory, ModelConfig, RouterFeedback, RouterStats, UserId, WeightTable};

/// Episodic memory backend used by the history matcher.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Return up to `limit` of the user's episodes most similar to `query`.
    ///
    /// Candidate retrieval strategy is up to the implementation.
    async fn search_episodes(
        &self,
        user_id: UserId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<EpisodicMemory>>;

    /// Persist a new episode.
    async fn save_episode(&self, episode: EpisodicMemory) -> Result<()>;
}

/// Text embedding provider.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a single text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Text completion provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a completion request and return the raw response text.
    async fn complete(&self, prompt: &str, config: &ModelConfig) -> Result<String>;
}

/// Storage for per-user keyword weights and the feedback log.
#[async_trait]
pub trait RouterWeightStorage: Send + Sync {
    /// Custom weights for a user. Empty when none were ever saved.
    async fn get_weights(&self, user_id: UserId) -> Result<WeightTable>;

    /// Merge `weights` into the user's stored weights.
    async fn save_weights(&self, user_id: UserId, weights: &WeightTable) -> Result<()>;

    /// Append a feedback event.
    async fn record_feedback(&self, feedback: &RouterFeedback) -> Result<()>;

    /// Accuracy statistics over feedback recorded within `window`.
    async fn get_stats(&self, user_id: UserId, window: Duration) -> Result<RouterStats>;
}
