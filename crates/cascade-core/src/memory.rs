//! In-memory episodic memory store.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::lexical::{extract_bigrams, jaccard};
use crate::traits::MemoryService;
use crate::types::{EpisodicMemory, UserId};

#[derive(Default)]
struct EpisodeLog {
    episodes: Vec<EpisodicMemory>,
    next_id: i64,
}

/// Process-local [`MemoryService`].
///
/// Search ranks a user's episodes by bigram overlap with the query, newest
/// first on ties.
#[derive(Default)]
pub struct InMemoryMemoryService {
    log: Mutex<EpisodeLog>,
}

impl InMemoryMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total stored episodes across all users.
    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn search_episodes(
        &self,
        user_id: UserId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<EpisodicMemory>> {
        let query_bigrams = extract_bigrams(query);
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);

        let mut scored: Vec<(f32, &EpisodicMemory)> = log
            .episodes
            .iter()
            .filter(|ep| ep.user_id == user_id)
            .map(|ep| (jaccard(&query_bigrams, &extract_bigrams(&ep.user_input)), ep))
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
                .then_with(|| b.1.id.cmp(&a.1.id))
        });

        Ok(scored.into_iter().take(limit).map(|(_, ep)| ep.clone()).collect())
    }

    async fn save_episode(&self, mut episode: EpisodicMemory) -> Result<()> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.next_id += 1;
        episode.id = log.next_id;
        log.episodes.push(episode);
        Ok(())
    }
}
