//! History matcher.
//!
//! Classifies an input by comparing it to the user's past successful
//! episodes. A lexical pass (bigram Jaccard) runs first. When its best score
//! lands in the ambiguous band `[ambiguous_floor, similarity_threshold)` and an
//! embedding provider is configured, a semantic pass (embedding cosine) gets a
//! chance to confirm the match.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::lexical::LexicalSimilarity;
use crate::traits::{EmbeddingService, MemoryService};
use crate::types::{clamp_confidence, AgentType, EpisodicMemory, Intent, UserId};
use crate::util::truncate;

const SCHEDULE_QUERY_HINTS: &[&str] = &["查看", "有什么", "哪些"];
const SCHEDULE_UPDATE_HINTS: &[&str] = &["修改", "更新", "取消"];
const MEMO_SEARCH_HINTS: &[&str] = &["搜索", "查找", "找"];

/// Tunables for [`HistoryMatcher`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryMatcherConfig {
    /// Lexical score needed for a match (default: 0.8).
    pub similarity_threshold: f32,
    /// Cosine score needed for a semantic match (default: 0.75).
    pub semantic_threshold: f32,
    /// Lowest lexical score that still triggers the semantic pass (default: 0.4).
    pub ambiguous_floor: f32,
    /// Episodes fetched per lookup (default: 10).
    pub max_lookup: usize,
    /// Memoized bigram sets (default: 100).
    pub bigram_cache_size: usize,
}

impl Default for HistoryMatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            semantic_threshold: 0.75,
            ambiguous_floor: 0.4,
            max_lookup: 10,
            bigram_cache_size: 100,
        }
    }
}

/// Outcome of a history lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryMatchResult {
    pub intent: Intent,
    pub confidence: f32,
    /// Id of the episode that produced the match (0 when unmatched).
    pub source_id: i64,
    pub matched: bool,
}

impl HistoryMatchResult {
    pub fn unmatched() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            source_id: 0,
            matched: false,
        }
    }

    fn hit(intent: Intent, confidence: f32, source_id: i64) -> Self {
        Self {
            intent,
            confidence: clamp_confidence(confidence),
            source_id,
            matched: true,
        }
    }
}

/// Cosine similarity computed in one pass. Mismatched lengths, empty vectors
/// and zero-norm vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Map an episode's agent type to an intent, refined by hints in `input`.
pub fn intent_for_agent(agent_type: AgentType, input: &str) -> Intent {
    let has = |hints: &[&str]| hints.iter().any(|h| input.contains(h));
    match agent_type {
        AgentType::Schedule if has(SCHEDULE_QUERY_HINTS) => Intent::ScheduleQuery,
        AgentType::Schedule if has(SCHEDULE_UPDATE_HINTS) => Intent::ScheduleUpdate,
        AgentType::Memo if has(MEMO_SEARCH_HINTS) => Intent::MemoSearch,
        other => other.default_intent(),
    }
}

/// Two-stage matcher over a user's episodic memory.
pub struct HistoryMatcher {
    memory: Option<Arc<dyn MemoryService>>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    lexical: LexicalSimilarity,
    config: HistoryMatcherConfig,
}

impl HistoryMatcher {
    pub fn new(memory: Option<Arc<dyn MemoryService>>, config: HistoryMatcherConfig) -> Self {
        Self {
            memory,
            embedder: None,
            lexical: LexicalSimilarity::new(config.similarity_threshold, config.bigram_cache_size),
            config,
        }
    }

    /// Enable the semantic pass.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingService>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &HistoryMatcherConfig {
        &self.config
    }

    pub fn has_semantic(&self) -> bool {
        self.embedder.is_some()
    }

    /// Match `input` against `user_id`'s history.
    ///
    /// A user without episodes is not an error: the result is simply unmatched.
    /// Errors from the memory store are returned to the caller.
    pub async fn match_input(&self, user_id: UserId, input: &str) -> Result<HistoryMatchResult> {
        let Some(memory) = &self.memory else {
            return Ok(HistoryMatchResult::unmatched());
        };

        let episodes = memory
            .search_episodes(user_id, input, self.config.max_lookup)
            .await?;
        let candidates: Vec<&EpisodicMemory> = episodes
            .iter()
            .filter(|ep| ep.is_success() && ep.agent_type != AgentType::Unknown)
            .collect();
        if candidates.is_empty() {
            debug!(user_id, input = %truncate(input, 50), "history: no candidate episodes");
            return Ok(HistoryMatchResult::unmatched());
        }

        let mut best_score = 0.0f32;
        let mut best: Option<&EpisodicMemory> = None;
        for episode in &candidates {
            let score = self.lexical.similarity(input, &episode.user_input);
            if score > best_score {
                best_score = score;
                best = Some(episode);
            }
        }

        if let Some(episode) = best {
            if best_score >= self.config.similarity_threshold {
                let intent = intent_for_agent(episode.agent_type, input);
                debug!(
                    user_id,
                    input = %truncate(input, 50),
                    intent = %intent,
                    score = best_score,
                    "history: lexical match"
                );
                return Ok(HistoryMatchResult::hit(intent, best_score, episode.id));
            }
        }

        if best_score >= self.config.ambiguous_floor {
            if let Some(embedder) = &self.embedder {
                return Ok(self
                    .semantic_match(embedder.as_ref(), input, &candidates)
                    .await);
            }
        }

        debug!(
            user_id,
            input = %truncate(input, 50),
            best_score,
            "history: no match"
        );
        Ok(HistoryMatchResult::unmatched())
    }

    async fn semantic_match(
        &self,
        embedder: &dyn EmbeddingService,
        input: &str,
        candidates: &[&EpisodicMemory],
    ) -> HistoryMatchResult {
        let input_vec = match embedder.embed(input).await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "history: failed to embed input, skipping semantic pass");
                return HistoryMatchResult::unmatched();
            }
        };

        let mut best_score = 0.0f32;
        let mut best: Option<&EpisodicMemory> = None;
        for episode in candidates {
            let episode_vec = match embedder.embed(&episode.user_input).await {
                Ok(v) => v,
                Err(e) => {
                    debug!(episode_id = episode.id, error = %e, "history: failed to embed episode");
                    continue;
                }
            };
            let score = cosine_similarity(&input_vec, &episode_vec);
            if score > best_score {
                best_score = score;
                best = Some(episode);
            }
        }

        match best {
            Some(episode) if best_score >= self.config.semantic_threshold => {
                let intent = intent_for_agent(episode.agent_type, input);
                debug!(
                    input = %truncate(input, 50),
                    intent = %intent,
                    score = best_score,
                    "history: semantic match"
                );
                HistoryMatchResult::hit(intent, best_score, episode.id)
            }
            _ => HistoryMatchResult::unmatched(),
        }
    }

    /// Record a routing decision as a new episode.
    pub async fn save_decision(
        &self,
        user_id: UserId,
        input: &str,
        intent: Intent,
        success: bool,
    ) -> Result<()> {
        let Some(memory) = &self.memory else {
            return Ok(());
        };
        memory
            .save_episode(EpisodicMemory::routing_decision(user_id, input, intent, success))
            .await
    }
}
