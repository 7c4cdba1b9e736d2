//! Intent classification service.
//!
//! Ties the cascade together: cache, keyword rules, history and finally the
//! LLM. Each call walks the layers in order and stops at the first match.
//! Collaborators are optional; a missing one disables its layer.

use cascade_core::util::truncate;
use cascade_core::{
    CacheStats, ClassificationResult, ClassificationSource, EmbeddingService, FeedbackCollector,
    FeedbackType, HistoryMatcher, Intent, LlmClassifier, LlmClient, MemoryService, RouterCache,
    RouterFeedback, RouterStats, RouterWeightStorage, RuleMatcher, UserId, WeightAdjustment,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::error::RouterResult;
use crate::history_queue::{HistoryWriter, SaveRequest};

/// Builder for [`Service`].
pub struct ServiceBuilder {
    config: RouterConfig,
    memory: Option<Arc<dyn MemoryService>>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    llm: Option<Arc<dyn LlmClient>>,
    weights: Option<Arc<dyn RouterWeightStorage>>,
}

impl ServiceBuilder {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            memory: None,
            embedder: None,
            llm: None,
            weights: None,
        }
    }

    /// Episodic memory backing the history layer.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Embedding provider for the semantic history pass.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingService>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Completion client for the LLM fallback.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Weight and feedback storage.
    pub fn with_weight_storage(mut self, storage: Arc<dyn RouterWeightStorage>) -> Self {
        self.weights = Some(storage);
        self
    }

    /// Validate the configuration and assemble the service.
    ///
    /// Must be called inside a Tokio runtime for background history saves to
    /// run; outside one they are disabled.
    pub fn build(self) -> RouterResult<Service> {
        self.config.validate()?;

        let cache = self
            .config
            .cache
            .enabled
            .then(|| RouterCache::new(self.config.cache_config()));

        let has_memory = self.memory.is_some();
        let mut history = HistoryMatcher::new(self.memory, self.config.history_config());
        if let Some(embedder) = self.embedder {
            history = history.with_embedder(embedder);
        }
        let history = Arc::new(history);

        let llm = self
            .llm
            .map(|client| LlmClassifier::new(client, self.config.llm_config()));
        let feedback = self.weights.map(FeedbackCollector::new);

        let writer = HistoryWriter::spawn(
            history.clone(),
            self.config.history_queue.capacity,
            self.config.save_timeout(),
        );

        info!(
            cache = cache.is_some(),
            history = has_memory,
            semantic = history.has_semantic(),
            llm = llm.is_some(),
            feedback = feedback.is_some(),
            "intent router ready"
        );

        Ok(Service {
            config: self.config,
            cache,
            rules: RuleMatcher::new(),
            history,
            has_memory,
            llm,
            feedback,
            writer,
        })
    }
}

/// The intent router.
pub struct Service {
    config: RouterConfig,
    cache: Option<RouterCache>,
    rules: RuleMatcher,
    history: Arc<HistoryMatcher>,
    has_memory: bool,
    llm: Option<LlmClassifier>,
    feedback: Option<FeedbackCollector>,
    writer: HistoryWriter,
}

impl Service {
    pub fn builder(config: RouterConfig) -> ServiceBuilder {
        ServiceBuilder::new(config)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The rule layer, including its per-user weight overrides.
    pub fn rules(&self) -> &RuleMatcher {
        &self.rules
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Classification
    // ─────────────────────────────────────────────────────────────────────────

    /// Classify `input`, personalizing with `user_id` when present.
    ///
    /// Only the LLM layer can fail; every other layer degrades to "no match".
    /// When nothing matches the result is [`ClassificationResult::unmatched`].
    pub async fn classify(
        &self,
        user_id: Option<UserId>,
        input: &str,
    ) -> RouterResult<ClassificationResult> {
        let start = Instant::now();
        let user_id = user_id.filter(|id| *id > 0);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(input) {
                let result =
                    ClassificationResult::new(hit.intent, hit.confidence, ClassificationSource::Cache);
                return Ok(self.finish(input, result, start));
            }
        }

        let rule = match user_id {
            Some(id) => self.rules.match_with_user(input, id),
            None => self.rules.match_input(input),
        };
        if let Some(rule) = rule {
            let result = ClassificationResult::new(rule.intent, rule.confidence, ClassificationSource::Rule);
            self.remember(input, &result);
            return Ok(self.finish(input, result, start));
        }

        if let Some(id) = user_id {
            match self.history.match_input(id, input).await {
                Ok(found) if found.matched => {
                    let result = ClassificationResult::new(
                        found.intent,
                        found.confidence,
                        ClassificationSource::History,
                    );
                    self.remember(input, &result);
                    return Ok(self.finish(input, result, start));
                }
                Ok(_) => {}
                Err(e) => warn!(user_id = id, error = %e, "history layer unavailable, skipping"),
            }
        }

        if let Some(llm) = &self.llm {
            let (intent, confidence) = llm.classify(input).await.map_err(|e| {
                warn!(input = %truncate(input, 50), error = %e, "LLM classification failed");
                e
            })?;
            let result = ClassificationResult::new(intent, confidence, ClassificationSource::Llm);
            if intent != Intent::Unknown {
                self.remember(input, &result);
            }
            if let Some(id) = user_id {
                if self.has_memory {
                    self.writer.enqueue(SaveRequest {
                        user_id: id,
                        input: input.to_string(),
                        intent,
                    });
                }
            }
            return Ok(self.finish(input, result, start));
        }

        debug!(input = %truncate(input, 50), "no layer matched");
        Ok(ClassificationResult::unmatched())
    }

    /// Classify and return only the intent and confidence.
    pub async fn classify_intent(
        &self,
        user_id: Option<UserId>,
        input: &str,
    ) -> RouterResult<(Intent, f32)> {
        let result = self.classify(user_id, input).await?;
        Ok((result.intent, result.confidence))
    }

    fn remember(&self, input: &str, result: &ClassificationResult) {
        if let (Some(cache), Some(source)) = (&self.cache, result.source) {
            cache.set(input, result.intent, result.confidence, source);
        }
    }

    fn finish(&self, input: &str, result: ClassificationResult, start: Instant) -> ClassificationResult {
        debug!(
            input = %truncate(input, 50),
            intent = %result.intent,
            confidence = result.confidence,
            source = result.source.map(|s| s.as_str()).unwrap_or("none"),
            latency_ms = start.elapsed().as_millis() as u64,
            "classified"
        );
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Feedback and weights
    // ─────────────────────────────────────────────────────────────────────────

    /// Record feedback and apply the resulting weight adjustments.
    ///
    /// A no-op when feedback is disabled or no weight storage is configured.
    /// Non-positive feedback also evicts the cached decision for the input.
    pub async fn record_feedback(&self, feedback: &RouterFeedback) -> RouterResult<Vec<WeightAdjustment>> {
        if !self.config.feedback.enabled {
            return Ok(Vec::new());
        }
        let Some(collector) = &self.feedback else {
            debug!("no weight storage configured, ignoring feedback");
            return Ok(Vec::new());
        };

        let adjustments = collector.record_feedback(feedback).await?;
        self.rules.merge_adjustments(feedback.user_id, &adjustments);

        if feedback.feedback_type != FeedbackType::Positive {
            if let Some(cache) = &self.cache {
                cache.invalidate(&feedback.input);
            }
        }
        Ok(adjustments)
    }

    /// Load `user_id`'s stored weights into the rule layer. Call at session start.
    pub async fn load_user_weights(&self, user_id: UserId) -> RouterResult<()> {
        let Some(collector) = &self.feedback else {
            return Ok(());
        };
        let weights = collector.storage().get_weights(user_id).await?;
        debug!(user_id, categories = weights.len(), "loaded user weights");
        self.rules.set_custom_weights(user_id, weights);
        Ok(())
    }

    /// Routing accuracy for `user_id` over the last `window`.
    pub async fn get_router_stats(&self, user_id: UserId, window: Duration) -> RouterResult<RouterStats> {
        match &self.feedback {
            Some(collector) => Ok(collector.stats(user_id, window).await?),
            None => Ok(RouterStats::empty()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cache and lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Cache statistics, or `None` when the cache is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(RouterCache::stats)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// History saves dropped because the queue was full or closed.
    pub fn dropped_history_saves(&self) -> u64 {
        self.writer.dropped()
    }

    /// Stop background work. With `drain`, pending history saves complete first.
    pub async fn shutdown(&self, drain: bool) {
        self.writer.shutdown(drain).await;
        info!(drain, "intent router stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;
    use async_trait::async_trait;
    use cascade_core::{
        Category, EpisodicMemory, InMemoryMemoryService, InMemoryWeightStorage, ModelConfig, WeightTable,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    struct CountingLlm {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl CountingLlm {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for CountingLlm {
        async fn complete(&self, _: &str, _: &ModelConfig) -> cascade_core::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| cascade_core::Error::llm("provider unavailable"))
        }
    }

    fn service_with_llm(llm: Arc<CountingLlm>) -> Service {
        Service::builder(RouterConfig::default())
            .with_llm(llm)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_rule_match_then_cache() {
        let llm = CountingLlm::replying("general");
        let service = service_with_llm(llm.clone());

        let first = service.classify(None, "明天有什么会议").await.unwrap();
        assert_eq!(first.intent, Intent::ScheduleQuery);
        assert!(first.confidence > 0.0);
        assert_eq!(first.source, Some(ClassificationSource::Rule));

        let second = service.classify(None, "明天有什么会议").await.unwrap();
        assert_eq!(second.intent, Intent::ScheduleQuery);
        assert_eq!(second.confidence, first.confidence);
        assert_eq!(second.source, Some(ClassificationSource::Cache));

        assert_eq!(llm.calls(), 0);
        let stats = service.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_llm_result_computed_once() {
        let llm = CountingLlm::replying(r#"{"intent":"general","confidence":0.9}"#);
        let service = service_with_llm(llm.clone());

        let first = service.classify(None, "今晚吃什么好").await.unwrap();
        let second = service.classify(None, "今晚吃什么好").await.unwrap();

        assert_eq!(first.intent, Intent::General);
        assert_eq!(first.source, Some(ClassificationSource::Llm));
        assert_eq!(second.source, Some(ClassificationSource::Cache));
        assert_eq!((first.intent, first.confidence), (second.intent, second.confidence));
        assert_eq!(llm.calls(), 1);
    }

    struct CountingMemory {
        inner: InMemoryMemoryService,
        searches: AtomicUsize,
    }

    #[async_trait]
    impl MemoryService for CountingMemory {
        async fn search_episodes(
            &self,
            user_id: UserId,
            query: &str,
            limit: usize,
        ) -> cascade_core::Result<Vec<EpisodicMemory>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.inner.search_episodes(user_id, query, limit).await
        }

        async fn save_episode(&self, episode: EpisodicMemory) -> cascade_core::Result<()> {
            self.inner.save_episode(episode).await
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_history_and_llm() {
        let memory = Arc::new(CountingMemory {
            inner: InMemoryMemoryService::new(),
            searches: AtomicUsize::new(0),
        });
        let llm = CountingLlm::replying("general");
        let service = Service::builder(RouterConfig::default())
            .with_memory(memory.clone())
            .with_llm(llm.clone())
            .build()
            .unwrap();

        let first = assert_ok!(service.classify(Some(1), "今晚吃什么好").await);
        assert_eq!(first.source, Some(ClassificationSource::Llm));
        assert_eq!(memory.searches.load(Ordering::SeqCst), 1);

        let second = assert_ok!(service.classify(Some(1), "今晚吃什么好").await);
        assert_eq!(second.source, Some(ClassificationSource::Cache));
        assert_eq!(memory.searches.load(Ordering::SeqCst), 1);
        assert_eq!(llm.calls(), 1);
        service.shutdown(true).await;
    }

    #[tokio::test]
    async fn test_no_layer_matches() {
        let service = Service::builder(RouterConfig::default()).build().unwrap();
        let result = service.classify(Some(1), "今晚吃什么好").await.unwrap();
        assert_eq!(result, ClassificationResult::unmatched());
    }

    #[tokio::test]
    async fn test_llm_error_is_returned_and_not_cached() {
        let llm = CountingLlm::failing();
        let service = service_with_llm(llm.clone());

        assert_err!(service.classify(None, "今晚吃什么好").await);
        assert_err!(service.classify(None, "今晚吃什么好").await);
        assert_eq!(llm.calls(), 2);
        assert_eq!(service.cache_stats().unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_llm_confidence_is_clamped() {
        let llm = CountingLlm::replying(r#"{"intent":"memo_search","confidence":7}"#);
        let service = service_with_llm(llm);
        let result = service.classify(None, "上次那个东西").await.unwrap();
        assert_eq!(result.intent, Intent::MemoSearch);
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_history_layer() {
        let memory = Arc::new(InMemoryMemoryService::new());
        memory
            .save_episode(EpisodicMemory::routing_decision(1, "周报进度如何", Intent::MemoCreate, true))
            .await
            .unwrap();
        let llm = CountingLlm::replying("general");
        let service = Service::builder(RouterConfig::default())
            .with_memory(memory)
            .with_llm(llm.clone())
            .build()
            .unwrap();

        let result = service.classify(Some(1), "周报进度如何").await.unwrap();
        assert_eq!(result.intent, Intent::MemoCreate);
        assert_eq!(result.source, Some(ClassificationSource::History));
        assert_eq!(result.confidence, 1.0);
        assert_eq!(llm.calls(), 0);

        // Anonymous callers skip history.
        service.clear_cache();
        let result = service.classify(None, "周报进度如何").await.unwrap();
        assert_eq!(result.source, Some(ClassificationSource::Llm));
    }

    #[tokio::test]
    async fn test_llm_decision_saved_to_history() {
        let memory = Arc::new(InMemoryMemoryService::new());
        let service = Service::builder(RouterConfig::default())
            .with_memory(memory.clone())
            .with_llm(CountingLlm::replying("memo_search"))
            .build()
            .unwrap();

        service.classify(Some(1), "上次那个东西").await.unwrap();
        service.shutdown(true).await;

        assert_eq!(memory.len(), 1);
        let episodes = memory.search_episodes(1, "上次那个东西", 5).await.unwrap();
        assert_eq!(episodes[0].summary, "routing_decision:memo_search");
        assert_eq!(service.dropped_history_saves(), 0);
    }

    #[tokio::test]
    async fn test_switch_feedback_updates_rules() {
        let storage = Arc::new(InMemoryWeightStorage::new());
        let service = Service::builder(RouterConfig::default())
            .with_weight_storage(storage.clone())
            .build()
            .unwrap();

        service.classify(Some(1), "搜索笔记").await.unwrap();
        assert_eq!(service.cache_stats().unwrap().size, 1);

        let adjustments = service
            .record_feedback(&RouterFeedback {
                user_id: 1,
                input: "搜索笔记".into(),
                predicted: Intent::ScheduleQuery,
                actual: Intent::MemoSearch,
                feedback_type: FeedbackType::Switch,
                timestamp: 0,
                source: ClassificationSource::Rule,
            })
            .await
            .unwrap();

        assert!(!adjustments.is_empty());
        assert_eq!(service.rules().keyword_weight(1, Category::Memo, "搜索"), 4);
        assert_eq!(storage.get_weights(1).await.unwrap()[&Category::Memo]["笔记"], 4);
        assert_eq!(service.cache_stats().unwrap().size, 0);

        let stats = service.get_router_stats(1, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(stats.total_predictions, 1);
        assert_eq!(stats.incorrect_count, 1);
    }

    #[tokio::test]
    async fn test_feedback_without_storage_is_noop() {
        let service = Service::builder(RouterConfig::default()).build().unwrap();
        let adjustments = service
            .record_feedback(&RouterFeedback {
                user_id: 1,
                input: "搜索笔记".into(),
                predicted: Intent::MemoSearch,
                actual: Intent::MemoSearch,
                feedback_type: FeedbackType::Positive,
                timestamp: 0,
                source: ClassificationSource::Rule,
            })
            .await
            .unwrap();
        assert!(adjustments.is_empty());

        let stats = service.get_router_stats(1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(stats.total_predictions, 0);
        assert_ok!(service.load_user_weights(1).await);
    }

    #[tokio::test]
    async fn test_load_user_weights_personalizes_rules() {
        let storage = Arc::new(InMemoryWeightStorage::new());
        let mut weights = WeightTable::new();
        weights.insert(
            Category::Memo,
            HashMap::from([("笔记".to_string(), 5), ("搜索".to_string(), 5)]),
        );
        weights.insert(Category::Schedule, HashMap::from([("会议".to_string(), 1)]));
        storage.save_weights(1, &weights).await.unwrap();

        let service = Service::builder(RouterConfig::default())
            .with_weight_storage(storage)
            .build()
            .unwrap();
        service.load_user_weights(1).await.unwrap();

        let result = service.classify(Some(1), "会议笔记").await.unwrap();
        assert_eq!(result.intent, Intent::MemoSearch);
        assert_eq!(result.source, Some(ClassificationSource::Rule));

        // Default weights tie, so an anonymous caller gets no match.
        service.clear_cache();
        let result = service.classify(None, "会议笔记").await.unwrap();
        assert!(!result.is_matched());
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let config = RouterConfig::default().with_cache(CacheSettings {
            enabled: false,
            ..Default::default()
        });
        let llm = CountingLlm::replying("general");
        let service = Service::builder(config).with_llm(llm.clone()).build().unwrap();

        assert!(service.cache_stats().is_none());
        service.classify(None, "今晚吃什么好").await.unwrap();
        service.classify(None, "今晚吃什么好").await.unwrap();
        assert_eq!(llm.calls(), 2);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = RouterConfig::default();
        config.llm.max_tokens = 0;
        assert!(Service::builder(config).build().is_err());
    }
}
