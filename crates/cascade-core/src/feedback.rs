//! Feedback-driven keyword weight adjustment.
//!
//! Each [`RouterFeedback`] is appended to the weight store's log, then turned
//! into bounded weight nudges for the keywords present in the input:
//!
//! | feedback | predicted category | actual category |
//! |----------|--------------------|-----------------|
//! | positive | +1                 |                 |
//! | switch   | -2                 | +2              |
//! | rephrase | (none)             | (none)          |
//!
//! Adjustments are computed against a snapshot of the user's stored weights
//! and persisted in one batch. Every resulting weight stays within `[1, 5]`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::rules::RuleMatcher;
use crate::traits::RouterWeightStorage;
use crate::util::window_start;
use crate::types::{
    clamp_weight, Category, FeedbackType, RouterFeedback, RouterStats, UserId, WeightAdjustment,
    WeightTable, DEFAULT_WEIGHT,
};
use crate::util::truncate;

const POSITIVE_STEP: i32 = 1;
const SWITCH_STEP: i32 = 2;

/// Turns feedback events into persisted weight adjustments.
pub struct FeedbackCollector {
    storage: Arc<dyn RouterWeightStorage>,
}

impl FeedbackCollector {
    pub fn new(storage: Arc<dyn RouterWeightStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn RouterWeightStorage> {
        &self.storage
    }

    /// Record `feedback` and apply the resulting weight changes.
    ///
    /// Returns the adjustments that were persisted. Storage failures are
    /// logged and yield no adjustments rather than an error.
    pub async fn record_feedback(&self, feedback: &RouterFeedback) -> Result<Vec<WeightAdjustment>> {
        let mut feedback = feedback.clone();
        if feedback.timestamp == 0 {
            feedback.timestamp = Utc::now().timestamp();
        }

        debug!(
            user_id = feedback.user_id,
            input = %truncate(&feedback.input, 50),
            predicted = %feedback.predicted,
            actual = %feedback.actual,
            feedback = %feedback.feedback_type,
            "recording router feedback"
        );

        if let Err(e) = self.storage.record_feedback(&feedback).await {
            warn!(error = %e, "failed to persist router feedback");
        }

        if feedback.feedback_type == FeedbackType::Rephrase {
            return Ok(Vec::new());
        }

        let current = match self.storage.get_weights(feedback.user_id).await {
            Ok(weights) => weights,
            Err(e) => {
                warn!(error = %e, "failed to load weights for adjustment");
                return Ok(Vec::new());
            }
        };

        let adjustments = compute_adjustments(&feedback, &current);
        if adjustments.is_empty() {
            return Ok(adjustments);
        }

        let mut batch = WeightTable::new();
        for adj in &adjustments {
            batch
                .entry(adj.category)
                .or_default()
                .insert(adj.keyword.clone(), adj.new_weight);
        }
        if let Err(e) = self.storage.save_weights(feedback.user_id, &batch).await {
            warn!(error = %e, "failed to save adjusted weights");
            return Ok(Vec::new());
        }

        debug!(
            user_id = feedback.user_id,
            count = adjustments.len(),
            "applied weight adjustments"
        );
        Ok(adjustments)
    }

    /// Accuracy statistics for `user_id` over the last `window`.
    pub async fn stats(&self, user_id: UserId, window: Duration) -> Result<RouterStats> {
        self.storage.get_stats(user_id, window).await
    }
}

/// Weight changes implied by one feedback event, given the current weights.
pub fn compute_adjustments(feedback: &RouterFeedback, current: &WeightTable) -> Vec<WeightAdjustment> {
    let mut adjustments = Vec::new();
    match feedback.feedback_type {
        FeedbackType::Rephrase => {}
        FeedbackType::Positive => {
            if let Some(category) = feedback.predicted.category() {
                push_adjustments(
                    &mut adjustments,
                    &feedback.input,
                    category,
                    POSITIVE_STEP,
                    "positive feedback",
                    current,
                );
            }
        }
        FeedbackType::Switch => {
            let predicted = feedback.predicted.category();
            let actual = feedback.actual.category();
            if predicted == actual {
                return adjustments;
            }
            if let Some(category) = predicted {
                push_adjustments(
                    &mut adjustments,
                    &feedback.input,
                    category,
                    -SWITCH_STEP,
                    "switched away from predicted intent",
                    current,
                );
            }
            if let Some(category) = actual {
                push_adjustments(
                    &mut adjustments,
                    &feedback.input,
                    category,
                    SWITCH_STEP,
                    "switched to actual intent",
                    current,
                );
            }
        }
    }
    adjustments
}

fn push_adjustments(
    out: &mut Vec<WeightAdjustment>,
    input: &str,
    category: Category,
    delta: i32,
    reason: &str,
    current: &WeightTable,
) {
    for keyword in RuleMatcher::matched_keywords(input, category) {
        let old_weight = clamp_weight(
            current
                .get(&category)
                .and_then(|t| t.get(keyword))
                .copied()
                .unwrap_or(DEFAULT_WEIGHT),
        );
        let new_weight = clamp_weight(old_weight + delta);
        if new_weight == old_weight {
            continue;
        }
        out.push(WeightAdjustment {
            keyword: keyword.to_string(),
            category,
            old_weight,
            new_weight,
            adjustment: new_weight - old_weight,
            reason: reason.to_string(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory storage
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct WeightState {
    weights: HashMap<UserId, WeightTable>,
    feedback: HashMap<UserId, Vec<RouterFeedback>>,
}

/// Process-local [`RouterWeightStorage`] for tests and storage-less setups.
#[derive(Default)]
pub struct InMemoryWeightStorage {
    state: RwLock<WeightState>,
}

impl InMemoryWeightStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RouterWeightStorage for InMemoryWeightStorage {
    async fn get_weights(&self, user_id: UserId) -> Result<WeightTable> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.weights.get(&user_id).cloned().unwrap_or_default())
    }

    async fn save_weights(&self, user_id: UserId, weights: &WeightTable) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let table = state.weights.entry(user_id).or_default();
        for (category, keywords) in weights {
            let entry = table.entry(*category).or_default();
            for (keyword, weight) in keywords {
                entry.insert(keyword.clone(), clamp_weight(*weight));
            }
        }
        Ok(())
    }

    async fn record_feedback(&self, feedback: &RouterFeedback) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .feedback
            .entry(feedback.user_id)
            .or_default()
            .push(feedback.clone());
        Ok(())
    }

    async fn get_stats(&self, user_id: UserId, window: Duration) -> Result<RouterStats> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let cutoff = window_start(Utc::now().timestamp(), window);

        let mut stats = RouterStats::empty();
        if let Some(events) = state.feedback.get(&user_id) {
            events
                .iter()
                .filter(|fb| fb.timestamp >= cutoff)
                .for_each(|fb| stats.record(fb));
        }
        Ok(stats)
    }
}
