//! Shared types for cascade-core.
//!
//! These types flow between the matching layers, the feedback loop and the
//! storage collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Numeric user identifier. Zero or negative means "anonymous".
pub type UserId = i32;

/// Per-user keyword weight overrides: category -> keyword -> weight.
pub type WeightTable = HashMap<Category, HashMap<String, i32>>;

/// Lowest weight a keyword may carry.
pub const MIN_WEIGHT: i32 = 1;
/// Highest weight a keyword may carry.
pub const MAX_WEIGHT: i32 = 5;
/// Weight used for every keyword without a per-user override.
pub const DEFAULT_WEIGHT: i32 = 2;

/// Clamp a keyword weight into `[MIN_WEIGHT, MAX_WEIGHT]`.
pub fn clamp_weight(weight: i32) -> i32 {
    weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// Clamp a confidence score into `[0, 1]`. NaN maps to 0.
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Intent
// ─────────────────────────────────────────────────────────────────────────────

/// The classified target handler for a user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    MemoSearch,
    MemoCreate,
    ScheduleQuery,
    ScheduleCreate,
    ScheduleUpdate,
    BatchSchedule,
    General,
    Unknown,
}

impl Intent {
    /// All intents, in declaration order.
    pub const ALL: [Intent; 8] = [
        Intent::MemoSearch,
        Intent::MemoCreate,
        Intent::ScheduleQuery,
        Intent::ScheduleCreate,
        Intent::ScheduleUpdate,
        Intent::BatchSchedule,
        Intent::General,
        Intent::Unknown,
    ];

    /// Wire name of the intent.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::MemoSearch => "memo_search",
            Intent::MemoCreate => "memo_create",
            Intent::ScheduleQuery => "schedule_query",
            Intent::ScheduleCreate => "schedule_create",
            Intent::ScheduleUpdate => "schedule_update",
            Intent::BatchSchedule => "batch_schedule",
            Intent::General => "general",
            Intent::Unknown => "unknown",
        }
    }

    /// Handler responsible for this intent.
    pub fn agent_type(&self) -> AgentType {
        match self {
            Intent::MemoSearch | Intent::MemoCreate => AgentType::Memo,
            Intent::ScheduleQuery
            | Intent::ScheduleCreate
            | Intent::ScheduleUpdate
            | Intent::BatchSchedule => AgentType::Schedule,
            Intent::General => AgentType::General,
            Intent::Unknown => AgentType::Unknown,
        }
    }

    /// Keyword category used by the rule matcher, if any.
    pub fn category(&self) -> Option<Category> {
        self.agent_type().category()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .iter()
            .find(|intent| intent.as_str() == s)
            .copied()
            .ok_or_else(|| Error::UnknownIntent(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent types and keyword categories
// ─────────────────────────────────────────────────────────────────────────────

/// Handler family recorded on episodic memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Memo,
    Schedule,
    General,
    Unknown,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Memo => "memo",
            AgentType::Schedule => "schedule",
            AgentType::General => "general",
            AgentType::Unknown => "unknown",
        }
    }

    /// Parse from the stored string form. Unrecognized values map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "memo" => AgentType::Memo,
            "schedule" => AgentType::Schedule,
            "general" => AgentType::General,
            _ => AgentType::Unknown,
        }
    }

    /// Intent used when no finer sub-classification is possible.
    pub fn default_intent(&self) -> Intent {
        match self {
            AgentType::Memo => Intent::MemoCreate,
            AgentType::Schedule => Intent::ScheduleCreate,
            AgentType::General => Intent::General,
            AgentType::Unknown => Intent::Unknown,
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            AgentType::Memo => Some(Category::Memo),
            AgentType::Schedule => Some(Category::Schedule),
            AgentType::General => Some(Category::General),
            AgentType::Unknown => None,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword category scored by the rule matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Schedule,
    Memo,
    General,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Schedule, Category::Memo, Category::General];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Schedule => "schedule",
            Category::Memo => "memo",
            Category::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(Category::Schedule),
            "memo" => Some(Category::Memo),
            "general" => Some(Category::General),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Classification results
// ─────────────────────────────────────────────────────────────────────────────

/// Cascade layer that produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Cache,
    Rule,
    History,
    Llm,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::Cache => "cache",
            ClassificationSource::Rule => "rule",
            ClassificationSource::History => "history",
            ClassificationSource::Llm => "llm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cache" => Some(ClassificationSource::Cache),
            "rule" => Some(ClassificationSource::Rule),
            "history" => Some(ClassificationSource::History),
            "llm" => Some(ClassificationSource::Llm),
            _ => None,
        }
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single classification call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    /// `None` when no layer produced a match.
    pub source: Option<ClassificationSource>,
}

impl ClassificationResult {
    pub fn new(intent: Intent, confidence: f32, source: ClassificationSource) -> Self {
        Self {
            intent,
            confidence: clamp_confidence(confidence),
            source: Some(source),
        }
    }

    /// Result for an input no layer could classify.
    pub fn unmatched() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            source: None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.source.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Episodic memory
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome recorded on an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "success" {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// A stored record of a past user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicMemory {
    /// Store-assigned identifier (0 before persistence).
    pub id: i64,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub agent_type: AgentType,
    pub user_input: String,
    pub outcome: Outcome,
    pub summary: String,
    /// Importance score in `[0, 1]`.
    pub importance: f32,
}

impl EpisodicMemory {
    /// Episode recording a routing decision.
    pub fn routing_decision(user_id: UserId, input: &str, intent: Intent, success: bool) -> Self {
        Self {
            id: 0,
            user_id,
            timestamp: Utc::now(),
            agent_type: intent.agent_type(),
            user_input: input.to_string(),
            outcome: if success { Outcome::Success } else { Outcome::Failure },
            summary: format!("routing_decision:{}", intent),
            importance: 0.5,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feedback
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of outcome signal a user produced after a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    /// The user accepted the routing.
    Positive,
    /// The user rephrased the query (weak negative signal).
    Rephrase,
    /// The user switched to a different handler.
    Switch,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Positive => "positive",
            FeedbackType::Rephrase => "rephrase",
            FeedbackType::Switch => "switch",
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(FeedbackType::Positive),
            "rephrase" => Ok(FeedbackType::Rephrase),
            "switch" => Ok(FeedbackType::Switch),
            other => Err(Error::UnknownFeedbackType(other.to_string())),
        }
    }
}

/// A single feedback event for a routing decision. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterFeedback {
    pub user_id: UserId,
    pub input: String,
    /// What the router predicted.
    pub predicted: Intent,
    /// What the user actually wanted.
    pub actual: Intent,
    pub feedback_type: FeedbackType,
    /// Unix seconds. Zero means "now" and is filled in on record.
    pub timestamp: i64,
    pub source: ClassificationSource,
}

/// Persisted per-user weight of one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordWeight {
    pub user_id: UserId,
    pub category: Category,
    pub keyword: String,
    pub weight: i32,
}

/// Weight change derived from one feedback event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightAdjustment {
    pub keyword: String,
    pub category: Category,
    pub old_weight: i32,
    pub new_weight: i32,
    pub adjustment: i32,
    pub reason: String,
}

/// Routing accuracy statistics derived from the feedback log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterStats {
    pub total_predictions: i64,
    pub correct_count: i64,
    pub incorrect_count: i64,
    pub accuracy: f64,
    pub by_intent: HashMap<Intent, i64>,
    pub by_source: HashMap<String, i64>,
    /// Unix seconds.
    pub last_updated: i64,
}

impl RouterStats {
    pub fn empty() -> Self {
        Self {
            total_predictions: 0,
            correct_count: 0,
            incorrect_count: 0,
            accuracy: 0.0,
            by_intent: HashMap::new(),
            by_source: HashMap::new(),
            last_updated: Utc::now().timestamp(),
        }
    }

    /// Fold one feedback event into the counters.
    pub fn record(&mut self, feedback: &RouterFeedback) {
        self.total_predictions += 1;
        *self.by_intent.entry(feedback.predicted).or_insert(0) += 1;
        *self
            .by_source
            .entry(feedback.source.as_str().to_string())
            .or_insert(0) += 1;

        if feedback.feedback_type == FeedbackType::Positive {
            self.correct_count += 1;
        } else {
            self.incorrect_count += 1;
        }
        self.accuracy = self.correct_count as f64 / self.total_predictions as f64;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model selection
// ─────────────────────────────────────────────────────────────────────────────

/// Model parameters passed to an LLM client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "local" / "cloud" or a provider name.
    pub provider: String,
    /// Model name. Empty means the client's default model.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Kind of task a model is selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    IntentClassification,
    EntityExtraction,
    SimpleQa,
    ComplexReasoning,
    Summarization,
    TagSuggestion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_round_trip_names() {
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
        assert!("amazing".parse::<Intent>().is_err());
    }

    #[test]
    fn test_intent_agent_mapping() {
        assert_eq!(Intent::ScheduleQuery.agent_type(), AgentType::Schedule);
        assert_eq!(Intent::BatchSchedule.category(), Some(Category::Schedule));
        assert_eq!(Intent::MemoCreate.category(), Some(Category::Memo));
        assert_eq!(Intent::General.category(), Some(Category::General));
        assert_eq!(Intent::Unknown.category(), None);
        assert_eq!(AgentType::Schedule.default_intent(), Intent::ScheduleCreate);
        assert_eq!(AgentType::parse("amazing"), AgentType::Unknown);
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_weight(-3), MIN_WEIGHT);
        assert_eq!(clamp_weight(9), MAX_WEIGHT);
        assert_eq!(clamp_weight(3), 3);
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = RouterStats::empty();
        let mut fb = RouterFeedback {
            user_id: 1,
            input: "明天有什么会议".into(),
            predicted: Intent::ScheduleQuery,
            actual: Intent::ScheduleQuery,
            feedback_type: FeedbackType::Positive,
            timestamp: 0,
            source: ClassificationSource::Rule,
        };
        stats.record(&fb);
        fb.feedback_type = FeedbackType::Switch;
        fb.source = ClassificationSource::Llm;
        stats.record(&fb);

        assert_eq!(stats.total_predictions, 2);
        assert_eq!(stats.correct_count, 1);
        assert_eq!(stats.incorrect_count, 1);
        assert!((stats.accuracy - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.by_intent[&Intent::ScheduleQuery], 2);
        assert_eq!(stats.by_source["llm"], 1);
    }

    #[test]
    fn test_routing_decision_episode() {
        let ep = EpisodicMemory::routing_decision(7, "搜索笔记", Intent::MemoSearch, true);
        assert_eq!(ep.agent_type, AgentType::Memo);
        assert!(ep.is_success());
        assert_eq!(ep.summary, "routing_decision:memo_search");
    }
}
