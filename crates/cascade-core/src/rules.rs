//! Keyword rule matcher.
//!
//! Scores each [`Category`] by summing the weights of its keywords found in
//! the input. Weights come from a per-user override table when present and
//! fall back to [`DEFAULT_WEIGHT`]. The strictly highest category wins and is
//! refined into a concrete [`Intent`] by verb keywords.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::lexical::PUNCTUATION;
use crate::types::{
    clamp_weight, Category, Intent, UserId, WeightAdjustment, WeightTable, DEFAULT_WEIGHT,
};
use crate::util::truncate;

const SCHEDULE_KEYWORDS: &[&str] = &[
    "日程", "会议", "提醒", "安排", "开会", "明天", "后天", "今天", "下周", "本周", "schedule",
    "meeting", "calendar",
];
const MEMO_KEYWORDS: &[&str] = &["笔记", "备忘", "记录", "搜索", "查找", "memo", "note"];
const GENERAL_KEYWORDS: &[&str] = &["帮我", "解释", "总结", "翻译", "什么是"];

const UPDATE_VERBS: &[&str] = &["修改", "更新", "取消", "删除"];
const BATCH_VERBS: &[&str] = &["批量", "多个", "每天", "每周"];
const QUERY_VERBS: &[&str] = &["查看", "有什么", "哪些", "看看", "有没有"];
const SEARCH_VERBS: &[&str] = &["搜索", "查找", "找", "查"];
const CREATE_VERBS: &[&str] = &["记录", "记一下", "保存", "写"];

/// Score at which confidence saturates.
const SCORE_NORMALIZER: i32 = 5;
/// Confidence reported for saturated scores.
const MAX_RULE_CONFIDENCE: f32 = 0.95;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Lowercase and strip punctuation so keyword checks see contiguous text.
fn normalize(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !PUNCTUATION.contains(c))
        .collect()
}

/// Matched category with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch {
    pub intent: Intent,
    pub category: Category,
    pub score: i32,
    pub confidence: f32,
}

/// Deterministic keyword scorer with per-user weight overrides.
pub struct RuleMatcher {
    custom_weights: RwLock<HashMap<UserId, WeightTable>>,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleMatcher {
    pub fn new() -> Self {
        Self {
            custom_weights: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, WeightTable>> {
        self.custom_weights.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, WeightTable>> {
        self.custom_weights.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fixed keyword list for a category.
    pub fn keywords_for_category(category: Category) -> &'static [&'static str] {
        match category {
            Category::Schedule => SCHEDULE_KEYWORDS,
            Category::Memo => MEMO_KEYWORDS,
            Category::General => GENERAL_KEYWORDS,
        }
    }

    /// Keywords of `category` that occur in `input`.
    pub fn matched_keywords(input: &str, category: Category) -> Vec<&'static str> {
        let normalized = normalize(input);
        Self::keywords_for_category(category)
            .iter()
            .copied()
            .filter(|kw| normalized.contains(kw))
            .collect()
    }

    /// Classify using default weights only.
    pub fn match_input(&self, input: &str) -> Option<RuleMatch> {
        self.score(input, None)
    }

    /// Classify using `user_id`'s overrides where present.
    pub fn match_with_user(&self, input: &str, user_id: UserId) -> Option<RuleMatch> {
        let weights = self.read();
        self.score(input, weights.get(&user_id))
    }

    fn score(&self, input: &str, overrides: Option<&WeightTable>) -> Option<RuleMatch> {
        let normalized = normalize(input);
        if normalized.is_empty() {
            return None;
        }

        let mut scores: Vec<(Category, i32)> = Category::ALL
            .iter()
            .map(|&category| {
                let table = overrides.and_then(|t| t.get(&category));
                let score: i32 = Self::keywords_for_category(category)
                    .iter()
                    .filter(|kw| normalized.contains(*kw))
                    .map(|kw| table.and_then(|t| t.get(*kw)).copied().unwrap_or(DEFAULT_WEIGHT))
                    .sum();
                (category, score)
            })
            .collect();
        scores.sort_by(|a, b| b.1.cmp(&a.1));

        let (category, score) = scores[0];
        if score <= 0 || scores[1].1 == score {
            debug!(input = %truncate(input, 50), ?scores, "rule matcher: no strict winner");
            return None;
        }

        let intent = Self::refine(category, &normalized);
        let confidence = if score >= SCORE_NORMALIZER {
            MAX_RULE_CONFIDENCE
        } else {
            score as f32 / SCORE_NORMALIZER as f32
        };
        debug!(
            input = %truncate(input, 50),
            intent = %intent,
            score,
            confidence,
            "rule matcher hit"
        );

        Some(RuleMatch {
            intent,
            category,
            score,
            confidence,
        })
    }

    /// Pick the concrete intent for a winning category.
    fn refine(category: Category, normalized: &str) -> Intent {
        match category {
            Category::Schedule => {
                if contains_any(normalized, UPDATE_VERBS) {
                    Intent::ScheduleUpdate
                } else if contains_any(normalized, BATCH_VERBS) {
                    Intent::BatchSchedule
                } else if contains_any(normalized, QUERY_VERBS) {
                    Intent::ScheduleQuery
                } else {
                    Intent::ScheduleCreate
                }
            }
            Category::Memo => {
                if contains_any(normalized, SEARCH_VERBS) {
                    Intent::MemoSearch
                } else if contains_any(normalized, CREATE_VERBS) {
                    Intent::MemoCreate
                } else {
                    Intent::MemoSearch
                }
            }
            Category::General => Intent::General,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Per-user weights
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace a user's override table. Weights are clamped to `[1, 5]`.
    pub fn set_custom_weights(&self, user_id: UserId, weights: WeightTable) {
        let clamped = weights
            .into_iter()
            .map(|(category, keywords)| {
                let keywords = keywords
                    .into_iter()
                    .map(|(kw, w)| (kw, clamp_weight(w)))
                    .collect();
                (category, keywords)
            })
            .collect();
        self.write().insert(user_id, clamped);
    }

    /// Copy of a user's override table, if any.
    pub fn custom_weights(&self, user_id: UserId) -> Option<WeightTable> {
        self.read().get(&user_id).cloned()
    }

    /// Apply persisted adjustments on top of the user's current table.
    pub fn merge_adjustments(&self, user_id: UserId, adjustments: &[WeightAdjustment]) {
        if adjustments.is_empty() {
            return;
        }
        let mut weights = self.write();
        let table = weights.entry(user_id).or_default();
        for adj in adjustments {
            table
                .entry(adj.category)
                .or_default()
                .insert(adj.keyword.clone(), clamp_weight(adj.new_weight));
        }
    }

    /// Effective weight of `keyword`: the user's override, else the default.
    pub fn keyword_weight(&self, user_id: UserId, category: Category, keyword: &str) -> i32 {
        self.read()
            .get(&user_id)
            .and_then(|t| t.get(&category))
            .and_then(|t| t.get(keyword))
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(Category, &str, i32)]) -> WeightTable {
        let mut t = WeightTable::new();
        for (category, kw, w) in entries {
            t.entry(*category).or_default().insert(kw.to_string(), *w);
        }
        t
    }

    #[test]
    fn test_schedule_query_default_weights() {
        let matcher = RuleMatcher::new();
        let m = matcher.match_input("明天有什么会议").unwrap();
        assert_eq!(m.intent, Intent::ScheduleQuery);
        assert_eq!(m.category, Category::Schedule);
        assert_eq!(m.score, 4);
        assert!(m.confidence > 0.0 && m.confidence <= 1.0);
    }

    #[test]
    fn test_sub_classification() {
        let matcher = RuleMatcher::new();
        let cases = [
            ("取消明天的会议", Intent::ScheduleUpdate),
            ("每周一开会", Intent::BatchSchedule),
            ("明天下午三点开会", Intent::ScheduleCreate),
            ("搜索笔记", Intent::MemoSearch),
            ("保存这条笔记", Intent::MemoCreate),
            ("帮我翻译这段话", Intent::General),
        ];
        for (input, expected) in cases {
            assert_eq!(matcher.match_input(input).unwrap().intent, expected, "{}", input);
        }
    }

    #[test]
    fn test_no_match() {
        let matcher = RuleMatcher::new();
        assert!(matcher.match_input("").is_none());
        assert!(matcher.match_input("随便聊聊").is_none());
        // One schedule keyword vs one memo keyword: tie.
        assert!(matcher.match_input("会议笔记").is_none());
    }

    #[test]
    fn test_custom_weights_override_defaults() {
        let matcher = RuleMatcher::new();
        matcher.set_custom_weights(
            1,
            table(&[
                (Category::Memo, "笔记", 5),
                (Category::Memo, "搜索", 5),
                (Category::Schedule, "会议", 1),
            ]),
        );
        let m = matcher.match_with_user("会议笔记", 1).unwrap();
        assert_eq!(m.intent, Intent::MemoSearch);

        // Other users keep the defaults.
        assert!(matcher.match_with_user("会议笔记", 2).is_none());
    }

    #[test]
    fn test_unknown_user_uses_defaults() {
        let matcher = RuleMatcher::new();
        let m = matcher.match_with_user("明天有什么会议", 999).unwrap();
        assert_eq!(m.intent, Intent::ScheduleQuery);
    }

    #[test]
    fn test_custom_weights_are_clamped() {
        let matcher = RuleMatcher::new();
        matcher.set_custom_weights(1, table(&[(Category::Memo, "笔记", 42)]));
        assert_eq!(matcher.keyword_weight(1, Category::Memo, "笔记"), 5);
        assert_eq!(matcher.keyword_weight(1, Category::Memo, "搜索"), DEFAULT_WEIGHT);
        assert!(matcher.custom_weights(2).is_none());
    }

    #[test]
    fn test_merge_adjustments() {
        let matcher = RuleMatcher::new();
        matcher.merge_adjustments(
            3,
            &[WeightAdjustment {
                keyword: "会议".into(),
                category: Category::Schedule,
                old_weight: 2,
                new_weight: 3,
                adjustment: 1,
                reason: "positive".into(),
            }],
        );
        assert_eq!(matcher.keyword_weight(3, Category::Schedule, "会议"), 3);
    }

    #[test]
    fn test_general_keywords() {
        assert!(RuleMatcher::keywords_for_category(Category::General).contains(&"帮我"));
        assert_eq!(
            RuleMatcher::matched_keywords("搜索会议笔记", Category::Memo),
            vec!["笔记", "搜索"]
        );
    }

    #[test]
    fn test_confidence_saturates() {
        let matcher = RuleMatcher::new();
        // 明天 + 会议 + 安排 = 6 >= normalizer.
        let m = matcher.match_input("明天的会议安排").unwrap();
        assert_eq!(m.confidence, MAX_RULE_CONFIDENCE);
    }
}
