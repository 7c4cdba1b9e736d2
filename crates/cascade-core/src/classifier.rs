//! LLM fallback classifier.
//!
//! Sends the input to an [`LlmClient`] under a deadline and parses the reply.
//! Replies are expected as `{"intent": "...", "confidence": 0.9}` but plain
//! labels are accepted too. Unrecognized labels route to [`Intent::General`].

use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::traits::LlmClient;
use crate::types::{clamp_confidence, Intent, ModelConfig};
use crate::util::truncate;

/// Confidence used when the model omits one or reports a non-positive value.
///
/// Not calibrated against any data; kept as a documented default.
pub const DEFAULT_LLM_CONFIDENCE: f32 = 0.8;

const PROMPT_TEMPLATE: &str = "你是一个意图分类器。请判断用户输入属于以下哪一种意图:\n\
memo_search, memo_create, schedule_query, schedule_create, schedule_update, batch_schedule, general\n\
只返回 JSON, 格式为 {\"intent\": \"<意图>\", \"confidence\": <0到1之间的小数>}\n\n";

/// Settings for [`LlmClassifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct LlmClassifierConfig {
    /// Deadline for a single completion (default: 3s).
    pub timeout: Duration,
    /// Token budget for the reply (default: 50).
    pub max_tokens: u32,
    /// See [`DEFAULT_LLM_CONFIDENCE`].
    pub default_confidence: f32,
    pub provider: String,
    /// Empty means the client's default model.
    pub model: String,
}

impl Default for LlmClassifierConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            max_tokens: 50,
            default_confidence: DEFAULT_LLM_CONFIDENCE,
            provider: "local".to_string(),
            model: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LlmReply {
    intent: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Build the classification prompt for `input`.
pub fn build_prompt(input: &str) -> String {
    format!("{}用户输入: {}", PROMPT_TEMPLATE, input)
}

/// Map a model label to an intent. Unknown labels become `General`.
pub fn parse_intent_label(label: &str) -> Intent {
    let normalized: String = label
        .trim()
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`'))
        .collect::<String>()
        .trim()
        .to_lowercase();

    match normalized.as_str() {
        "memo_search" | "memosearch" | "search" => Intent::MemoSearch,
        "memo_create" | "memocreate" | "create_memo" => Intent::MemoCreate,
        "schedule_query" | "schedulequery" | "query" => Intent::ScheduleQuery,
        "schedule_create" | "schedulecreate" | "create_schedule" => Intent::ScheduleCreate,
        "schedule_update" | "scheduleupdate" | "update" => Intent::ScheduleUpdate,
        "batch_schedule" | "batchschedule" | "batch" => Intent::BatchSchedule,
        _ => Intent::General,
    }
}

/// Parse a raw model reply into an intent and confidence.
pub fn parse_response(raw: &str, default_confidence: f32) -> (Intent, f32) {
    let trimmed = raw.trim();
    let body = strip_code_fence(trimmed);

    match serde_json::from_str::<LlmReply>(body) {
        Ok(reply) => {
            let confidence = match reply.confidence {
                Some(c) if c > 0.0 => c,
                _ => default_confidence,
            };
            (parse_intent_label(&reply.intent), clamp_confidence(confidence))
        }
        Err(_) => (parse_intent_label(trimmed), clamp_confidence(default_confidence)),
    }
}

/// Remove a surrounding markdown code fence, if present.
fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Last-resort classifier backed by an LLM.
pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
    config: LlmClassifierConfig,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn LlmClient>, config: LlmClassifierConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &LlmClassifierConfig {
        &self.config
    }

    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            provider: self.config.provider.clone(),
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
        }
    }

    /// Classify `input`. Client errors and deadline expiry are returned.
    pub async fn classify(&self, input: &str) -> Result<(Intent, f32)> {
        let prompt = build_prompt(input);
        let model = self.model_config();
        let start = Instant::now();

        let response = tokio::time::timeout(self.config.timeout, self.client.complete(&prompt, &model))
            .await
            .map_err(|_| {
                warn!(
                    input = %truncate(input, 50),
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "LLM classification timed out"
                );
                Error::timeout(self.config.timeout.as_millis() as u64)
            })??;

        let (intent, confidence) = parse_response(&response, self.config.default_confidence);
        debug!(
            input = %truncate(input, 50),
            intent = %intent,
            confidence,
            latency_ms = start.elapsed().as_millis() as u64,
            "LLM classification"
        );
        Ok((intent, confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedClient {
        reply: std::result::Result<String, String>,
        delay: Duration,
        last_config: Mutex<Option<ModelConfig>>,
    }

    impl CannedClient {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                last_config: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, prompt: &str, config: &ModelConfig) -> Result<String> {
            assert!(prompt.ends_with("用户输入: 随便问问"));
            *self.last_config.lock().unwrap() = Some(config.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(Error::llm)
        }
    }

    #[test]
    fn test_parse_json_response() {
        let (intent, confidence) =
            parse_response(r#"{"intent": "schedule_query", "confidence": 0.92}"#, 0.8);
        assert_eq!(intent, Intent::ScheduleQuery);
        assert!((confidence - 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_parse_json_missing_or_zero_confidence() {
        assert_eq!(parse_response(r#"{"intent": "memo_search"}"#, 0.8), (Intent::MemoSearch, 0.8));
        assert_eq!(
            parse_response(r#"{"intent": "batch", "confidence": 0}"#, 0.8),
            (Intent::BatchSchedule, 0.8)
        );
        assert_eq!(
            parse_response(r#"{"intent": "general", "confidence": 7.5}"#, 0.8),
            (Intent::General, 1.0)
        );
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"intent\": \"memo_create\", \"confidence\": 0.6}\n```";
        let (intent, confidence) = parse_response(raw, 0.8);
        assert_eq!(intent, Intent::MemoCreate);
        assert!((confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(parse_response("  `Schedule_Update`\n", 0.8), (Intent::ScheduleUpdate, 0.8));
        assert_eq!(parse_response("\"query\"", 0.8).0, Intent::ScheduleQuery);
        assert_eq!(parse_response("I am not sure", 0.8).0, Intent::General);
        assert_eq!(parse_response("", 0.8).0, Intent::General);
    }

    #[test]
    fn test_unknown_label_never_maps_to_unknown() {
        assert_eq!(parse_intent_label("unknown"), Intent::General);
        assert_eq!(parse_intent_label("amazing"), Intent::General);
    }

    #[tokio::test]
    async fn test_classify_uses_deterministic_model_config() {
        let client = Arc::new(CannedClient::ok(r#"{"intent":"memo_search","confidence":0.7}"#));
        let classifier = LlmClassifier::new(client.clone(), LlmClassifierConfig::default());

        let (intent, confidence) = classifier.classify("随便问问").await.unwrap();
        assert_eq!(intent, Intent::MemoSearch);
        assert!((confidence - 0.7).abs() < 1e-6);

        let config = client.last_config.lock().unwrap().clone().unwrap();
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_tokens, 50);
    }

    #[tokio::test]
    async fn test_classify_propagates_client_error() {
        let client = Arc::new(CannedClient {
            reply: Err("503".to_string()),
            delay: Duration::ZERO,
            last_config: Mutex::new(None),
        });
        let classifier = LlmClassifier::new(client, LlmClassifierConfig::default());
        let err = classifier.classify("随便问问").await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[tokio::test]
    async fn test_classify_times_out() {
        let client = Arc::new(CannedClient {
            reply: Ok("general".to_string()),
            delay: Duration::from_millis(200),
            last_config: Mutex::new(None),
        });
        let classifier = LlmClassifier::new(
            client,
            LlmClassifierConfig {
                timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let err = classifier.classify("随便问问").await.unwrap_err();
        assert!(err.is_timeout());
    }
}
