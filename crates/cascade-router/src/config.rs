//! Router configuration.
//!
//! All sections have defaults, so an empty TOML document is a valid config.

use cascade_core::{
    CacheConfig, HistoryMatcherConfig, LlmClassifierConfig, TaskType, DEFAULT_LLM_CONFIDENCE,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::RouterResult;
use crate::models::select_model;

/// Router configuration options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub cache: CacheSettings,
    pub history: HistorySettings,
    pub llm: LlmSettings,
    pub feedback: FeedbackSettings,
    pub history_queue: HistoryQueueSettings,
}

/// Routing cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Enable the result cache (default: true)
    pub enabled: bool,
    /// Maximum entries (default: 500)
    pub capacity: usize,
    /// TTL for rule/history results in seconds (default: 300 = 5 minutes)
    pub default_ttl_secs: u64,
    /// TTL for LLM results in seconds (default: 1800 = 30 minutes)
    pub llm_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 500,
            default_ttl_secs: 300,
            llm_ttl_secs: 1800,
        }
    }
}

/// History matcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Lexical match threshold (default: 0.8)
    pub similarity_threshold: f32,
    /// Semantic match threshold (default: 0.75)
    pub semantic_threshold: f32,
    /// Lower edge of the band that triggers semantic matching (default: 0.4)
    pub ambiguous_floor: f32,
    /// Episodes fetched per lookup (default: 10)
    pub max_lookup: usize,
    /// Memoized bigram sets (default: 100)
    pub bigram_cache_size: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        let core = HistoryMatcherConfig::default();
        Self {
            similarity_threshold: core.similarity_threshold,
            semantic_threshold: core.semantic_threshold,
            ambiguous_floor: core.ambiguous_floor,
            max_lookup: core.max_lookup,
            bigram_cache_size: core.bigram_cache_size,
        }
    }
}

/// LLM fallback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Completion deadline in milliseconds (default: 3000)
    pub timeout_ms: u64,
    /// Reply token budget (default: 50)
    pub max_tokens: u32,
    /// Confidence when the model reports none (default: 0.8)
    pub default_confidence: f32,
    /// Model override; empty uses the provider's model
    pub model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            max_tokens: 50,
            default_confidence: DEFAULT_LLM_CONFIDENCE,
            model: String::new(),
        }
    }
}

/// Feedback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    /// Apply weight adjustments from feedback (default: true)
    pub enabled: bool,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Background history-save queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryQueueSettings {
    /// Pending saves before new ones are dropped (default: 64)
    pub capacity: usize,
    /// Deadline per save in seconds (default: 5)
    pub save_timeout_secs: u64,
}

impl Default for HistoryQueueSettings {
    fn default() -> Self {
        Self {
            capacity: 64,
            save_timeout_secs: 5,
        }
    }
}

impl RouterConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> RouterResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> RouterResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Set cache configuration
    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    /// Set history configuration
    pub fn with_history(mut self, history: HistorySettings) -> Self {
        self.history = history;
        self
    }

    /// Set LLM configuration
    pub fn with_llm(mut self, llm: LlmSettings) -> Self {
        self.llm = llm;
        self
    }

    /// Enable or disable feedback-driven weight adjustment
    pub fn with_feedback(mut self, enabled: bool) -> Self {
        self.feedback.enabled = enabled;
        self
    }

    /// Set history queue configuration
    pub fn with_history_queue(mut self, history_queue: HistoryQueueSettings) -> Self {
        self.history_queue = history_queue;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.cache.enabled {
            positive("cache.capacity", self.cache.capacity as u64)?;
            positive("cache.default_ttl_secs", self.cache.default_ttl_secs)?;
            positive("cache.llm_ttl_secs", self.cache.llm_ttl_secs)?;
        }

        unit_interval("history.similarity_threshold", self.history.similarity_threshold)?;
        unit_interval("history.semantic_threshold", self.history.semantic_threshold)?;
        unit_interval("history.ambiguous_floor", self.history.ambiguous_floor)?;
        if self.history.ambiguous_floor > self.history.similarity_threshold {
            return Err(ConfigValidationError::InvalidValue {
                field: "history.ambiguous_floor".into(),
                message: "must not exceed history.similarity_threshold".into(),
            });
        }
        positive("history.max_lookup", self.history.max_lookup as u64)?;

        positive("llm.timeout_ms", self.llm.timeout_ms)?;
        positive("llm.max_tokens", self.llm.max_tokens as u64)?;
        if self.llm.default_confidence <= 0.0 || self.llm.default_confidence > 1.0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "llm.default_confidence".into(),
                message: "must be in (0, 1]".into(),
            });
        }

        positive("history_queue.capacity", self.history_queue.capacity as u64)?;
        positive("history_queue.save_timeout_secs", self.history_queue.save_timeout_secs)?;

        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache.capacity,
            default_ttl: Duration::from_secs(self.cache.default_ttl_secs),
            llm_result_ttl: Duration::from_secs(self.cache.llm_ttl_secs),
        }
    }

    pub fn history_config(&self) -> HistoryMatcherConfig {
        HistoryMatcherConfig {
            similarity_threshold: self.history.similarity_threshold,
            semantic_threshold: self.history.semantic_threshold,
            ambiguous_floor: self.history.ambiguous_floor,
            max_lookup: self.history.max_lookup,
            bigram_cache_size: self.history.bigram_cache_size,
        }
    }

    /// Classifier settings. The provider tier comes from the intent
    /// classification model table; the model name stays empty unless
    /// configured so the client's own default applies.
    pub fn llm_config(&self) -> LlmClassifierConfig {
        let tier = select_model(TaskType::IntentClassification);
        LlmClassifierConfig {
            timeout: Duration::from_millis(self.llm.timeout_ms),
            max_tokens: self.llm.max_tokens,
            default_confidence: self.llm.default_confidence,
            provider: tier.provider,
            model: self.llm.model.clone(),
        }
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.history_queue.save_timeout_secs)
    }
}

fn positive(field: &str, value: u64) -> Result<(), ConfigValidationError> {
    if value == 0 {
        return Err(ConfigValidationError::InvalidValue {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
    Ok(())
}

fn unit_interval(field: &str, value: f32) -> Result<(), ConfigValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigValidationError::InvalidValue {
            field: field.into(),
            message: "must be between 0 and 1".into(),
        });
    }
    Ok(())
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.capacity, 500);
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(config.cache.llm_ttl_secs, 1800);
        assert_eq!(config.history.similarity_threshold, 0.8);
        assert_eq!(config.history.semantic_threshold, 0.75);
        assert_eq!(config.history.max_lookup, 10);
        assert_eq!(config.llm.timeout_ms, 3000);
        assert_eq!(config.llm.default_confidence, 0.8);
        assert!(config.feedback.enabled);
        assert_eq!(config.history_queue.save_timeout_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RouterConfig::default()
            .with_feedback(false)
            .with_cache(CacheSettings {
                enabled: false,
                ..Default::default()
            });
        assert!(!config.feedback.enabled);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache_config().llm_result_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn test_config_validation() {
        let mut config = RouterConfig::default();
        config.history.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.history.ambiguous_floor = 0.9;
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());
        config.cache.enabled = false;
        assert!(config.validate().is_ok());

        let mut config = RouterConfig::default();
        config.llm.default_confidence = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = RouterConfig::from_toml_str(
            r#"
            [cache]
            capacity = 50

            [llm]
            timeout_ms = 1500
            model = "qwen2.5-0.5b"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(config.llm_config().timeout, Duration::from_millis(1500));
        assert_eq!(config.llm.model, "qwen2.5-0.5b");
        assert_eq!(config.llm_config().provider, "local");
        assert_eq!(config.llm_config().model, "qwen2.5-0.5b");
        assert!(RouterConfig::default().llm_config().model.is_empty());

        assert_eq!(RouterConfig::from_toml_str("").unwrap(), RouterConfig::default());
        assert!(RouterConfig::from_toml_str("[cache]\ncapacity = \"lots\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, "[feedback]\nenabled = false\n").unwrap();
        let config = RouterConfig::load(&path).unwrap();
        assert!(!config.feedback.enabled);
    }
}
