//! Per-task model selection.
//!
//! Light tasks go to small local models; reasoning-heavy tasks go to a cloud
//! model with a larger token budget.

use cascade_core::{ModelConfig, TaskType};

const LOCAL: &str = "local";
const CLOUD: &str = "cloud";

/// Model configuration for a task type.
pub fn select_model(task: TaskType) -> ModelConfig {
    let (provider, model, max_tokens, temperature) = match task {
        TaskType::IntentClassification => (LOCAL, "qwen2.5-0.5b", 256, 0.1),
        TaskType::EntityExtraction => (LOCAL, "qwen2.5-1.5b", 512, 0.2),
        TaskType::SimpleQa => (LOCAL, "qwen2.5-3b", 1024, 0.3),
        TaskType::ComplexReasoning => (CLOUD, "deepseek-chat", 4096, 0.5),
        TaskType::Summarization => (CLOUD, "deepseek-chat", 2048, 0.3),
        TaskType::TagSuggestion => (LOCAL, "qwen2.5-1.5b", 256, 0.4),
    };
    ModelConfig {
        provider: provider.to_string(),
        model: model.to_string(),
        max_tokens,
        temperature,
    }
}
