//! cascade-router - Intent routing service
//!
//! Wires the cascade-core layers into a single [`Service`]:
//!
//! - **config**: TOML-loadable router configuration
//! - **service**: the cache → rule → history → LLM cascade, feedback and stats
//! - **history_queue**: bounded background queue for history saves
//! - **providers**: OpenAI-compatible, Ollama and (optional) local embedding clients
//! - **models**: per-task model selection
//!
//! # Example
//!
//! ```rust,no_run
//! use cascade_router::{RouterConfig, Service};
//!
//! async fn example() -> cascade_router::RouterResult<()> {
//!     let service = Service::builder(RouterConfig::default()).build()?;
//!     let result = service.classify(Some(1), "明天有什么会议").await?;
//!     println!("{} ({:.2})", result.intent, result.confidence);
//!     service.shutdown(true).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod history_queue;
pub mod models;
pub mod providers;
pub mod service;

pub use config::{
    CacheSettings, ConfigValidationError, FeedbackSettings, HistoryQueueSettings, HistorySettings,
    LlmSettings, RouterConfig,
};
pub use error::{RouterError, RouterResult};
pub use models::select_model;
pub use providers::{build_embedder, build_llm_client, ProviderConfig};
pub use service::{Service, ServiceBuilder};
