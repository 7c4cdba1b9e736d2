//! cascade-core - Core library for Cascade
//!
//! Building blocks of the intent-routing cascade:
//!
//! - **lexical**: character-bigram Jaccard similarity
//! - **cache**: LRU cache of routing decisions with per-source TTLs
//! - **rules**: weighted keyword matcher with per-user overrides
//! - **history**: lexical/semantic matching over episodic memory
//! - **classifier**: LLM fallback and reply parsing
//! - **feedback**: feedback-driven keyword weight adjustment
//! - **memory**: in-memory episodic memory store
//! - **db**: SQLite weight, feedback and episode storage (feature `db`)

pub mod cache;
pub mod classifier;
#[cfg(feature = "db")]
pub mod db;
pub mod error;
pub mod feedback;
pub mod history;
pub mod lexical;
pub mod memory;
pub mod rules;
pub mod traits;
pub mod types;
pub mod util;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheHit, CacheStats, RouterCache};
pub use classifier::{LlmClassifier, LlmClassifierConfig, DEFAULT_LLM_CONFIDENCE};
#[cfg(feature = "db")]
pub use db::Database;
pub use error::{Error, Result};
pub use feedback::{FeedbackCollector, InMemoryWeightStorage};
pub use history::{HistoryMatchResult, HistoryMatcher, HistoryMatcherConfig};
pub use lexical::LexicalSimilarity;
pub use memory::InMemoryMemoryService;
pub use rules::{RuleMatch, RuleMatcher};
pub use traits::{EmbeddingService, LlmClient, MemoryService, RouterWeightStorage};
pub use types::*;
