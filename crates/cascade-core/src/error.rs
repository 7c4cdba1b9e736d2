//! Error types for cascade-core.

use thiserror::Error;

/// Result type alias using cascade-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for routing operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Collaborator errors
    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Memory store error: {0}")]
    Memory(String),

    #[error("Weight storage error: {0}")]
    Storage(String),

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    // Parsing errors
    #[error("Unknown intent: {0}")]
    UnknownIntent(String),

    #[error("Unknown feedback type: {0}")]
    UnknownFeedbackType(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a memory store error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory(message.into())
    }

    /// Create a weight storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::llm("connection refused");
        assert!(err.to_string().contains("connection refused"));

        let err = Error::timeout(3000);
        assert!(err.is_timeout());
        assert!(err.to_string().contains("3000"));

        let err = Error::storage("disk full");
        assert!(!err.is_timeout());
        assert!(err.to_string().starts_with("Weight storage error"));
    }
}
