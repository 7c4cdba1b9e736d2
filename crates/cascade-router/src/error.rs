//! Router error types.

use thiserror::Error;

/// Router result type alias
pub type RouterResult<T> = Result<T, RouterError>;

/// Router errors
#[derive(Debug, Error)]
pub enum RouterError {
    /// Error from a matching layer or collaborator
    #[error(transparent)]
    Core(#[from] cascade_core::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Configuration file could not be parsed
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider setup error
    #[error("provider error: {message}")]
    Provider { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouterError {
    /// Create a provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Check if this error is a timeout raised by a matching layer
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Core(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RouterError::provider("missing api key");
        assert!(err.to_string().contains("missing api key"));
        assert!(!err.is_timeout());

        let err: RouterError = cascade_core::Error::timeout(3000).into();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("3000"));
    }
}
