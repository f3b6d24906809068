use serde::Serialize;
use thiserror::Error;

/// A tag filter that cannot be sent to the provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tag key must not be empty")]
    EmptyTagKey,

    #[error("tag value for key '{key}' must not be empty")]
    EmptyTagValue { key: String },

    #[error("tag key is {len} characters, limit is {max}")]
    TagKeyTooLong { len: usize, max: usize },

    #[error("tag value is {len} characters, limit is {max}")]
    TagValueTooLong { len: usize, max: usize },
}

/// Failure of a remote provider call, classified at the adapter boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderError {
    /// Throttling, timeouts, dispatch failures. Safe to retry later.
    #[error("transient provider error during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// Anything the provider will keep rejecting (auth, bad ids, ...).
    #[error("provider error during {operation}: {message}")]
    Permanent { operation: String, message: String },
}

impl ProviderError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Permanent {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }

    pub fn operation(&self) -> &str {
        match self {
            ProviderError::Transient { operation, .. }
            | ProviderError::Permanent { operation, .. } => operation,
        }
    }
}
