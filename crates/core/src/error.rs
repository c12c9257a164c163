//! Error types for the Synapse domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! carries the request-level taxonomy that the gateway turns into an
//! OpenAI-style error envelope.

use thiserror::Error;

/// The top-level error type for request orchestration.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or semantically invalid request. Never retried.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Mandatory system + latest user content alone exceeds the budget.
    #[error("Context budget exceeded: mandatory content needs {required} tokens, budget is {budget}")]
    ContextBudgetExceeded { required: usize, budget: usize },

    /// Every candidate in the fallback chain failed.
    #[error("All providers exhausted after {} attempt(s){}", .attempts.len(), summarize(.attempts))]
    AllProvidersExhausted { attempts: Vec<AttemptFailure> },

    /// The client went away. Not surfaced as a response body.
    #[error("Client cancelled the request")]
    ClientCancelled,

    /// The service has not finished starting, or is draining.
    #[error("Service not ready: {0}")]
    NotReady(String),

    // --- Bounded context errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// One failed attempt in a fallback chain.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    /// Provider that was attempted.
    pub provider: String,
    /// What went wrong.
    pub error: ProviderError,
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    if attempts.is_empty() {
        return ": no providers configured".into();
    }
    let parts: Vec<String> = attempts
        .iter()
        .map(|a| format!("{}: {}", a.provider, a.error))
        .collect();
    format!(": {}", parts.join("; "))
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Short failure class for logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::ApiError { .. } => "api_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::AuthenticationFailed(_) => "auth_failed",
            Self::ModelNotFound(_) => "model_not_found",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::NotConfigured(_) => "not_configured",
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Memory backend unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation not supported by backend '{0}'")]
    NotSupported(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Document index unavailable: {0}")]
    Unavailable(String),

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Indexing failed: {0}")]
    IndexingFailed(String),

    #[error("Operation not supported by index '{0}'")]
    NotSupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn exhausted_lists_every_attempt() {
        let err = Error::AllProvidersExhausted {
            attempts: vec![
                AttemptFailure {
                    provider: "primary".into(),
                    error: ProviderError::Timeout("60s".into()),
                },
                AttemptFailure {
                    provider: "secondary".into(),
                    error: ProviderError::Network("conn refused".into()),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 attempt(s)"));
        assert!(text.contains("primary"));
        assert!(text.contains("conn refused"));
    }

    #[test]
    fn exhausted_without_attempts() {
        let err = Error::AllProvidersExhausted { attempts: vec![] };
        assert!(err.to_string().contains("no providers configured"));
    }

    #[test]
    fn failure_classes() {
        assert_eq!(ProviderError::Timeout("x".into()).class(), "timeout");
        assert_eq!(
            ProviderError::RateLimited { retry_after_secs: 1 }.class(),
            "rate_limited"
        );
    }
}
