//! Error types for the ctxpack domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context (tokenizer, template, cache) has its own error enum.

use thiserror::Error;

/// The top-level error type for all ctxpack operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Tokenizer errors ---
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    // --- Template errors ---
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status class the CRUD layer should surface for this error.
    ///
    /// An unresolvable model identifier is the caller's fault (400); everything
    /// else is a server-side failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Tokenizer(TokenizerError::Unavailable { .. }) => 400,
            Self::Tokenizer(_) | Self::Template(_) => 500,
            Self::Cache(_) => 503,
            Self::Config { .. } | Self::Serialization(_) | Self::Internal(_) => 500,
        }
    }

    /// Whether the error should be reported as a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum TokenizerError {
    #[error("Tokenizer unavailable for '{model}': {reason}")]
    Unavailable { model: String, reason: String },

    #[error("Tokenizer has no chat template")]
    NoChatTemplate,

    #[error("Chat template rejected input: {0}")]
    TemplateRejected(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    /// Both the as-is render and the repaired render failed.
    #[error("Failed to render chat template: {cause}")]
    RenderFailed {
        cause: String,
        /// Template source of the tokenizer, for diagnostics.
        template: Option<String>,
    },
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt cache entry at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_is_a_client_error() {
        let err = Error::Tokenizer(TokenizerError::Unavailable {
            model: "nope/does-not-exist".into(),
            reason: "404 from hub".into(),
        });
        assert_eq!(err.status_code(), 400);
        assert!(err.is_client_error());
        assert!(err.to_string().contains("nope/does-not-exist"));
    }

    #[test]
    fn template_failure_is_a_server_error() {
        let err = Error::Template(TemplateError::RenderFailed {
            cause: "roles must alternate".into(),
            template: Some("{% for m in messages %}".into()),
        });
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("roles must alternate"));
    }

    #[test]
    fn cache_failure_maps_to_unavailable() {
        let err: Error = CacheError::Unavailable("connection refused".into()).into();
        assert_eq!(err.status_code(), 503);
    }
}
