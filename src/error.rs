//! Error types for the noesis digest pipeline
//!
//! This module provides structured error handling using thiserror. Failures
//! with a well-defined "empty but valid" representation (empty retrieval,
//! unavailable scoring backend) are absorbed into degraded results elsewhere;
//! only failures with no sensible partial answer surface through this enum.

use thiserror::Error;

/// Main error type for noesis operations
#[derive(Error, Debug)]
pub enum DigestError {
    /// Configuration error (fatal, unrecoverable)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Prompt template file missing (fatal misconfiguration)
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Template placeholder with no supplied value
    #[error("Missing variable '{name}' in template '{template}'")]
    MissingVariable { template: String, name: String },

    /// Provider returned zero completion choices / content blocks
    #[error("Provider {0} returned an empty response")]
    EmptyResponse(String),

    /// A completion choice exists but its content field is absent
    #[error("Provider {0} returned a choice with null content")]
    NullContent(String),

    /// Network or authentication failure against the LLM provider.
    ///
    /// The display is sanitized; the transport error stays attached as the
    /// source for diagnostics.
    #[error("Provider request failed ({provider})")]
    Provider {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// Provider returned a non-success HTTP status
    #[error("Provider request rejected ({provider}, status {status})")]
    ProviderStatus { provider: String, status: u16 },

    /// No structured record could be extracted from the model response
    #[error("Unparseable model response: {0}")]
    UnparseableResponse(String),

    /// Bad input shape (reported immediately, never retried)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for noesis operations
pub type Result<T> = std::result::Result<T, DigestError>;

impl DigestError {
    /// Whether a caller-level retry with backoff could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DigestError::Provider { .. }
                | DigestError::ProviderStatus { .. }
                | DigestError::EmptyResponse(_)
                | DigestError::NullContent(_)
        )
    }

    /// Whether the error indicates misconfiguration that no retry can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DigestError::Config(_)
                | DigestError::TemplateNotFound(_)
                | DigestError::MissingVariable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DigestError::TemplateNotFound("synthesis_system".to_string());
        assert_eq!(err.to_string(), "Template not found: synthesis_system");
    }

    #[test]
    fn test_missing_variable_display() {
        let err = DigestError::MissingVariable {
            template: "synthesis_user".to_string(),
            name: "query".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing variable 'query' in template 'synthesis_user'"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(DigestError::EmptyResponse("openai".into()).is_transient());
        assert!(DigestError::ProviderStatus {
            provider: "anthropic".into(),
            status: 529,
        }
        .is_transient());
        assert!(!DigestError::Validation("empty query".into()).is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DigestError::TemplateNotFound("x".into()).is_fatal());
        assert!(!DigestError::UnparseableResponse("junk".into()).is_fatal());
        assert!(!DigestError::EmptyResponse("openai".into()).is_fatal());
    }

    #[test]
    fn test_empty_and_null_are_distinct() {
        // Upstream diagnostics differ, so the variants must not collapse.
        let empty = DigestError::EmptyResponse("openai".into());
        let null = DigestError::NullContent("openai".into());
        assert_ne!(empty.to_string(), null.to_string());
    }
}
