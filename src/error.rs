//! Error kinds shared across the agent, store, and tool boundaries.
//!
//! These are organized by *behavior* (per the error-handling design), not by
//! which collaborator raised them: a missing LLM key and a missing vision
//! provider are both `NotConfigured`, regardless of which crate backs them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArthaError {
    /// A required collaborator (LLM, vision, document intelligence, search) is
    /// missing. Never fatal to the process — callers degrade to a fallback or
    /// a `success: false` tool result.
    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("document has {page_count} pages, exceeding the {max_pages}-page limit")]
    PageLimitExceeded { page_count: usize, max_pages: usize },

    /// An upstream collaborator (LLM provider, search, vision, document
    /// intelligence) failed transiently. Callers may retry with a different
    /// provider or fall back to a deterministic response.
    #[error("{collaborator} request failed: {message}")]
    Upstream { collaborator: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ArthaError {
    pub fn not_configured(collaborator: impl Into<String>) -> Self {
        Self::NotConfigured(collaborator.into())
    }

    pub fn upstream(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// True for errors where retrying the same request (or a different
    /// provider) might succeed. Used by the agent loop and provider fallback
    /// chains to decide whether to try the next collaborator.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::NotConfigured(_))
    }
}

/// Uncaught bugs are converted here rather than propagated with a stack
/// trace; the message is kept short and user-safe.
impl From<anyhow::Error> for ArthaError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type ArthaResult<T> = Result<T, ArthaError>;
