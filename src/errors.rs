//! Typed error hierarchy for conductor.
//!
//! Three enums cover the caller-visible failures:
//! - `ValidationError`: a submission rejected locally, before any request
//! - `BackendError`: the orchestration backend refused or could not be reached
//! - `SubmitError`: what `WorkflowController::submit` returns, wrapping either
//!
//! Stale and malformed progress messages are not errors at this level: they are
//! logged and dropped by the reconciler and the status source.

use thiserror::Error;

/// Local input problems. Never reach the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Repository URL is required")]
    MissingUrl,

    #[error("Please provide a valid GitHub repository URL (got '{url}')")]
    UnrecognizedHost { url: String },

    #[error("Prompt is required for prompt-driven mode")]
    MissingPrompt,

    #[error("Invalid context search: {0}")]
    InvalidQuery(String),
}

/// Failures talking to the orchestration backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Backend unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("Malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Transport-level failures worth retrying on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

/// Result of a failed `submit`. No workflow is created in either case.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to start workflow: {0}")]
    Submission(#[from] BackendError),
}
