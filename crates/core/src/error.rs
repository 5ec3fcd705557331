//! Error types for the Compass domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`ErrorKind`] is the
//! per-turn taxonomy carried through the workflow as data.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::Stage;

/// The top-level error type for Compass operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reported by the completion service.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Service error: {message} (status: {status_code})")]
    Service { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response from provider")]
    EmptyResponse,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Map a provider failure onto the per-turn taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Timeout(_) => ErrorKind::InvocationTimeout,
            _ => ErrorKind::ServiceUnavailable,
        }
    }
}

/// Failures reported by a persistence backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// A rejected stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot transition from {from} to {to}")]
    Invalid { from: Stage, to: Stage },

    #[error("Conversation is held for human review; automated transitions are disabled")]
    HumanReviewRequired,
}

/// Per-turn error taxonomy.
///
/// None of these are fatal: each maps to a defined degradation and is
/// recorded on the turn for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No classifier rule fired decisively; the safer tier was used.
    ClassificationAmbiguous,
    /// No specialist matched; `general` was used.
    SpecialistUnresolved,
    /// The completion service did not answer within the budget.
    InvocationTimeout,
    /// The completion service failed or returned nothing usable.
    ServiceUnavailable,
    /// The store could not be read or written.
    PersistenceUnavailable,
    /// Crisis override; always handled.
    CrisisDetected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ClassificationAmbiguous => "classification_ambiguous",
            Self::SpecialistUnresolved => "specialist_unresolved",
            Self::InvocationTimeout => "invocation_timeout",
            Self::ServiceUnavailable => "service_unavailable",
            Self::PersistenceUnavailable => "persistence_unavailable",
            Self::CrisisDetected => "crisis_detected",
        };
        f.write_str(s)
    }
}
