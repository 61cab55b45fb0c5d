// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Mirrors the orchestrator's error taxonomy one-to-one so the RPC layer
/// can map variants to wire codes without inspecting messages.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("State store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<crate::domain::DomainError> for AppError {
    fn from(err: crate::domain::DomainError) -> Self {
        use crate::domain::DomainError;
        match err {
            DomainError::InvalidStateTransition { .. } => AppError::IllegalState(err.to_string()),
            DomainError::ValidationError(msg) => AppError::Validation(msg),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

// Note: redis::RedisError conversion is handled in infra-redis
// by converting to AppError::StoreUnavailable(String)
impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::StoreUnavailable(err)
    }
}
