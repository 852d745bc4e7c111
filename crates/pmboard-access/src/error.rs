//! Service-layer error taxonomy.
//!
//! Every variant except `State` and `PasswordHash` carries a caller-facing
//! message. Those two are surfaced as a generic internal error.

use pmboard_state::StateError;
use thiserror::Error;

/// Result type alias for service operations.
pub type AccessResult<T> = Result<T, AccessError>;

#[derive(Debug, Error)]
pub enum AccessError {
    /// Missing or malformed required field.
    #[error("{0}")]
    Validation(String),

    /// A unique key (parameter key, user email) is already taken.
    #[error("{0}")]
    DuplicateKey(String),

    #[error("{0}")]
    NotFound(String),

    /// The caller's role lacks the capability.
    #[error("{0}")]
    Forbidden(String),

    /// Missing, invalid, or expired session; bad credentials.
    #[error("{0}")]
    Unauthorized(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

impl AccessError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AccessError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AccessError::NotFound(msg.into())
    }

    pub fn forbidden() -> Self {
        AccessError::Forbidden("Forbidden".to_string())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AccessError::Unauthorized(msg.into())
    }

    /// True for failures the caller did not cause.
    pub fn is_internal(&self) -> bool {
        matches!(self, AccessError::State(_) | AccessError::PasswordHash(_))
    }
}
