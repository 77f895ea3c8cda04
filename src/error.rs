//! Domain error kinds shared by every operation.
//!
//! Business-rule violations carry a human readable message that is safe to
//! return to the caller verbatim. Unexpected failures (storage, filesystem)
//! are wrapped as `Internal` and must never leak details to the API response.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing, malformed, badly signed or expired credential.
    #[error("{0}")]
    Unauthenticated(String),
    /// Authenticated, but not the owning identity for the record.
    #[error("{0}")]
    Forbidden(String),
    /// A referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A required field is missing or empty.
    #[error("{0}")]
    Validation(String),
    /// Duplicate subscribe/reaction/member, or delete-when-nonempty.
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
