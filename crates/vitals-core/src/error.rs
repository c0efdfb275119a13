//! Error types for the storage layer

use thiserror::Error;
use vitals_types::{DateRangeError, ParseRoleError};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// User, record or setting absent, or record owned by someone else
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate username
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Backend unreachable, or no backend currently open
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::ValidationFailed(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<DateRangeError> for StoreError {
    fn from(e: DateRangeError) -> Self {
        StoreError::ValidationFailed(e.to_string())
    }
}

impl From<ParseRoleError> for StoreError {
    fn from(e: ParseRoleError) -> Self {
        StoreError::ValidationFailed(e.to_string())
    }
}
