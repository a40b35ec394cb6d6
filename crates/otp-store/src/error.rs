//! Storage errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Phone number already registered: {0}")]
    Conflict(String),

    #[error("Store driver not registered: {0}")]
    UnknownDriver(String),

    #[error("Invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the error is a uniqueness violation on the phone number.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
