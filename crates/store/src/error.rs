use thiserror::Error;

use newswire_core::{NewswireError, RecordId};

/// Errors from record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record with url '{0}' already exists")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Invalid(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unavailable(_) => 503,
            Self::Database(_) | Self::Migration(_) => 500,
        }
    }
}

impl From<NewswireError> for StoreError {
    fn from(e: NewswireError) -> Self {
        match e {
            NewswireError::InvalidRecord(reason) => Self::Invalid(reason),
        }
    }
}
