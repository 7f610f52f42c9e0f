//! Error types shared by the store layer and its callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SclmsError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    /// Optimistic concurrency check failed: the record changed since it
    /// was read.
    #[error("Concurrent modification of {entity} {id}")]
    Conflict { entity: String, id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SclmsResult<T> = Result<T, SclmsError>;
