//! Database-specific error types and conversions.

use sclms_core::error::SclmsError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Stale write: {entity} with id {id}")]
    Conflict { entity: String, id: String },
}

impl From<DbError> for SclmsError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SclmsError::NotFound { entity, id },
            DbError::Conflict { entity, id } => SclmsError::Conflict { entity, id },
            other => SclmsError::Database(other.to_string()),
        }
    }
}
