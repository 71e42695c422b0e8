//! Store-layer error types and conversions.

use gatekeep_core::error::GatekeepError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Operation `{operation}` timed out")]
    Timeout { operation: &'static str },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<StoreError> for GatekeepError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => GatekeepError::NotFound { entity, id },
            StoreError::Redis(e) => GatekeepError::Store(e.to_string()),
            StoreError::Timeout { operation } => GatekeepError::StoreTimeout {
                operation: operation.to_string(),
            },
            other => GatekeepError::Database(other.to_string()),
        }
    }
}
