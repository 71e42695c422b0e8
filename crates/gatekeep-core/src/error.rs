//! Error types shared across the gatekeep workspace.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatekeepError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("TTL store error: {0}")]
    Store(String),

    #[error("TTL store operation timed out: {operation}")]
    StoreTimeout { operation: String },

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Code delivery failed: {0}")]
    Delivery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatekeepError {
    /// True when the error came from the shared TTL store (including
    /// timeouts), as opposed to the credential store or a crypto failure.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_) | Self::StoreTimeout { .. })
    }
}

pub type GatekeepResult<T> = Result<T, GatekeepError>;
