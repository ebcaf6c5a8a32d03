//! Ledger Store Errors

use uuid::Uuid;

/// Errors that can occur in a ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row targeted by the batch does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Unique constraint violated (e.g. external id already registered)
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Idempotency key already recorded
    #[error("Idempotency key already used: {0}")]
    DuplicateOperation(Uuid),

    /// Serialization failure or deadlock; the batch was rolled back
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Maximum retries exceeded
    #[error("Maximum retries exceeded for batch {0}")]
    MaxRetriesExceeded(&'static str),

    /// Stored data that cannot be mapped back to a domain value
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Backend unusable (poisoned lock)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if this error is retryable by the store itself
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Map a sqlx error, classifying Postgres serialization and unique failures.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => {
                    return StoreError::Conflict(db_err.message().to_string())
                }
                // unique_violation
                Some("23505") => return StoreError::UniqueViolation(db_err.message().to_string()),
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}
