//! Operation Context
//!
//! Metadata about the current operation, used for tracing and idempotency.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context for a single ledger operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// External id of the user issuing the request (X-Request-User-Id header)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_user: Option<i64>,

    /// Caller-supplied key; a replayed key is rejected instead of applied twice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<Uuid>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_request_user(mut self, external_id: i64) -> Self {
        self.request_user = Some(external_id);
        self
    }

    pub fn with_idempotency_key(mut self, key: Uuid) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}
