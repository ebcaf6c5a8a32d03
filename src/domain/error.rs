//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::amount::AmountError;
use super::currency::CurrencyError;

/// Business rule violations and lookup failures raised by the ledger.
///
/// Every variant leaves the ledger untouched: validation happens before the
/// write batch is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid amount (zero, negative, sub-cent or above the limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Description must not be empty")]
    EmptyDescription,

    #[error("An expense needs at least one participant")]
    NoParticipants,

    #[error("Participant listed more than once: {0}")]
    DuplicateParticipant(String),

    /// Settlement where payer and receiver resolve to the same user
    #[error("Cannot settle with yourself")]
    SameUserSettlement,

    /// A mention that matches more than one member of the group
    #[error("Mention matches more than one user: {0}")]
    AmbiguousUser(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Expense not found: {0}")]
    ExpenseNotFound(String),

    #[error("User already registered: {0}")]
    UserAlreadyExists(String),

    /// Requester is known but not allowed to perform the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Duplicate operation (idempotency)
    #[error("Duplicate operation: {key}")]
    DuplicateOperation { key: String },
}

impl DomainError {
    /// Check if this is a client input error (caller fixes input)
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::InvalidCurrency(_)
                | Self::EmptyDescription
                | Self::NoParticipants
                | Self::DuplicateParticipant(_)
                | Self::SameUserSettlement
                | Self::AmbiguousUser(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UserNotFound(_) | Self::ExpenseNotFound(_))
    }

    /// Check if this is a conflict error (retry with a fresh key may help)
    pub fn is_conflict_error(&self) -> bool {
        matches!(self, Self::DuplicateOperation { .. })
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}

impl From<CurrencyError> for DomainError {
    fn from(err: CurrencyError) -> Self {
        Self::InvalidCurrency(err.0)
    }
}
