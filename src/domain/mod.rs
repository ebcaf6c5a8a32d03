//! Domain module
//!
//! Core ledger types and pure business rules.

pub mod amount;
pub mod context;
pub mod currency;
pub mod error;
pub mod models;
pub mod split;

pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use currency::{CurrencyCode, CurrencyError, CurrencySet};
pub use error::DomainError;
pub use models::{
    BalanceEntry, BalanceRow, Expense, ExpenseDetail, ExpenseRecord, ParticipantShare,
    Settlement, ShareDetail, User,
};
pub use split::{split_evenly, Share};
