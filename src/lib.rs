//! split_ledger Library
//!
//! Shared-expense ledger: expenses, even splits, settlements and per-currency
//! balances that always agree with their history.

pub mod api;
pub mod domain;
pub mod handlers;
pub mod ledger;
pub mod projection;
pub mod store;

pub mod config;
pub mod db;
pub mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, CurrencyCode, CurrencySet, DomainError, OperationContext};
pub use error::{AppError, AppResult, ErrorKind};
pub use ledger::Ledger;
