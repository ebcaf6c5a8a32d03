//! Command Handlers module
//!
//! Each handler validates a command, resolves the users it names, and turns
//! it into a single atomic [`WriteBatch`](crate::store::WriteBatch).

mod commands;
mod expense_handler;
mod settlement_handler;
mod user_handler;

#[cfg(test)]
mod tests;

pub use commands::*;
pub use expense_handler::ExpenseHandler;
pub(crate) use expense_handler::{detail_of, name_index};
pub use settlement_handler::SettlementHandler;
pub use user_handler::UserHandler;

use crate::domain::{DomainError, User};
use crate::error::AppError;
use crate::store::LedgerStore;

/// Resolve a registered user by platform id.
pub(crate) async fn load_user(store: &dyn LedgerStore, external_id: i64) -> Result<User, AppError> {
    store
        .find_user_by_external_id(external_id)
        .await?
        .ok_or_else(|| DomainError::UserNotFound(external_id.to_string()).into())
}
