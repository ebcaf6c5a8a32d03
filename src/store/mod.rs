//! Ledger Store
//!
//! Persistence boundary of the ledger. Every mutation goes through
//! [`LedgerStore::commit`] as a single [`WriteBatch`], which a backend must
//! apply all-or-nothing. Reads always hit the backend; nothing is cached.

mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{
    BalanceRow, CurrencyCode, Expense, ExpenseRecord, ParticipantShare, Settlement, User,
};

pub use error::StoreError;
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// A single row-level change inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    /// Insert a user. Fails with `UniqueViolation` if the external id is taken.
    InsertUser(User),
    /// Change a user's preferred currency. Fails with `NotFound` for unknown ids.
    SetCurrency { user_id: Uuid, currency: CurrencyCode },
    InsertExpense(Expense),
    InsertShare(ParticipantShare),
    /// Delete an expense and its shares. Fails with `NotFound` if it is already
    /// gone, so a reversal can never be applied twice.
    DeleteExpense { expense_id: Uuid },
    InsertSettlement(Settlement),
    /// Signed increment of one (user, currency) balance. Deltas are applied
    /// after every row write of the batch, netted per key.
    ApplyBalanceDelta {
        user_id: Uuid,
        currency: CurrencyCode,
        delta: Decimal,
    },
    /// Remove all expenses, settlements and balances of a group's members.
    ResetGroup { group_id: i64 },
}

/// Unit of atomicity: either every write lands or none does.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub operation: &'static str,
    pub writes: Vec<LedgerWrite>,
    /// Recorded in the same transaction; a replay fails with `DuplicateOperation`
    pub idempotency_key: Option<Uuid>,
}

impl WriteBatch {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            writes: Vec::new(),
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: Option<Uuid>) -> Self {
        self.idempotency_key = key;
        self
    }

    pub fn push(&mut self, write: LedgerWrite) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn apply_delta(&mut self, user_id: Uuid, currency: &CurrencyCode, delta: Decimal) -> &mut Self {
        self.push(LedgerWrite::ApplyBalanceDelta {
            user_id,
            currency: currency.clone(),
            delta,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Balance deltas summed per (user, currency), in key order.
    ///
    /// Zero nets are kept so the row exists: a user with history in a
    /// currency shows up with a zero balance. The stable key order means
    /// concurrent batches lock balance rows in the same sequence.
    pub fn netted_deltas(&self) -> Vec<((Uuid, CurrencyCode), Decimal)> {
        let mut net: BTreeMap<(Uuid, CurrencyCode), Decimal> = BTreeMap::new();
        for write in &self.writes {
            if let LedgerWrite::ApplyBalanceDelta {
                user_id,
                currency,
                delta,
            } = write
            {
                *net.entry((*user_id, currency.clone())).or_default() += *delta;
            }
        }
        net.into_iter().collect()
    }

    /// Internal ids of every existing user a batch writes against, sorted.
    ///
    /// Newly inserted users are not included.
    pub fn touched_users(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .writes
            .iter()
            .flat_map(|write| match write {
                LedgerWrite::InsertExpense(expense) => vec![expense.created_by],
                LedgerWrite::InsertShare(share) => vec![share.user_id],
                LedgerWrite::InsertSettlement(settlement) => {
                    vec![settlement.payer_id, settlement.receiver_id]
                }
                LedgerWrite::ApplyBalanceDelta { user_id, .. }
                | LedgerWrite::SetCurrency { user_id, .. } => vec![*user_id],
                LedgerWrite::InsertUser(_)
                | LedgerWrite::DeleteExpense { .. }
                | LedgerWrite::ResetGroup { .. } => Vec::new(),
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Every write that is not a balance delta, in push order.
    pub fn row_writes(&self) -> impl Iterator<Item = &LedgerWrite> {
        self.writes
            .iter()
            .filter(|w| !matches!(w, LedgerWrite::ApplyBalanceDelta { .. }))
    }
}

/// Storage backend for the ledger.
///
/// Implementations must apply a [`WriteBatch`] atomically and isolate
/// concurrent batches so that no balance increment is lost.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_user_by_external_id(&self, external_id: i64) -> Result<Option<User>, StoreError>;

    async fn list_group_users(&self, group_id: i64) -> Result<Vec<User>, StoreError>;

    async fn find_expense(&self, expense_id: Uuid) -> Result<Option<ExpenseRecord>, StoreError>;

    /// Expenses created by `user_id`, newest first.
    async fn list_expenses_by_creator(&self, user_id: Uuid) -> Result<Vec<ExpenseRecord>, StoreError>;

    /// Expenses created by any member of the group, newest first.
    async fn list_group_expenses(&self, group_id: i64) -> Result<Vec<ExpenseRecord>, StoreError>;

    /// Settlements paid or received by any member of the group.
    async fn list_group_settlements(&self, group_id: i64) -> Result<Vec<Settlement>, StoreError>;

    /// Materialised balances of every member of the group.
    async fn list_group_balances(&self, group_id: i64) -> Result<Vec<BalanceRow>, StoreError>;

    /// Apply a batch atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
