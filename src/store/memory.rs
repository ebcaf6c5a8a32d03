//! In-memory ledger store.
//!
//! Intended for tests and local development. A batch is applied to a copy of
//! the state which replaces the live state only if every write succeeded.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use crate::domain::{BalanceRow, CurrencyCode, Expense, ExpenseRecord, ParticipantShare, Settlement, User};

use super::{LedgerStore, LedgerWrite, StoreError, WriteBatch};

#[derive(Debug, Default, Clone)]
struct State {
    users: HashMap<Uuid, User>,
    expenses: HashMap<Uuid, Expense>,
    /// Shares per expense, in insertion order
    shares: HashMap<Uuid, Vec<ParticipantShare>>,
    settlements: Vec<Settlement>,
    balances: HashMap<(Uuid, CurrencyCode), Decimal>,
    idempotency_keys: HashSet<Uuid>,
}

impl State {
    fn group_member_ids(&self, group_id: i64) -> HashSet<Uuid> {
        self.users
            .values()
            .filter(|u| u.group_id == group_id)
            .map(|u| u.id)
            .collect()
    }

    fn record(&self, expense: &Expense) -> ExpenseRecord {
        ExpenseRecord {
            expense: expense.clone(),
            shares: self.shares.get(&expense.id).cloned().unwrap_or_default(),
        }
    }

    fn records_newest_first<F>(&self, filter: F) -> Vec<ExpenseRecord>
    where
        F: Fn(&Expense) -> bool,
    {
        let mut records: Vec<ExpenseRecord> = self
            .expenses
            .values()
            .filter(|e| filter(e))
            .map(|e| self.record(e))
            .collect();
        records.sort_by(|a, b| b.expense.created_at.cmp(&a.expense.created_at));
        records
    }

    fn apply(&mut self, write: &LedgerWrite) -> Result<(), StoreError> {
        match write {
            LedgerWrite::InsertUser(user) => {
                if self.users.values().any(|u| u.external_id == user.external_id) {
                    return Err(StoreError::UniqueViolation(format!(
                        "external_id {}",
                        user.external_id
                    )));
                }
                self.users.insert(user.id, user.clone());
            }
            LedgerWrite::SetCurrency { user_id, currency } => {
                let user = self
                    .users
                    .get_mut(user_id)
                    .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
                user.currency = Some(currency.clone());
                user.updated_at = chrono::Utc::now();
            }
            LedgerWrite::InsertExpense(expense) => {
                if !self.users.contains_key(&expense.created_by) {
                    return Err(StoreError::NotFound(format!("user {}", expense.created_by)));
                }
                if self.expenses.contains_key(&expense.id) {
                    return Err(StoreError::UniqueViolation(format!("expense {}", expense.id)));
                }
                self.expenses.insert(expense.id, expense.clone());
            }
            LedgerWrite::InsertShare(share) => {
                if !self.expenses.contains_key(&share.expense_id) {
                    return Err(StoreError::NotFound(format!("expense {}", share.expense_id)));
                }
                if !self.users.contains_key(&share.user_id) {
                    return Err(StoreError::NotFound(format!("user {}", share.user_id)));
                }
                let shares = self.shares.entry(share.expense_id).or_default();
                if shares.iter().any(|s| s.user_id == share.user_id) {
                    return Err(StoreError::UniqueViolation(format!(
                        "share ({}, {})",
                        share.expense_id, share.user_id
                    )));
                }
                shares.push(share.clone());
            }
            LedgerWrite::DeleteExpense { expense_id } => {
                self.expenses
                    .remove(expense_id)
                    .ok_or_else(|| StoreError::NotFound(format!("expense {expense_id}")))?;
                self.shares.remove(expense_id);
            }
            LedgerWrite::InsertSettlement(settlement) => {
                for id in [settlement.payer_id, settlement.receiver_id] {
                    if !self.users.contains_key(&id) {
                        return Err(StoreError::NotFound(format!("user {id}")));
                    }
                }
                self.settlements.push(settlement.clone());
            }
            LedgerWrite::ResetGroup { group_id } => {
                let members = self.group_member_ids(*group_id);
                let removed: Vec<Uuid> = self
                    .expenses
                    .values()
                    .filter(|e| members.contains(&e.created_by))
                    .map(|e| e.id)
                    .collect();
                for id in removed {
                    self.expenses.remove(&id);
                    self.shares.remove(&id);
                }
                self.settlements.retain(|s| {
                    !members.contains(&s.payer_id) && !members.contains(&s.receiver_id)
                });
                self.balances.retain(|(user_id, _), _| !members.contains(user_id));
            }
            LedgerWrite::ApplyBalanceDelta { .. } => {}
        }
        Ok(())
    }
}

/// Ledger store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: RwLock<State>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(&state))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_user_by_external_id(&self, external_id: i64) -> Result<Option<User>, StoreError> {
        self.read(|s| {
            s.users
                .values()
                .find(|u| u.external_id == external_id)
                .cloned()
        })
    }

    async fn list_group_users(&self, group_id: i64) -> Result<Vec<User>, StoreError> {
        self.read(|s| {
            let mut users: Vec<User> = s
                .users
                .values()
                .filter(|u| u.group_id == group_id)
                .cloned()
                .collect();
            users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            users
        })
    }

    async fn find_expense(&self, expense_id: Uuid) -> Result<Option<ExpenseRecord>, StoreError> {
        self.read(|s| s.expenses.get(&expense_id).map(|e| s.record(e)))
    }

    async fn list_expenses_by_creator(&self, user_id: Uuid) -> Result<Vec<ExpenseRecord>, StoreError> {
        self.read(|s| s.records_newest_first(|e| e.created_by == user_id))
    }

    async fn list_group_expenses(&self, group_id: i64) -> Result<Vec<ExpenseRecord>, StoreError> {
        self.read(|s| {
            let members = s.group_member_ids(group_id);
            s.records_newest_first(|e| members.contains(&e.created_by))
        })
    }

    async fn list_group_settlements(&self, group_id: i64) -> Result<Vec<Settlement>, StoreError> {
        self.read(|s| {
            let members = s.group_member_ids(group_id);
            s.settlements
                .iter()
                .filter(|st| members.contains(&st.payer_id) || members.contains(&st.receiver_id))
                .cloned()
                .collect()
        })
    }

    async fn list_group_balances(&self, group_id: i64) -> Result<Vec<BalanceRow>, StoreError> {
        self.read(|s| {
            let members = s.group_member_ids(group_id);
            s.balances
                .iter()
                .filter(|((user_id, _), _)| members.contains(user_id))
                .map(|((user_id, currency), balance)| BalanceRow {
                    user_id: *user_id,
                    currency: currency.clone(),
                    balance: *balance,
                })
                .collect()
        })
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut live = self
            .state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        let mut next = live.clone();

        if let Some(key) = batch.idempotency_key {
            if !next.idempotency_keys.insert(key) {
                return Err(StoreError::DuplicateOperation(key));
            }
        }

        for write in batch.row_writes() {
            next.apply(write)?;
        }

        for ((user_id, currency), delta) in batch.netted_deltas() {
            if !next.users.contains_key(&user_id) {
                return Err(StoreError::NotFound(format!("user {user_id}")));
            }
            *next.balances.entry((user_id, currency)).or_default() += delta;
        }

        *live = next;
        Ok(())
    }
}
