//! Projection Service
//!
//! Read side of the ledger: balance listings, expense breakdowns, and the
//! audit that replays history to check the materialised balances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Balance, BalanceEntry, CurrencyCode, ExpenseDetail};
use crate::error::AppError;
use crate::handlers::{detail_of, load_user, name_index};
use crate::store::LedgerStore;

/// A (user, currency) whose stored balance differs from its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceDrift {
    pub user_id: Uuid,
    pub currency: CurrencyCode,
    pub stored: Decimal,
    pub recomputed: Decimal,
}

/// A currency whose member balances do not sum to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroSumViolation {
    pub currency: CurrencyCode,
    pub total: Decimal,
}

/// Result of replaying a group's history against its stored balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub group_id: i64,
    pub balances_checked: usize,
    pub drift: Vec<BalanceDrift>,
    pub zero_sum_violations: Vec<ZeroSumViolation>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.drift.is_empty() && self.zero_sum_violations.is_empty()
    }
}

/// Projection Service for ledger queries
#[derive(Clone)]
pub struct ProjectionService {
    store: Arc<dyn LedgerStore>,
}

impl ProjectionService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Balances of every group member in each currency they have history in.
    ///
    /// Sorted by currency, then largest creditor first, then name.
    pub async fn get_balances(&self, group_id: i64) -> Result<Vec<BalanceEntry>, AppError> {
        let users = self.store.list_group_users(group_id).await?;
        let names = name_index(&users);
        let rows = self.store.list_group_balances(group_id).await?;

        let mut entries: Vec<BalanceEntry> = rows
            .into_iter()
            .map(|row| BalanceEntry {
                user_name: names
                    .get(&row.user_id)
                    .cloned()
                    .unwrap_or_else(|| row.user_id.to_string()),
                user_id: row.user_id,
                currency: row.currency,
                amount: Balance::from_decimal(row.balance).value(),
            })
            .collect();

        entries.sort_by(|a, b| {
            a.currency
                .cmp(&b.currency)
                .then_with(|| b.amount.cmp(&a.amount))
                .then_with(|| a.user_name.cmp(&b.user_name))
        });

        tracing::debug!(group_id, entries = entries.len(), "Balances loaded");
        Ok(entries)
    }

    // =========================================================================
    // Expenses
    // =========================================================================

    /// Expenses created by a user, newest first, with their shares.
    pub async fn get_user_expenses(&self, external_id: i64) -> Result<Vec<ExpenseDetail>, AppError> {
        let user = load_user(self.store.as_ref(), external_id).await?;
        let names = name_index(&self.store.list_group_users(user.group_id).await?);
        let records = self.store.list_expenses_by_creator(user.id).await?;

        Ok(records.iter().map(|r| detail_of(r, &names)).collect())
    }

    /// Every expense created by members of the group, newest first.
    pub async fn group_summary(&self, group_id: i64) -> Result<Vec<ExpenseDetail>, AppError> {
        let names = name_index(&self.store.list_group_users(group_id).await?);
        let records = self.store.list_group_expenses(group_id).await?;

        tracing::debug!(group_id, expenses = records.len(), "Group summary loaded");
        Ok(records.iter().map(|r| detail_of(r, &names)).collect())
    }

    // =========================================================================
    // Audit
    // =========================================================================

    /// Balances derived purely from expense, share and settlement history.
    pub async fn recompute_balances(
        &self,
        group_id: i64,
    ) -> Result<HashMap<(Uuid, CurrencyCode), Decimal>, AppError> {
        let mut balances: HashMap<(Uuid, CurrencyCode), Decimal> = HashMap::new();

        for record in self.store.list_group_expenses(group_id).await? {
            for (user_id, delta) in record.balance_deltas() {
                *balances
                    .entry((user_id, record.expense.currency.clone()))
                    .or_default() += delta;
            }
        }

        for settlement in self.store.list_group_settlements(group_id).await? {
            *balances
                .entry((settlement.payer_id, settlement.currency.clone()))
                .or_default() += settlement.amount;
            *balances
                .entry((settlement.receiver_id, settlement.currency))
                .or_default() -= settlement.amount;
        }

        Ok(balances)
    }

    /// Compare stored balances with recomputed history and check zero-sum.
    pub async fn audit_group(&self, group_id: i64) -> Result<LedgerAudit, AppError> {
        let recomputed = self.recompute_balances(group_id).await?;
        let stored: HashMap<(Uuid, CurrencyCode), Decimal> = self
            .store
            .list_group_balances(group_id)
            .await?
            .into_iter()
            .map(|row| ((row.user_id, row.currency), row.balance))
            .collect();

        // Absent rows read as zero on both sides.
        let mut keys: Vec<&(Uuid, CurrencyCode)> = stored.keys().chain(recomputed.keys()).collect();
        keys.sort();
        keys.dedup();

        let mut drift = Vec::new();
        for key in &keys {
            let stored_value = stored.get(*key).copied().unwrap_or_default();
            let recomputed_value = recomputed.get(*key).copied().unwrap_or_default();
            if stored_value != recomputed_value {
                drift.push(BalanceDrift {
                    user_id: key.0,
                    currency: key.1.clone(),
                    stored: stored_value,
                    recomputed: recomputed_value,
                });
            }
        }

        let mut totals: BTreeMap<CurrencyCode, Decimal> = BTreeMap::new();
        for ((_, currency), balance) in &stored {
            *totals.entry(currency.clone()).or_default() += *balance;
        }
        let zero_sum_violations: Vec<ZeroSumViolation> = totals
            .into_iter()
            .filter(|(_, total)| !total.is_zero())
            .map(|(currency, total)| ZeroSumViolation { currency, total })
            .collect();

        let audit = LedgerAudit {
            group_id,
            balances_checked: keys.len(),
            drift,
            zero_sum_violations,
        };

        if audit.is_consistent() {
            tracing::debug!(group_id, checked = audit.balances_checked, "Ledger audit passed");
        } else {
            tracing::error!(
                group_id,
                drift = audit.drift.len(),
                zero_sum_violations = audit.zero_sum_violations.len(),
                "Ledger audit found inconsistencies"
            );
        }

        Ok(audit)
    }
}
