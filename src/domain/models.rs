//! Ledger records
//!
//! Rows owned by the ledger store, plus the read models the projection
//! assembles from them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::currency::CurrencyCode;

/// A group member bound 1:1 to an external (chat platform) account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub external_id: i64,
    pub group_id: i64,
    pub display_name: String,
    /// Preferred currency, unset until the user picks one
    pub currency: Option<CurrencyCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(external_id: i64, group_id: i64, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id,
            group_id,
            display_name: display_name.into(),
            currency: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `mention` (with or without a leading `@`) names this user.
    pub fn matches_mention(&self, mention: &str) -> bool {
        let name = mention.trim().trim_start_matches('@');
        !name.is_empty() && self.display_name.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub description: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantShare {
    pub expense_id: Uuid,
    pub user_id: Uuid,
    pub share: Decimal,
    pub created_at: DateTime<Utc>,
}

/// An expense together with all of its participant shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub expense: Expense,
    pub shares: Vec<ParticipantShare>,
}

impl ExpenseRecord {
    /// Signed balance change per user caused by this expense.
    ///
    /// The creator is credited with the amount net of their own share, every
    /// other participant is debited their share. The deltas sum to zero.
    pub fn balance_deltas(&self) -> Vec<(Uuid, Decimal)> {
        let creator = self.expense.created_by;
        let creator_share: Decimal = self
            .shares
            .iter()
            .filter(|s| s.user_id == creator)
            .map(|s| s.share)
            .sum();

        let mut deltas = vec![(creator, self.expense.amount - creator_share)];
        deltas.extend(
            self.shares
                .iter()
                .filter(|s| s.user_id != creator)
                .map(|s| (s.user_id, -s.share)),
        );
        deltas
    }
}

/// A direct repayment between two users. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub payer_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub created_at: DateTime<Utc>,
}

/// Materialised balance of one user in one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub user_id: Uuid,
    pub currency: CurrencyCode,
    pub balance: Decimal,
}

/// Balance line returned by GetBalances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub user_id: Uuid,
    pub user_name: String,
    pub currency: CurrencyCode,
    pub amount: Decimal,
}

/// One participant's share, annotated with their display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareDetail {
    pub user_id: Uuid,
    pub user_name: String,
    pub share: Decimal,
}

/// An expense with its creator and participant breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDetail {
    pub id: Uuid,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub description: String,
    pub created_by: Uuid,
    pub creator_name: String,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<ShareDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(creator: Uuid, amount: Decimal, shares: &[(Uuid, Decimal)]) -> ExpenseRecord {
        let now = Utc::now();
        let expense_id = Uuid::new_v4();
        ExpenseRecord {
            expense: Expense {
                id: expense_id,
                amount,
                currency: CurrencyCode::parse("USD").unwrap(),
                description: "dinner".to_string(),
                created_by: creator,
                created_at: now,
            },
            shares: shares
                .iter()
                .map(|(user_id, share)| ParticipantShare {
                    expense_id,
                    user_id: *user_id,
                    share: *share,
                    created_at: now,
                })
                .collect(),
        }
    }

    #[test]
    fn test_deltas_creator_participates() {
        let (u, v, w) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let rec = record(u, dec!(30), &[(u, dec!(10)), (v, dec!(10)), (w, dec!(10))]);
        let deltas = rec.balance_deltas();
        assert_eq!(deltas, vec![(u, dec!(20)), (v, dec!(-10)), (w, dec!(-10))]);
    }

    #[test]
    fn test_deltas_creator_not_in_split() {
        let (u, v, w) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let rec = record(u, dec!(10), &[(v, dec!(5)), (w, dec!(5))]);
        let total: Decimal = rec.balance_deltas().iter().map(|(_, d)| *d).sum();
        assert_eq!(rec.balance_deltas()[0], (u, dec!(10)));
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn test_matches_mention() {
        let user = User::new(1, 100, "Alice");
        assert!(user.matches_mention("@alice"));
        assert!(user.matches_mention("ALICE"));
        assert!(!user.matches_mention("@"));
        assert!(!user.matches_mention("@bob"));
    }
}
