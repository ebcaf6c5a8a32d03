//! Postgres-backed ledger store.
//!
//! Each [`WriteBatch`] runs in one database transaction. Balances are changed
//! with signed `INSERT .. ON CONFLICT DO UPDATE` increments, so the row lock
//! taken by the upsert serialises concurrent batches on the same
//! (user, currency) without a read-modify-write in application code.
//! Users are row-locked first (`FOR UPDATE` for a group reset, `FOR SHARE`
//! otherwise) so a reset cannot interleave with writes to the same group.
//! Serialization failures and deadlocks roll back the whole batch and are
//! retried with linear backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    BalanceRow, CurrencyCode, Expense, ExpenseRecord, ParticipantShare, Settlement, User,
};

use super::{LedgerStore, LedgerWrite, StoreError, WriteBatch};

type UserRow = (Uuid, i64, i64, String, Option<String>, DateTime<Utc>, DateTime<Utc>);
type ExpenseRow = (Uuid, Decimal, String, String, Uuid, DateTime<Utc>);
type ShareRow = (Uuid, Uuid, Decimal, DateTime<Utc>);
type SettlementRow = (Uuid, Uuid, Uuid, Decimal, String, DateTime<Utc>);

const USER_COLUMNS: &str =
    "id, external_id, group_id, display_name, currency_code, created_at, updated_at";

/// Ledger store over a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    max_retries: u32,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_retries: 3,
        }
    }

    /// Number of attempts for a batch that hits a serialization conflict
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // Batch application
    // =========================================================================

    async fn try_commit(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        if let Some(key) = batch.idempotency_key {
            let inserted = sqlx::query(
                r#"
                INSERT INTO idempotency_keys (key, operation)
                VALUES ($1, $2)
                ON CONFLICT (key) DO NOTHING
                "#,
            )
            .bind(key)
            .bind(batch.operation)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

            if inserted.rows_affected() == 0 {
                return Err(StoreError::DuplicateOperation(key));
            }
        }

        lock_users(&mut tx, batch).await?;

        for (position, write) in batch.row_writes().enumerate() {
            apply_row_write(&mut tx, write, position as i32).await?;
        }

        for ((user_id, currency), delta) in batch.netted_deltas() {
            sqlx::query(
                r#"
                INSERT INTO user_balances (user_id, currency_code, balance)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, currency_code)
                DO UPDATE SET balance = user_balances.balance + EXCLUDED.balance,
                              updated_at = NOW()
                "#,
            )
            .bind(user_id)
            .bind(currency.as_str())
            .bind(delta)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn load_shares(
        &self,
        expense_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ParticipantShare>>, StoreError> {
        if expense_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<ShareRow> = sqlx::query_as(
            r#"
            SELECT expense_id, user_id, share, created_at
            FROM expense_participants
            WHERE expense_id = ANY($1)
            ORDER BY expense_id, position
            "#,
        )
        .bind(expense_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        let mut shares: HashMap<Uuid, Vec<ParticipantShare>> = HashMap::new();
        for (expense_id, user_id, share, created_at) in rows {
            shares.entry(expense_id).or_default().push(ParticipantShare {
                expense_id,
                user_id,
                share,
                created_at,
            });
        }
        Ok(shares)
    }

    async fn attach_shares(&self, rows: Vec<ExpenseRow>) -> Result<Vec<ExpenseRecord>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.0).collect();
        let mut shares = self.load_shares(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let expense = expense_from_row(row)?;
                let shares = shares.remove(&expense.id).unwrap_or_default();
                Ok(ExpenseRecord { expense, shares })
            })
            .collect()
    }
}

/// Take row locks on the users a batch depends on before writing anything.
///
/// A reset holds `FOR UPDATE` on every member of its group for the whole
/// transaction; other batches hold `FOR SHARE` on the users they touch. So a
/// reset and an expense or settlement of the same group never interleave:
/// whichever locks first commits first, and the other sees its result.
async fn lock_users(
    tx: &mut Transaction<'_, Postgres>,
    batch: &WriteBatch,
) -> Result<(), StoreError> {
    for write in batch.row_writes() {
        if let LedgerWrite::ResetGroup { group_id } = write {
            sqlx::query("SELECT id FROM users WHERE group_id = $1 ORDER BY id FOR UPDATE")
                .bind(group_id)
                .execute(&mut **tx)
                .await
                .map_err(StoreError::from_sqlx)?;
        }
    }

    let users = batch.touched_users();
    if !users.is_empty() {
        sqlx::query("SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR SHARE")
            .bind(&users)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;
    }

    Ok(())
}

async fn apply_row_write(
    tx: &mut Transaction<'_, Postgres>,
    write: &LedgerWrite,
    position: i32,
) -> Result<(), StoreError> {
    match write {
        LedgerWrite::InsertUser(user) => {
            sqlx::query(
                r#"
                INSERT INTO users (id, external_id, group_id, display_name, currency_code, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(user.id)
            .bind(user.external_id)
            .bind(user.group_id)
            .bind(&user.display_name)
            .bind(user.currency.as_ref().map(|c| c.as_str().to_string()))
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        }
        LedgerWrite::SetCurrency { user_id, currency } => {
            let result = sqlx::query(
                "UPDATE users SET currency_code = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(user_id)
            .bind(currency.as_str())
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("user {user_id}")));
            }
        }
        LedgerWrite::InsertExpense(expense) => {
            sqlx::query(
                r#"
                INSERT INTO expenses (id, amount, currency_code, description, created_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(expense.id)
            .bind(expense.amount)
            .bind(expense.currency.as_str())
            .bind(&expense.description)
            .bind(expense.created_by)
            .bind(expense.created_at)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        }
        LedgerWrite::InsertShare(share) => {
            sqlx::query(
                r#"
                INSERT INTO expense_participants (expense_id, user_id, share, position, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(share.expense_id)
            .bind(share.user_id)
            .bind(share.share)
            .bind(position)
            .bind(share.created_at)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        }
        LedgerWrite::DeleteExpense { expense_id } => {
            // Shares go with the expense (ON DELETE CASCADE).
            let result = sqlx::query("DELETE FROM expenses WHERE id = $1")
                .bind(expense_id)
                .execute(&mut **tx)
                .await
                .map_err(StoreError::from_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("expense {expense_id}")));
            }
        }
        LedgerWrite::InsertSettlement(settlement) => {
            sqlx::query(
                r#"
                INSERT INTO settlements (id, payer_id, receiver_id, amount, currency_code, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(settlement.id)
            .bind(settlement.payer_id)
            .bind(settlement.receiver_id)
            .bind(settlement.amount)
            .bind(settlement.currency.as_str())
            .bind(settlement.created_at)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        }
        LedgerWrite::ResetGroup { group_id } => {
            sqlx::query(
                r#"
                DELETE FROM expenses
                WHERE created_by IN (SELECT id FROM users WHERE group_id = $1)
                "#,
            )
            .bind(group_id)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;

            sqlx::query(
                r#"
                DELETE FROM settlements
                WHERE payer_id IN (SELECT id FROM users WHERE group_id = $1)
                   OR receiver_id IN (SELECT id FROM users WHERE group_id = $1)
                "#,
            )
            .bind(group_id)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;

            sqlx::query(
                r#"
                DELETE FROM user_balances
                WHERE user_id IN (SELECT id FROM users WHERE group_id = $1)
                "#,
            )
            .bind(group_id)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        }
        LedgerWrite::ApplyBalanceDelta { .. } => {}
    }
    Ok(())
}

fn currency_from_db(raw: &str) -> Result<CurrencyCode, StoreError> {
    CurrencyCode::parse(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    let (id, external_id, group_id, display_name, currency, created_at, updated_at) = row;
    Ok(User {
        id,
        external_id,
        group_id,
        display_name,
        currency: currency.as_deref().map(currency_from_db).transpose()?,
        created_at,
        updated_at,
    })
}

fn expense_from_row(row: ExpenseRow) -> Result<Expense, StoreError> {
    let (id, amount, currency, description, created_by, created_at) = row;
    Ok(Expense {
        id,
        amount,
        currency: currency_from_db(&currency)?,
        description,
        created_by,
        created_at,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_user_by_external_id(&self, external_id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        row.map(user_from_row).transpose()
    }

    async fn list_group_users(&self, group_id: i64) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE group_id = $1 ORDER BY created_at"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        rows.into_iter().map(user_from_row).collect()
    }

    async fn find_expense(&self, expense_id: Uuid) -> Result<Option<ExpenseRecord>, StoreError> {
        let row: Option<ExpenseRow> = sqlx::query_as(
            r#"
            SELECT id, amount, currency_code, description, created_by, created_at
            FROM expenses
            WHERE id = $1
            "#,
        )
        .bind(expense_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        match row {
            Some(row) => Ok(self.attach_shares(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_expenses_by_creator(&self, user_id: Uuid) -> Result<Vec<ExpenseRecord>, StoreError> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(
            r#"
            SELECT id, amount, currency_code, description, created_by, created_at
            FROM expenses
            WHERE created_by = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        self.attach_shares(rows).await
    }

    async fn list_group_expenses(&self, group_id: i64) -> Result<Vec<ExpenseRecord>, StoreError> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(
            r#"
            SELECT e.id, e.amount, e.currency_code, e.description, e.created_by, e.created_at
            FROM expenses e
            JOIN users u ON u.id = e.created_by
            WHERE u.group_id = $1
            ORDER BY e.created_at DESC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        self.attach_shares(rows).await
    }

    async fn list_group_settlements(&self, group_id: i64) -> Result<Vec<Settlement>, StoreError> {
        let rows: Vec<SettlementRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.payer_id, s.receiver_id, s.amount, s.currency_code, s.created_at
            FROM settlements s
            WHERE s.payer_id IN (SELECT id FROM users WHERE group_id = $1)
               OR s.receiver_id IN (SELECT id FROM users WHERE group_id = $1)
            ORDER BY s.created_at
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        rows.into_iter()
            .map(|(id, payer_id, receiver_id, amount, currency, created_at)| {
                Ok(Settlement {
                    id,
                    payer_id,
                    receiver_id,
                    amount,
                    currency: currency_from_db(&currency)?,
                    created_at,
                })
            })
            .collect()
    }

    async fn list_group_balances(&self, group_id: i64) -> Result<Vec<BalanceRow>, StoreError> {
        let rows: Vec<(Uuid, String, Decimal)> = sqlx::query_as(
            r#"
            SELECT b.user_id, b.currency_code, b.balance
            FROM user_balances b
            JOIN users u ON u.id = b.user_id
            WHERE u.group_id = $1
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        rows.into_iter()
            .map(|(user_id, currency, balance)| {
                Ok(BalanceRow {
                    user_id,
                    currency: currency_from_db(&currency)?,
                    balance,
                })
            })
            .collect()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        for attempt in 1..=self.max_retries {
            match self.try_commit(&batch).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    tracing::warn!(
                        operation = batch.operation,
                        error = %e,
                        "Batch conflict, retrying (attempt {}/{})",
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::MaxRetriesExceeded(batch.operation))
    }
}
