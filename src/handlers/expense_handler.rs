//! Expense Handler
//!
//! Creates and removes expenses. An expense, its participant shares and the
//! balance changes they cause are written as one batch, and removal writes the
//! exact negation of what the stored rows imply.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    split_evenly, Amount, CurrencySet, DomainError, Expense, ExpenseDetail, ExpenseRecord,
    OperationContext, ParticipantShare, ShareDetail, User,
};
use crate::error::AppError;
use crate::store::{LedgerStore, LedgerWrite, StoreError, WriteBatch};

use super::{
    load_user, CreateExpenseCommand, RemoveExpenseCommand, RemoveExpenseResult,
    SplitExpenseCommand,
};

/// Handler for the expense lifecycle
pub struct ExpenseHandler {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencySet>,
}

impl ExpenseHandler {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: Arc<CurrencySet>) -> Self {
        Self { store, currencies }
    }

    // =========================================================================
    // CreateExpense
    // =========================================================================

    pub async fn create(
        &self,
        command: CreateExpenseCommand,
        context: &OperationContext,
    ) -> Result<ExpenseDetail, AppError> {
        // Input validation first: nothing is read or written for bad input.
        let amount = Amount::new(command.amount).map_err(DomainError::from)?;
        let currency = self
            .currencies
            .resolve(&command.currency)
            .map_err(DomainError::from)?;
        let description = command.description.trim();
        if description.is_empty() {
            return Err(DomainError::EmptyDescription.into());
        }
        if command.participants.is_empty() {
            return Err(DomainError::NoParticipants.into());
        }
        let mut seen = HashSet::new();
        if let Some(dup) = command.participants.iter().find(|id| !seen.insert(**id)) {
            return Err(DomainError::DuplicateParticipant(dup.to_string()).into());
        }

        let creator = load_user(self.store.as_ref(), command.creator).await?;

        let mut participants = Vec::with_capacity(command.participants.len());
        for external_id in &command.participants {
            let user = load_user(self.store.as_ref(), *external_id).await?;
            if user.group_id != creator.group_id {
                return Err(DomainError::UserNotFound(external_id.to_string()).into());
            }
            participants.push(user);
        }

        let participant_ids: Vec<Uuid> = participants.iter().map(|u| u.id).collect();
        let shares = split_evenly(amount, &participant_ids, &creator.id)?;

        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4(),
            amount: amount.value(),
            currency,
            description: description.to_string(),
            created_by: creator.id,
            created_at: now,
        };
        let record = ExpenseRecord {
            shares: shares
                .into_iter()
                .map(|s| ParticipantShare {
                    expense_id: expense.id,
                    user_id: s.participant,
                    share: s.amount,
                    created_at: now,
                })
                .collect(),
            expense,
        };

        let mut batch =
            WriteBatch::new("create_expense").with_idempotency_key(context.idempotency_key);
        batch.push(LedgerWrite::InsertExpense(record.expense.clone()));
        for share in &record.shares {
            batch.push(LedgerWrite::InsertShare(share.clone()));
        }
        for (user_id, delta) in record.balance_deltas() {
            batch.apply_delta(user_id, &record.expense.currency, delta);
        }

        self.store.commit(batch).await?;

        tracing::info!(
            expense_id = %record.expense.id,
            group_id = creator.group_id,
            amount = %record.expense.amount,
            currency = %record.expense.currency,
            participants = record.shares.len(),
            "Expense created"
        );

        let mut names: HashMap<Uuid, String> = participants
            .into_iter()
            .map(|u| (u.id, u.display_name))
            .collect();
        names.insert(creator.id, creator.display_name);

        Ok(detail_of(&record, &names))
    }

    /// Split `amount` evenly between the creator and the listed users.
    pub async fn split(
        &self,
        command: SplitExpenseCommand,
        context: &OperationContext,
    ) -> Result<ExpenseDetail, AppError> {
        let amount = Amount::new(command.amount).map_err(DomainError::from)?;
        let currency = self
            .currencies
            .resolve(&command.currency)
            .map_err(DomainError::from)?;

        let mut participants = vec![command.creator];
        participants.extend(
            command
                .participants
                .iter()
                .copied()
                .filter(|id| *id != command.creator),
        );

        let create = CreateExpenseCommand {
            amount: amount.value(),
            currency: currency.to_string(),
            description: format!("Split expense of {amount} {currency}"),
            creator: command.creator,
            participants,
        };
        self.create(create, context).await
    }

    // =========================================================================
    // RemoveExpense
    // =========================================================================

    /// Delete an expense and reverse its balance effect. Creator only.
    pub async fn remove(
        &self,
        command: RemoveExpenseCommand,
        context: &OperationContext,
    ) -> Result<RemoveExpenseResult, AppError> {
        let requester = load_user(self.store.as_ref(), command.requester).await?;

        let record = self
            .store
            .find_expense(command.expense_id)
            .await?
            .ok_or_else(|| DomainError::ExpenseNotFound(command.expense_id.to_string()))?;

        if record.expense.created_by != requester.id {
            tracing::warn!(
                expense_id = %command.expense_id,
                requester = command.requester,
                "Expense removal rejected: requester is not the creator"
            );
            return Err(DomainError::Unauthorized(
                "only the creator can remove an expense".to_string(),
            )
            .into());
        }

        let mut batch =
            WriteBatch::new("remove_expense").with_idempotency_key(context.idempotency_key);
        batch.push(LedgerWrite::DeleteExpense {
            expense_id: record.expense.id,
        });
        for (user_id, delta) in record.balance_deltas() {
            batch.apply_delta(user_id, &record.expense.currency, -delta);
        }

        self.store.commit(batch).await.map_err(|e| match e {
            // Removed concurrently; the reversal must not be applied twice.
            StoreError::NotFound(_) => {
                AppError::Domain(DomainError::ExpenseNotFound(command.expense_id.to_string()))
            }
            other => AppError::from(other),
        })?;

        tracing::info!(
            expense_id = %record.expense.id,
            group_id = requester.group_id,
            currency = %record.expense.currency,
            "Expense removed"
        );

        Ok(RemoveExpenseResult {
            expense_id: record.expense.id,
        })
    }
}

/// Annotate an expense record with display names.
pub(crate) fn detail_of(record: &ExpenseRecord, names: &HashMap<Uuid, String>) -> ExpenseDetail {
    let name_of = |id: &Uuid| names.get(id).cloned().unwrap_or_else(|| id.to_string());

    ExpenseDetail {
        id: record.expense.id,
        amount: record.expense.amount,
        currency: record.expense.currency.clone(),
        description: record.expense.description.clone(),
        created_by: record.expense.created_by,
        creator_name: name_of(&record.expense.created_by),
        created_at: record.expense.created_at,
        participants: record
            .shares
            .iter()
            .map(|s| ShareDetail {
                user_id: s.user_id,
                user_name: name_of(&s.user_id),
                share: s.share,
            })
            .collect(),
    }
}

/// Display names keyed by internal id.
pub(crate) fn name_index(users: &[User]) -> HashMap<Uuid, String> {
    users
        .iter()
        .map(|u| (u.id, u.display_name.clone()))
        .collect()
}
