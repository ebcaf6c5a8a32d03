//! Ledger facade
//!
//! The single entry point for the messaging gateway. Owns the store handle
//! and the currency allow-list, and routes each operation to its handler.

use std::sync::Arc;

use crate::domain::{BalanceEntry, CurrencySet, ExpenseDetail, OperationContext, User};
use crate::error::AppError;
use crate::handlers::{
    CreateExpenseCommand, ExpenseHandler, LedgerCommand, LedgerOutcome, RegisterMembersCommand,
    RegisterMembersResult, RegisterUserCommand, RemoveExpenseCommand, RemoveExpenseResult,
    ResetGroupResult, SetCurrencyCommand, SettleCommand, SettlementHandler, SettlementResult,
    SplitExpenseCommand, UserHandler,
};
use crate::projection::{LedgerAudit, ProjectionService};
use crate::store::{LedgerStore, LedgerWrite, WriteBatch};

/// Shared-expense ledger over an explicitly supplied store.
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencySet>,
    users: UserHandler,
    expenses: ExpenseHandler,
    settlements: SettlementHandler,
    projection: ProjectionService,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: CurrencySet) -> Self {
        let currencies = Arc::new(currencies);
        Self {
            users: UserHandler::new(store.clone(), currencies.clone()),
            expenses: ExpenseHandler::new(store.clone(), currencies.clone()),
            settlements: SettlementHandler::new(store.clone(), currencies.clone()),
            projection: ProjectionService::new(store.clone()),
            store,
            currencies,
        }
    }

    pub fn currencies(&self) -> &CurrencySet {
        &self.currencies
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn register_user(
        &self,
        command: RegisterUserCommand,
        context: &OperationContext,
    ) -> Result<User, AppError> {
        self.users.register(command, context).await
    }

    pub async fn register_members(
        &self,
        command: RegisterMembersCommand,
        context: &OperationContext,
    ) -> Result<RegisterMembersResult, AppError> {
        self.users.register_members(command, context).await
    }

    pub async fn set_currency(
        &self,
        command: SetCurrencyCommand,
        context: &OperationContext,
    ) -> Result<User, AppError> {
        self.users.set_currency(command, context).await
    }

    pub async fn create_expense(
        &self,
        command: CreateExpenseCommand,
        context: &OperationContext,
    ) -> Result<ExpenseDetail, AppError> {
        self.expenses.create(command, context).await
    }

    pub async fn split_expense(
        &self,
        command: SplitExpenseCommand,
        context: &OperationContext,
    ) -> Result<ExpenseDetail, AppError> {
        self.expenses.split(command, context).await
    }

    pub async fn remove_expense(
        &self,
        command: RemoveExpenseCommand,
        context: &OperationContext,
    ) -> Result<RemoveExpenseResult, AppError> {
        self.expenses.remove(command, context).await
    }

    pub async fn settle(
        &self,
        command: SettleCommand,
        context: &OperationContext,
    ) -> Result<SettlementResult, AppError> {
        self.settlements.settle(command, context).await
    }

    /// Delete every expense and settlement of the group's members and zero
    /// their balances. Irreversible.
    pub async fn reset_group(
        &self,
        group_id: i64,
        context: &OperationContext,
    ) -> Result<ResetGroupResult, AppError> {
        let mut batch =
            WriteBatch::new("reset_group").with_idempotency_key(context.idempotency_key);
        batch.push(LedgerWrite::ResetGroup { group_id });
        self.store.commit(batch).await?;

        tracing::warn!(group_id, "Group ledger reset");
        Ok(ResetGroupResult { group_id })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_balances(&self, group_id: i64) -> Result<Vec<BalanceEntry>, AppError> {
        self.projection.get_balances(group_id).await
    }

    pub async fn get_user_expenses(&self, external_id: i64) -> Result<Vec<ExpenseDetail>, AppError> {
        self.projection.get_user_expenses(external_id).await
    }

    pub async fn group_summary(&self, group_id: i64) -> Result<Vec<ExpenseDetail>, AppError> {
        self.projection.group_summary(group_id).await
    }

    pub async fn audit_group(&self, group_id: i64) -> Result<LedgerAudit, AppError> {
        self.projection.audit_group(group_id).await
    }

    // =========================================================================
    // Typed dispatch
    // =========================================================================

    /// Run any ledger command and wrap its result.
    pub async fn execute(
        &self,
        command: LedgerCommand,
        context: &OperationContext,
    ) -> Result<LedgerOutcome, AppError> {
        let name = command.name();
        tracing::debug!(
            command = name,
            correlation_id = ?context.correlation_id,
            "Executing ledger command"
        );

        let outcome = match command {
            LedgerCommand::RegisterUser(cmd) => {
                LedgerOutcome::UserRegistered(self.register_user(cmd, context).await?)
            }
            LedgerCommand::RegisterMembers(cmd) => {
                LedgerOutcome::MembersRegistered(self.register_members(cmd, context).await?)
            }
            LedgerCommand::SetCurrency(cmd) => {
                LedgerOutcome::CurrencyUpdated(self.set_currency(cmd, context).await?)
            }
            LedgerCommand::CreateExpense(cmd) => {
                LedgerOutcome::ExpenseCreated(self.create_expense(cmd, context).await?)
            }
            LedgerCommand::SplitExpense(cmd) => {
                LedgerOutcome::ExpenseCreated(self.split_expense(cmd, context).await?)
            }
            LedgerCommand::RemoveExpense(cmd) => {
                LedgerOutcome::ExpenseRemoved(self.remove_expense(cmd, context).await?)
            }
            LedgerCommand::Settle(cmd) => LedgerOutcome::Settled(self.settle(cmd, context).await?),
            LedgerCommand::GetBalances { group_id } => {
                LedgerOutcome::Balances(self.get_balances(group_id).await?)
            }
            LedgerCommand::GetUserExpenses { external_id } => {
                LedgerOutcome::Expenses(self.get_user_expenses(external_id).await?)
            }
            LedgerCommand::GetGroupSummary { group_id } => {
                LedgerOutcome::Summary(self.group_summary(group_id).await?)
            }
            LedgerCommand::AuditGroup { group_id } => {
                LedgerOutcome::Audit(self.audit_group(group_id).await?)
            }
            LedgerCommand::ResetGroup { group_id } => {
                LedgerOutcome::GroupReset(self.reset_group(group_id, context).await?)
            }
        };

        Ok(outcome)
    }
}
