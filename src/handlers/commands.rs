//! Command definitions
//!
//! Commands represent intentions to change (or read) ledger state. The
//! messaging gateway builds these typed values; the core never parses text.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{BalanceEntry, ExpenseDetail, Settlement, User};
use crate::projection::LedgerAudit;

/// How a command names another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRef {
    /// Platform account id
    ExternalId(i64),
    /// `@name`, matched case-insensitively within the caller's group
    Mention(String),
}

// =========================================================================
// Users
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserCommand {
    pub external_id: i64,
    pub group_id: i64,
    pub display_name: String,
}

impl RegisterUserCommand {
    pub fn new(external_id: i64, group_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            external_id,
            group_id,
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    pub external_id: i64,
    pub display_name: String,
}

/// Bulk registration of a group's members; already registered ids are skipped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMembersCommand {
    pub group_id: i64,
    pub members: Vec<MemberInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCurrencyCommand {
    pub external_id: i64,
    pub currency: String,
}

// =========================================================================
// Expenses
// =========================================================================

/// Command to record an expense paid by `creator` and shared by `participants`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExpenseCommand {
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub creator: i64,
    pub participants: Vec<i64>,
}

/// Quick split: the creator plus the listed users share the amount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitExpenseCommand {
    pub amount: Decimal,
    pub currency: String,
    pub creator: i64,
    pub participants: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveExpenseCommand {
    pub expense_id: Uuid,
    pub requester: i64,
}

// =========================================================================
// Settlements
// =========================================================================

/// Command to record that `payer` paid `receiver` directly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleCommand {
    pub payer: i64,
    pub receiver: UserRef,
    pub amount: Decimal,
    pub currency: String,
}

// =========================================================================
// Dispatch
// =========================================================================

/// Every operation the ledger accepts, as one tagged value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum LedgerCommand {
    RegisterUser(RegisterUserCommand),
    RegisterMembers(RegisterMembersCommand),
    SetCurrency(SetCurrencyCommand),
    CreateExpense(CreateExpenseCommand),
    SplitExpense(SplitExpenseCommand),
    RemoveExpense(RemoveExpenseCommand),
    Settle(SettleCommand),
    GetBalances { group_id: i64 },
    GetUserExpenses { external_id: i64 },
    GetGroupSummary { group_id: i64 },
    AuditGroup { group_id: i64 },
    ResetGroup { group_id: i64 },
}

impl LedgerCommand {
    /// Short operation name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterUser(_) => "register_user",
            Self::RegisterMembers(_) => "register_members",
            Self::SetCurrency(_) => "set_currency",
            Self::CreateExpense(_) => "create_expense",
            Self::SplitExpense(_) => "split_expense",
            Self::RemoveExpense(_) => "remove_expense",
            Self::Settle(_) => "settle",
            Self::GetBalances { .. } => "get_balances",
            Self::GetUserExpenses { .. } => "get_user_expenses",
            Self::GetGroupSummary { .. } => "get_group_summary",
            Self::AuditGroup { .. } => "audit_group",
            Self::ResetGroup { .. } => "reset_group",
        }
    }
}

// =========================================================================
// Results
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMembersResult {
    pub registered: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveExpenseResult {
    pub expense_id: Uuid,
}

/// Result of a successful settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub settlement: Settlement,
    pub payer_name: String,
    pub receiver_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetGroupResult {
    pub group_id: i64,
}

/// Structured result of [`LedgerCommand`] dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum LedgerOutcome {
    UserRegistered(User),
    MembersRegistered(RegisterMembersResult),
    CurrencyUpdated(User),
    ExpenseCreated(ExpenseDetail),
    ExpenseRemoved(RemoveExpenseResult),
    Settled(SettlementResult),
    Balances(Vec<BalanceEntry>),
    Expenses(Vec<ExpenseDetail>),
    Summary(Vec<ExpenseDetail>),
    Audit(LedgerAudit),
    GroupReset(ResetGroupResult),
}
