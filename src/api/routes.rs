//! API Routes
//!
//! HTTP endpoint definitions. Each handler forwards to the [`Ledger`] and
//! returns its structured result as JSON.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{BalanceEntry, ExpenseDetail, OperationContext, User};
use crate::error::AppError;
use crate::handlers::{
    CreateExpenseCommand, LedgerCommand, LedgerOutcome, MemberInfo, RegisterMembersCommand,
    RegisterMembersResult, RegisterUserCommand, RemoveExpenseCommand, RemoveExpenseResult,
    ResetGroupResult, SetCurrencyCommand, SettleCommand, SettlementResult, SplitExpenseCommand,
};
use crate::ledger::Ledger;
use crate::projection::LedgerAudit;

pub type AppState = Arc<Ledger>;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterMembersRequest {
    pub members: Vec<MemberInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetCurrencyRequest {
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalancesResponse {
    pub group_id: i64,
    pub balances: Vec<BalanceEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpensesResponse {
    pub expenses: Vec<ExpenseDetail>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/users", post(register_user))
        .route("/users/:external_id/currency", put(set_currency))
        .route("/users/:external_id/expenses", get(get_user_expenses))
        .route("/groups/:group_id/members", post(register_members))
        .route("/groups/:group_id/balances", get(get_balances))
        .route("/groups/:group_id/summary", get(get_group_summary))
        .route("/groups/:group_id/audit", get(audit_group))
        .route("/groups/:group_id/reset", post(reset_group))
        .route("/expenses", post(create_expense))
        .route("/expenses/split", post(split_expense))
        .route("/expenses/:expense_id", delete(remove_expense))
        .route("/settlements", post(settle))
        .route("/commands", post(execute_command))
}

// =========================================================================
// Users
// =========================================================================

async fn register_user(
    State(ledger): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<RegisterUserCommand>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = ledger.register_user(command, &context).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn register_members(
    State(ledger): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(group_id): Path<i64>,
    Json(request): Json<RegisterMembersRequest>,
) -> Result<Json<RegisterMembersResult>, AppError> {
    let command = RegisterMembersCommand {
        group_id,
        members: request.members,
    };
    Ok(Json(ledger.register_members(command, &context).await?))
}

async fn set_currency(
    State(ledger): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(external_id): Path<i64>,
    Json(request): Json<SetCurrencyRequest>,
) -> Result<Json<User>, AppError> {
    let command = SetCurrencyCommand {
        external_id,
        currency: request.currency,
    };
    Ok(Json(ledger.set_currency(command, &context).await?))
}

async fn get_user_expenses(
    State(ledger): State<AppState>,
    Path(external_id): Path<i64>,
) -> Result<Json<ExpensesResponse>, AppError> {
    let expenses = ledger.get_user_expenses(external_id).await?;
    Ok(Json(ExpensesResponse { expenses }))
}

// =========================================================================
// Groups
// =========================================================================

async fn get_balances(
    State(ledger): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<BalancesResponse>, AppError> {
    let balances = ledger.get_balances(group_id).await?;
    Ok(Json(BalancesResponse { group_id, balances }))
}

async fn get_group_summary(
    State(ledger): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<ExpensesResponse>, AppError> {
    let expenses = ledger.group_summary(group_id).await?;
    Ok(Json(ExpensesResponse { expenses }))
}

async fn audit_group(
    State(ledger): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<LedgerAudit>, AppError> {
    Ok(Json(ledger.audit_group(group_id).await?))
}

async fn reset_group(
    State(ledger): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(group_id): Path<i64>,
) -> Result<Json<ResetGroupResult>, AppError> {
    Ok(Json(ledger.reset_group(group_id, &context).await?))
}

// =========================================================================
// Expenses
// =========================================================================

async fn create_expense(
    State(ledger): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<CreateExpenseCommand>,
) -> Result<(StatusCode, Json<ExpenseDetail>), AppError> {
    let detail = ledger.create_expense(command, &context).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn split_expense(
    State(ledger): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<SplitExpenseCommand>,
) -> Result<(StatusCode, Json<ExpenseDetail>), AppError> {
    let detail = ledger.split_expense(command, &context).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Remove an expense; the requester comes from `X-Request-User-Id`
async fn remove_expense(
    State(ledger): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<RemoveExpenseResult>, AppError> {
    let requester = context
        .request_user
        .ok_or_else(|| AppError::MissingHeader("X-Request-User-Id".to_string()))?;

    let command = RemoveExpenseCommand {
        expense_id,
        requester,
    };
    Ok(Json(ledger.remove_expense(command, &context).await?))
}

// =========================================================================
// Settlements
// =========================================================================

async fn settle(
    State(ledger): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<SettleCommand>,
) -> Result<(StatusCode, Json<SettlementResult>), AppError> {
    let result = ledger.settle(command, &context).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

// =========================================================================
// Typed dispatch
// =========================================================================

async fn execute_command(
    State(ledger): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<LedgerCommand>,
) -> Result<Json<LedgerOutcome>, AppError> {
    Ok(Json(ledger.execute(command, &context).await?))
}
