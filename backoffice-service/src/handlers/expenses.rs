//! Expense workflow handlers.
//!
//! Permission, lock-down and transition rules live in the approval policy;
//! these handlers only validate payload shape and pass the actor through.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    models::{
        Actor, Expense, ExpenseChanges, ExpenseFilter, ExpenseForm, ExpenseLog, NewExpense,
        StatusSummary,
    },
    AppState,
};

pub async fn list_expenses(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<ExpenseFilter>,
) -> Result<Json<Vec<Expense>>, AppError> {
    Ok(Json(state.db.list_expenses(&actor, &filter).await?))
}

pub async fn expense_summary(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<ExpenseFilter>,
) -> Result<Json<Vec<StatusSummary>>, AppError> {
    Ok(Json(state.db.expense_summary(&actor, &filter).await?))
}

pub async fn create_expense(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<NewExpense>,
) -> Result<(StatusCode, Json<Expense>), AppError> {
    payload.validate()?;
    let expense = state.db.create_expense(&actor, &payload).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn get_expense(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Expense>, AppError> {
    Ok(Json(state.db.get_expense(&actor, id).await?))
}

pub async fn update_expense(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<ExpenseChanges>,
) -> Result<Json<Expense>, AppError> {
    payload.validate()?;
    Ok(Json(state.db.update_expense(&actor, id, &payload).await?))
}

pub async fn expense_logs(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ExpenseLog>>, AppError> {
    Ok(Json(state.db.expense_logs(&actor, id).await?))
}

/// Statuses the actor may choose and fields they may not touch.
pub async fn expense_form(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<ExpenseForm>, AppError> {
    Ok(Json(state.db.expense_form(&actor, id).await?))
}
