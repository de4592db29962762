//! Payables, receivables and the consolidated balance.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{ActionName, BulkActionRequest, BulkActionResponse},
    models::{
        Actor, BalanceEntry, BalanceFilter, LedgerFilter, LedgerKind, Payable, PayableInput,
        Receivable, ReceivableInput,
    },
    AppState,
};

// -----------------------------------------------------------------------------
// Payables
// -----------------------------------------------------------------------------

pub async fn list_payables(
    State(state): State<AppState>,
    _actor: Actor,
    Query(filter): Query<LedgerFilter>,
) -> Result<Json<Vec<Payable>>, AppError> {
    Ok(Json(state.db.list_payables(&filter).await?))
}

pub async fn get_payable(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Payable>, AppError> {
    Ok(Json(state.db.get_payable(id).await?))
}

pub async fn create_payable(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<PayableInput>,
) -> Result<(StatusCode, Json<Payable>), AppError> {
    payload.validate()?;
    let payable = state.db.save_payable(&actor, None, &payload).await?;
    tracing::info!(
        payable_id = payable.payable_id,
        document_number = %payable.document_number,
        user_id = actor.user_id,
        "Payable created"
    );
    Ok((StatusCode::CREATED, Json(payable)))
}

pub async fn update_payable(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<PayableInput>,
) -> Result<Json<Payable>, AppError> {
    payload.validate()?;
    Ok(Json(state.db.save_payable(&actor, Some(id), &payload).await?))
}

pub async fn delete_payable(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    tracing::info!(payable_id = id, user_id = actor.user_id, "Deleting payable");
    state.db.delete_payable(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn payables_action(
    State(state): State<AppState>,
    actor: Actor,
    Path(action): Path<ActionName>,
    Json(payload): Json<BulkActionRequest>,
) -> Result<Json<BulkActionResponse>, AppError> {
    bulk_action(state, actor, LedgerKind::Payable, action, payload).await
}

// -----------------------------------------------------------------------------
// Receivables
// -----------------------------------------------------------------------------

pub async fn list_receivables(
    State(state): State<AppState>,
    _actor: Actor,
    Query(filter): Query<LedgerFilter>,
) -> Result<Json<Vec<Receivable>>, AppError> {
    Ok(Json(state.db.list_receivables(&filter).await?))
}

pub async fn get_receivable(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Receivable>, AppError> {
    Ok(Json(state.db.get_receivable(id).await?))
}

pub async fn create_receivable(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<ReceivableInput>,
) -> Result<(StatusCode, Json<Receivable>), AppError> {
    payload.validate()?;
    let receivable = state.db.save_receivable(&actor, None, &payload).await?;
    tracing::info!(
        receivable_id = receivable.receivable_id,
        document_number = %receivable.document_number,
        user_id = actor.user_id,
        "Receivable created"
    );
    Ok((StatusCode::CREATED, Json(receivable)))
}

pub async fn update_receivable(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<ReceivableInput>,
) -> Result<Json<Receivable>, AppError> {
    payload.validate()?;
    Ok(Json(
        state.db.save_receivable(&actor, Some(id), &payload).await?,
    ))
}

pub async fn delete_receivable(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    tracing::info!(receivable_id = id, user_id = actor.user_id, "Deleting receivable");
    state.db.delete_receivable(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn receivables_action(
    State(state): State<AppState>,
    actor: Actor,
    Path(action): Path<ActionName>,
    Json(payload): Json<BulkActionRequest>,
) -> Result<Json<BulkActionResponse>, AppError> {
    bulk_action(state, actor, LedgerKind::Receivable, action, payload).await
}

async fn bulk_action(
    state: AppState,
    actor: Actor,
    kind: LedgerKind,
    action: ActionName,
    payload: BulkActionRequest,
) -> Result<Json<BulkActionResponse>, AppError> {
    payload.validate()?;
    let updated = state
        .db
        .apply_bulk_action(kind, action.into(), &payload.ids, &actor)
        .await?;
    tracing::info!(
        origin = kind.origin(),
        action = ?action,
        requested = payload.ids.len(),
        updated,
        "Bulk action applied"
    );
    Ok(Json(BulkActionResponse { updated }))
}

// -----------------------------------------------------------------------------
// Balance
// -----------------------------------------------------------------------------

pub async fn list_balance_entries(
    State(state): State<AppState>,
    _actor: Actor,
    Query(filter): Query<BalanceFilter>,
) -> Result<Json<Vec<BalanceEntry>>, AppError> {
    Ok(Json(state.db.list_balance_entries(&filter).await?))
}
