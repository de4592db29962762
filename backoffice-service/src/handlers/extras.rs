//! Extra billing entries.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    models::{Actor, ExtraEntry, ExtraInput, ExtraSummary},
    AppState,
};

pub async fn list_extras(
    State(state): State<AppState>,
    _actor: Actor,
) -> Result<Json<Vec<ExtraSummary>>, AppError> {
    Ok(Json(state.db.list_extras().await?))
}

pub async fn get_extra(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<ExtraEntry>, AppError> {
    Ok(Json(state.db.get_extra(id).await?))
}

pub async fn create_extra(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<ExtraInput>,
) -> Result<(StatusCode, Json<ExtraEntry>), AppError> {
    payload.validate()?;
    let entry = state.db.save_extra(&actor, None, &payload).await?;
    tracing::info!(
        extra_id = entry.extra_id,
        invoice_number = %entry.invoice_number,
        user_id = actor.user_id,
        "Extra entry created"
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update_extra(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<ExtraInput>,
) -> Result<Json<ExtraEntry>, AppError> {
    payload.validate()?;
    Ok(Json(state.db.save_extra(&actor, Some(id), &payload).await?))
}

pub async fn delete_extra(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    tracing::info!(extra_id = id, user_id = actor.user_id, "Deleting extra entry");
    state.db.delete_extra(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
