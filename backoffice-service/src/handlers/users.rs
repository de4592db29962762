//! User registry handlers. Superuser only.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    middleware::Superuser,
    models::{CreateUser, UpdateUser, User},
    AppState,
};

pub async fn list_users(
    State(state): State<AppState>,
    _admin: Superuser,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.db.list_users().await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: Superuser,
    Path(id): Path<i64>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.db.get_user(id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    Superuser(admin): Superuser,
    Json(payload): Json<CreateUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    payload.validate()?;
    tracing::info!(
        username = %payload.username,
        created_by = admin.user_id,
        "Creating user"
    );
    let user = state.db.create_user(&payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Superuser(admin): Superuser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUser>,
) -> Result<Json<User>, AppError> {
    payload.validate()?;
    tracing::info!(user_id = id, updated_by = admin.user_id, "Updating user");
    Ok(Json(state.db.update_user(id, &payload).await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Superuser(admin): Superuser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if id == admin.user_id {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Users cannot delete themselves"
        )));
    }
    tracing::info!(user_id = id, deleted_by = admin.user_id, "Deleting user");
    state.db.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
