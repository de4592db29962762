//! Acting-user extraction.
//!
//! The fronting layer authenticates the user and forwards the numeric user id
//! in `X-User-ID`. Roles and the superuser flag are always loaded from the
//! user registry, never taken from headers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use service_core::error::AppError;

use crate::models::Actor;
use crate::AppState;

pub const ACTOR_HEADER: &str = "x-user-id";

/// Read the acting user id from request headers.
pub fn parse_user_id(headers: &HeaderMap) -> Result<i64, AppError> {
    let raw = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;

    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid X-User-ID header")))
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parse_user_id(&parts.headers)?;

        let actor = state.db.load_actor(user_id).await?.ok_or_else(|| {
            tracing::warn!(user_id, "Request from unknown user");
            AppError::Unauthorized(anyhow::anyhow!("Unknown user"))
        })?;

        tracing::Span::current().record("user_id", actor.user_id);
        Ok(actor)
    }
}

/// An actor holding the superuser flag. Guards user administration.
#[derive(Debug, Clone)]
pub struct Superuser(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for Superuser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_request_parts(parts, state).await?;
        if !actor.is_superuser {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "User administration requires a superuser"
            )));
        }
        Ok(Superuser(actor))
    }
}
