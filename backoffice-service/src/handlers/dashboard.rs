use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    models::{parse_reference_date, Actor, Dashboard, DashboardQuery},
    services::database::today,
    AppState,
};

/// Bank balances and due summaries, as of `?date=YYYY-MM-DD` or today.
pub async fn get_dashboard(
    State(state): State<AppState>,
    _actor: Actor,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, AppError> {
    let (reference, mode) = parse_reference_date(query.date.as_deref(), today());
    tracing::debug!(reference = %reference, mode = ?mode, "Building dashboard");
    Ok(Json(state.db.dashboard(reference, mode).await?))
}
