//! In-app notifications

use axum::Json;
use axum::extract::{Path, Query, State};
use shared::error::AppError;
use shared::models::{Notification, NotificationQuery};

use crate::auth::CurrentUser;
use crate::db;
use crate::error::internal;
use crate::state::AppState;

use super::{ApiResult, page};

/// GET /api/notifications
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(q): Query<NotificationQuery>,
) -> ApiResult<Vec<Notification>> {
    let (limit, _) = page(q.limit, None);
    let rows = db::notifications::list(&state.pool, user.id, q.unread_only, limit)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<bool> {
    let updated = db::notifications::mark_read(&state.pool, id, user.id)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(AppError::not_found("Notification"));
    }
    Ok(Json(true))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(State(state): State<AppState>, user: CurrentUser) -> ApiResult<u64> {
    let count = db::notifications::mark_all_read(&state.pool, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(count))
}
