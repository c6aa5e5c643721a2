//! Back-office: users, escrow decisions, withdrawals and platform figures

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::json;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    BookingStatus, EscrowStatus, Payment, PaymentKind, ProcessWithdrawalRequest, RefundRequest,
    ResolveDisputeRequest, UpdateUserStatusRequest, UserInfo, UserRole, UserStatus, Withdrawal,
    WithdrawalStatus,
};
use shared::util::now_millis;
use sqlx::PgConnection;

use crate::auth::CurrentUser;
use crate::db;
use crate::db::audit::AuditEntry;
use crate::db::stats::PlatformStats;
use crate::error::internal;
use crate::services::{escrow, wallet};
use crate::state::AppState;
use crate::util::forwarded_ip;

use super::{ApiResult, page};

// ── Users ──

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(q): Query<UserListQuery>,
) -> ApiResult<Vec<UserInfo>> {
    let (limit, offset) = page(q.limit, q.offset);
    let users = db::users::list(&state.pool, q.role, q.status, limit, offset)
        .await
        .map_err(internal)?;
    Ok(Json(users.iter().map(UserInfo::from).collect()))
}

/// PUT /api/admin/users/{id}/status
pub async fn set_user_status(
    State(state): State<AppState>,
    admin: CurrentUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserStatusRequest>,
) -> ApiResult<UserInfo> {
    if id == admin.id {
        return Err(AppError::business_rule("Admins cannot change their own status"));
    }
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let mut user = db::users::find_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    let previous = user.status.clone();

    db::users::set_status(&mut *tx, id, req.status, user.is_verified, now)
        .await
        .map_err(internal)?;
    let ip = forwarded_ip(&headers);
    db::audit::log(
        &mut *tx,
        Some(admin.id),
        "user_status_changed",
        Some(id),
        Some(&json!({ "from": previous, "to": req.status.as_db(), "reason": req.reason })),
        ip.as_deref(),
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    tracing::info!(user_id = id, from = %previous, to = %req.status, admin_id = admin.id, "User status changed");
    user.status = req.status.as_db().to_string();
    user.updated_at = now;
    Ok(Json(UserInfo::from(&user)))
}

/// GET /api/admin/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<PlatformStats> {
    let stats = db::stats::platform_stats(&state.pool, now_millis())
        .await
        .map_err(internal)?;
    Ok(Json(stats))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub actor_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/admin/audit
pub async fn audit_log(
    State(state): State<AppState>,
    Query(q): Query<AuditQuery>,
) -> ApiResult<Vec<AuditEntry>> {
    let (limit, offset) = page(q.limit, q.offset);
    let rows = db::audit::query(&state.pool, q.action.as_deref(), q.actor_id, limit, offset)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

// ── Escrow ──

#[derive(Debug, Default, Deserialize)]
pub struct PaymentListQuery {
    pub status: Option<EscrowStatus>,
}

/// GET /api/admin/payments?status=DISPUTED
///
/// Defaults to the dispute queue.
pub async fn list_payments(
    State(state): State<AppState>,
    Query(q): Query<PaymentListQuery>,
) -> ApiResult<Vec<Payment>> {
    let status = q.status.unwrap_or(EscrowStatus::Disputed);
    let rows = db::payments::list_by_status(&state.pool, status)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

async fn lock_payment(conn: &mut PgConnection, id: i64) -> Result<Payment, AppError> {
    db::payments::find_for_update(&mut *conn, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))
}

/// POST /api/admin/payments/{id}/refund
pub async fn refund(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<RefundRequest>,
) -> ApiResult<EscrowStatus> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let payment = lock_payment(&mut tx, id).await?;
    let status = escrow::refund(
        &state,
        &mut tx,
        &payment,
        req.amount,
        req.reason.as_deref(),
        Some(admin.id),
        now,
    )
    .await?;
    tx.commit().await.map_err(internal)?;
    Ok(Json(status))
}

/// POST /api/admin/payments/{id}/resolve
pub async fn resolve_dispute(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<ResolveDisputeRequest>,
) -> ApiResult<EscrowStatus> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let payment = lock_payment(&mut tx, id).await?;
    let status = escrow::resolve(
        &state,
        &mut tx,
        &payment,
        req.resolution,
        req.amount,
        req.note.as_deref(),
        admin.id,
        now,
    )
    .await?;
    tx.commit().await.map_err(internal)?;
    Ok(Json(status))
}

/// Whether the work paid for is done, and whether there is proof of it
async fn work_state(conn: &mut PgConnection, payment: &Payment) -> Result<(bool, bool), AppError> {
    match payment.kind() {
        Some(PaymentKind::Delivery) => {
            let delivery = db::deliveries::find(&mut *conn, payment.reference_id)
                .await
                .map_err(internal)?
                .ok_or_else(|| AppError::new(ErrorCode::DeliveryNotFound))?;
            let validated = delivery.validated_at.is_some();
            // a matching validation code is proof on its own
            Ok((validated, validated || delivery.proof_photo_url.is_some()))
        }
        Some(PaymentKind::Booking) => {
            let booking = db::services::find_booking(&mut *conn, payment.reference_id)
                .await
                .map_err(internal)?
                .ok_or_else(|| AppError::new(ErrorCode::BookingNotFound))?;
            let done = booking.status() == Some(BookingStatus::Completed);
            Ok((done, done))
        }
        Some(PaymentKind::Storage) => Ok((true, true)),
        None => Err(AppError::internal("Unknown payment kind")),
    }
}

/// POST /api/admin/payments/{id}/release
///
/// Manual release; the usual hold and validation rules still apply.
pub async fn release(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<EscrowStatus> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let payment = lock_payment(&mut tx, id).await?;
    let (validated, has_proof) = work_state(&mut tx, &payment).await?;
    escrow::release(
        &state.settings,
        &mut tx,
        &payment,
        validated,
        has_proof,
        Some(admin.id),
        now,
    )
    .await?;
    tx.commit().await.map_err(internal)?;
    Ok(Json(EscrowStatus::Released))
}

// ── Withdrawals ──

#[derive(Debug, Default, Deserialize)]
pub struct WithdrawalListQuery {
    pub status: Option<WithdrawalStatus>,
}

/// GET /api/admin/withdrawals?status=PENDING
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Query(q): Query<WithdrawalListQuery>,
) -> ApiResult<Vec<Withdrawal>> {
    let status = q.status.unwrap_or(WithdrawalStatus::Pending);
    let rows = db::wallets::list_withdrawals_by_status(&state.pool, status)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// POST /api/admin/withdrawals/{id}/process
pub async fn process_withdrawal(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<ProcessWithdrawalRequest>,
) -> ApiResult<WithdrawalStatus> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let status = wallet::process_withdrawal(
        &mut tx,
        id,
        Some(req.action),
        admin.id,
        req.reason.as_deref(),
        now,
    )
    .await?;
    db::audit::log(
        &mut *tx,
        Some(admin.id),
        "withdrawal_processed",
        Some(id),
        Some(&json!({ "status": status.as_db(), "reason": req.reason })),
        None,
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;
    Ok(Json(status))
}
