//! Payments seen by their payer and payee

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::models::{DisputeRequest, Payment, PaymentIntentInfo, PaymentKind};
use shared::pricing::{EscrowBreakdown, adjust_for_client_rating, commission_split, escrow_breakdown};
use shared::util::now_millis;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::internal;
use crate::services::escrow;
use crate::state::AppState;

use super::ApiResult;

async fn load_visible(state: &AppState, id: i64, user: &CurrentUser) -> Result<Payment, AppError> {
    let payment = db::payments::find(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))?;
    let involved = payment.payer_id == user.id || payment.payee_id == Some(user.id);
    if !involved && !user.is_admin() {
        return Err(AppError::new(ErrorCode::NotResourceOwner));
    }
    Ok(payment)
}

/// GET /api/payments
pub async fn list_mine(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Vec<Payment>> {
    let rows = db::payments::list_for_user(&state.pool, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// GET /api/payments/{id}
pub async fn get(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Payment> {
    Ok(Json(load_visible(&state, id, &user).await?))
}

/// POST /api/payments/{id}/intent
///
/// Hands the payer a fresh client secret for a payment still PENDING.
pub async fn open_intent(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<PaymentIntentInfo> {
    let payment = load_visible(&state, id, &user).await?;
    if payment.payer_id != user.id {
        return Err(AppError::new(ErrorCode::NotResourceOwner));
    }
    Ok(Json(escrow::open_intent(&state, id).await?))
}

#[derive(Debug, Serialize)]
pub struct PaymentBreakdown {
    pub payment_id: i64,
    pub breakdown: EscrowBreakdown,
    /// What the payee receives at release
    pub payee_amount: f64,
    pub commission: f64,
}

/// GET /api/payments/{id}/breakdown
///
/// Informational split of the amount. The delivery fee line follows the
/// payee's rating; the payout itself uses the flat commission.
pub async fn breakdown(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<PaymentBreakdown> {
    let payment = load_visible(&state, id, &user).await?;
    let kind = payment
        .kind()
        .ok_or_else(|| AppError::internal("Unknown payment kind"))?;
    let rate = escrow::commission_percent(&state.settings, kind);

    let mut breakdown = escrow_breakdown(payment.amount, rate);
    if let (PaymentKind::Delivery, Some(payee_id)) = (kind, payment.payee_id) {
        let rating = db::reviews::average_for(&state.pool, payee_id)
            .await
            .map_err(internal)?;
        breakdown = adjust_for_client_rating(breakdown, rating);
    }
    let (payee_amount, commission) = match payment.payee_id {
        Some(_) => commission_split(payment.amount, rate),
        None => (0.0, payment.amount),
    };
    Ok(Json(PaymentBreakdown {
        payment_id: payment.id,
        breakdown,
        payee_amount,
        commission,
    }))
}

/// POST /api/payments/{id}/dispute
///
/// The payer contests held funds; an admin decides.
pub async fn dispute(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<DisputeRequest>,
) -> ApiResult<Payment> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let payment = db::payments::find_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))?;
    if payment.payer_id != user.id {
        return Err(AppError::new(ErrorCode::NotResourceOwner));
    }
    escrow::dispute(&mut tx, &payment, user.id, req.reason.trim(), now).await?;
    tx.commit().await.map_err(internal)?;

    Ok(Json(load_visible(&state, id, &user).await?))
}
