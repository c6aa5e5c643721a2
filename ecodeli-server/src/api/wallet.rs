//! Wallet balance, ledger and withdrawals

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use shared::models::{Wallet, WalletTransaction, Withdrawal, WithdrawalRequest, WithdrawalStatus};
use shared::util::now_millis;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::internal;
use crate::services::wallet;
use crate::state::AppState;

use super::{ApiResult, page};

#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/wallet
///
/// A user without earnings gets an empty wallet.
pub async fn get(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Wallet> {
    let wallet = db::wallets::find(&state.pool, user.id)
        .await
        .map_err(internal)?
        .unwrap_or(Wallet {
            user_id: user.id,
            balance: 0.0,
            pending_balance: 0.0,
            total_earned: 0.0,
            total_withdrawn: 0.0,
            updated_at: now_millis(),
        });
    Ok(Json(wallet))
}

/// GET /api/wallet/transactions
pub async fn transactions(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(q): Query<LedgerQuery>,
) -> ApiResult<Vec<WalletTransaction>> {
    let (limit, offset) = page(q.limit, q.offset);
    let rows = db::wallets::list_transactions(&state.pool, user.id, limit, offset)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// POST /api/wallet/withdrawals
pub async fn request_withdrawal(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<WithdrawalRequest>,
) -> ApiResult<Withdrawal> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let withdrawal = wallet::request_withdrawal(
        &mut tx,
        user.id,
        &req,
        state.settings.min_withdrawal_amount,
        now,
    )
    .await?;
    let detail = serde_json::json!({
        "amount": withdrawal.amount,
        "review_required": withdrawal.review_required,
    });
    db::audit::log(
        &mut *tx,
        Some(user.id),
        "withdrawal_requested",
        Some(withdrawal.id),
        Some(&detail),
        None,
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;
    Ok(Json(withdrawal))
}

/// GET /api/wallet/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Vec<Withdrawal>> {
    let rows = db::wallets::list_withdrawals_by_user(&state.pool, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// POST /api/wallet/withdrawals/{id}/cancel
pub async fn cancel_withdrawal(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<WithdrawalStatus> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let status = wallet::process_withdrawal(&mut tx, id, None, user.id, None, now).await?;
    tx.commit().await.map_err(internal)?;
    Ok(Json(status))
}
