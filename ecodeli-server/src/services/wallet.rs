//! Wallet ledger operations
//!
//! Every balance change locks the wallet row, computes in `Decimal` and
//! writes the matching ledger entry on the same connection.

use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    NotificationKind, TransactionStatus, Wallet, WalletTransaction, WalletTransactionType,
    Withdrawal, WithdrawalAction, WithdrawalRequest, WithdrawalStatus, mask_iban, plan_withdrawal,
};
use shared::pricing::{to_decimal, to_f64};
use shared::util::snowflake_id;
use sqlx::PgConnection;

use crate::db;
use crate::error::ServiceResult;
use crate::services::notify;

fn add(a: f64, b: Decimal) -> f64 {
    to_f64(to_decimal(a) + b)
}

#[allow(clippy::too_many_arguments)]
async fn record(
    conn: &mut PgConnection,
    user_id: i64,
    kind: WalletTransactionType,
    amount: Decimal,
    status: TransactionStatus,
    reference_id: Option<i64>,
    description: impl Into<String>,
    now: i64,
) -> ServiceResult<WalletTransaction> {
    let tx = WalletTransaction {
        id: snowflake_id(),
        user_id,
        kind: kind.as_db().to_string(),
        amount: to_f64(amount),
        status: status.as_db().to_string(),
        reference_id,
        description: Some(description.into()),
        created_at: now,
    };
    db::wallets::insert_transaction(&mut *conn, &tx).await?;
    Ok(tx)
}

/// Credit a payout: the gross earning and the platform commission are
/// both recorded, the balance moves by their difference.
pub async fn credit_payout(
    conn: &mut PgConnection,
    user_id: i64,
    gross: f64,
    commission: f64,
    payment_id: i64,
    now: i64,
) -> ServiceResult<Wallet> {
    let gross = to_decimal(gross);
    let commission = to_decimal(commission);
    let net = gross - commission;

    let mut wallet = db::wallets::lock(conn, user_id, now).await?;
    wallet.balance = add(wallet.balance, net);
    wallet.total_earned = add(wallet.total_earned, net);
    wallet.updated_at = now;
    db::wallets::save(&mut *conn, &wallet).await?;

    record(
        conn,
        user_id,
        WalletTransactionType::Earning,
        gross,
        TransactionStatus::Completed,
        Some(payment_id),
        "Escrow release",
        now,
    )
    .await?;
    if commission > Decimal::ZERO {
        record(
            conn,
            user_id,
            WalletTransactionType::Commission,
            -commission,
            TransactionStatus::Completed,
            Some(payment_id),
            "Platform commission",
            now,
        )
        .await?;
    }
    Ok(wallet)
}

/// Take back the payee's share of a refund issued after release. The
/// balance may go negative; later earnings settle it.
pub async fn claw_back(
    conn: &mut PgConnection,
    user_id: i64,
    amount: f64,
    payment_id: i64,
    now: i64,
) -> ServiceResult<Wallet> {
    let amount = to_decimal(amount);
    let mut wallet = db::wallets::lock(conn, user_id, now).await?;
    wallet.balance = add(wallet.balance, -amount);
    wallet.total_earned = add(wallet.total_earned, -amount);
    wallet.updated_at = now;
    db::wallets::save(&mut *conn, &wallet).await?;

    record(
        conn,
        user_id,
        WalletTransactionType::Refund,
        -amount,
        TransactionStatus::Completed,
        Some(payment_id),
        "Refund to client",
        now,
    )
    .await?;
    if wallet.balance < 0.0 {
        tracing::warn!(user_id, balance = wallet.balance, "Wallet balance negative after refund");
    }
    Ok(wallet)
}

/// Reserve funds for a payout to the user's bank account
pub async fn request_withdrawal(
    conn: &mut PgConnection,
    user_id: i64,
    req: &WithdrawalRequest,
    minimum: f64,
    now: i64,
) -> ServiceResult<Withdrawal> {
    let iban_last4 = mask_iban(&req.iban)?;
    let mut wallet = db::wallets::lock(conn, user_id, now).await?;
    let has_open = db::wallets::has_open_withdrawal(&mut *conn, user_id).await?;
    let plan = plan_withdrawal(req.amount, wallet.balance, minimum, has_open)?;

    let amount = to_decimal(req.amount);
    wallet.balance = add(wallet.balance, -amount);
    wallet.pending_balance = add(wallet.pending_balance, amount);
    wallet.updated_at = now;
    db::wallets::save(&mut *conn, &wallet).await?;

    let tx = record(
        conn,
        user_id,
        WalletTransactionType::Withdrawal,
        -amount,
        TransactionStatus::Pending,
        None,
        format!("Withdrawal to IBAN ****{iban_last4}"),
        now,
    )
    .await?;

    let withdrawal = Withdrawal {
        id: snowflake_id(),
        user_id,
        amount: to_f64(amount),
        status: WithdrawalStatus::Pending.as_db().to_string(),
        iban_last4,
        review_required: plan.review_required,
        priority: plan.priority,
        transaction_id: tx.id,
        processed_by: None,
        rejection_reason: None,
        created_at: now,
        processed_at: None,
    };
    db::wallets::insert_withdrawal(&mut *conn, &withdrawal).await?;
    tracing::info!(
        user_id,
        withdrawal_id = withdrawal.id,
        amount = withdrawal.amount,
        review_required = plan.review_required,
        "Withdrawal requested"
    );
    Ok(withdrawal)
}

/// Move a withdrawal along its lifecycle. `action == None` is the owner
/// cancelling their own pending request.
pub async fn process_withdrawal(
    conn: &mut PgConnection,
    withdrawal_id: i64,
    action: Option<WithdrawalAction>,
    actor_id: i64,
    reason: Option<&str>,
    now: i64,
) -> ServiceResult<WithdrawalStatus> {
    let withdrawal = db::wallets::find_withdrawal_for_update(&mut *conn, withdrawal_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::WithdrawalNotFound))?;
    let current = withdrawal
        .status()
        .ok_or_else(|| AppError::internal("Unknown withdrawal status"))?;

    let (target, returns_funds) = match action {
        Some(action) => (action.target(), action.returns_funds()),
        None => {
            if withdrawal.user_id != actor_id {
                return Err(AppError::not_owner().into());
            }
            (WithdrawalStatus::Cancelled, true)
        }
    };
    if !current.can_transition_to(target) {
        return Err(AppError::invalid_transition(current.as_db(), target.as_db()).into());
    }
    if target == WithdrawalStatus::Rejected && reason.is_none_or(|r| r.trim().is_empty()) {
        return Err(AppError::new(ErrorCode::RejectionReasonRequired).into());
    }

    let amount = to_decimal(withdrawal.amount);
    if returns_funds || target == WithdrawalStatus::Completed {
        let mut wallet = db::wallets::lock(conn, withdrawal.user_id, now).await?;
        wallet.pending_balance = add(wallet.pending_balance, -amount);
        if returns_funds {
            wallet.balance = add(wallet.balance, amount);
        } else {
            wallet.total_withdrawn = add(wallet.total_withdrawn, amount);
        }
        wallet.updated_at = now;
        db::wallets::save(&mut *conn, &wallet).await?;

        let tx_status = if returns_funds {
            TransactionStatus::Cancelled
        } else {
            TransactionStatus::Completed
        };
        db::wallets::set_transaction_status(&mut *conn, withdrawal.transaction_id, tx_status).await?;
    }

    db::wallets::update_withdrawal(&mut *conn, withdrawal_id, target, actor_id, reason, now).await?;

    if withdrawal.user_id != actor_id {
        let body = match reason {
            Some(reason) => format!("Your withdrawal of {:.2} is now {target}: {reason}", withdrawal.amount),
            None => format!("Your withdrawal of {:.2} is now {target}", withdrawal.amount),
        };
        notify::send(
            &mut *conn,
            withdrawal.user_id,
            NotificationKind::WithdrawalUpdate,
            "Withdrawal update",
            body,
            Some(withdrawal_id),
            now,
        )
        .await?;
    }

    tracing::info!(withdrawal_id, from = %current, to = %target, "Withdrawal processed");
    Ok(target)
}
