//! Wallets, ledger entries and withdrawals
//!
//! Balance arithmetic happens in the caller on a locked row; this module
//! only reads and writes.

use shared::models::{
    TransactionStatus, Wallet, WalletTransaction, Withdrawal, WithdrawalStatus,
};
use sqlx::{PgConnection, PgPool};

use super::BoxError;

/// Create the wallet if missing, then lock it
pub async fn lock(conn: &mut PgConnection, user_id: i64, now: i64) -> Result<Wallet, BoxError> {
    sqlx::query("INSERT INTO wallets (user_id, updated_at) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    let wallet: Wallet = sqlx::query_as("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(wallet)
}

pub async fn find(pool: &PgPool, user_id: i64) -> Result<Option<Wallet>, BoxError> {
    let row: Option<Wallet> = sqlx::query_as("SELECT * FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn save(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    w: &Wallet,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE wallets SET balance = $2, pending_balance = $3, total_earned = $4,
            total_withdrawn = $5, updated_at = $6
         WHERE user_id = $1",
    )
    .bind(w.user_id)
    .bind(w.balance)
    .bind(w.pending_balance)
    .bind(w.total_earned)
    .bind(w.total_withdrawn)
    .bind(w.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

// ── Ledger ──

pub async fn insert_transaction(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    t: &WalletTransaction,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO wallet_transactions (id, user_id, kind, amount, status, reference_id, description, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(t.id)
    .bind(t.user_id)
    .bind(&t.kind)
    .bind(t.amount)
    .bind(&t.status)
    .bind(t.reference_id)
    .bind(&t.description)
    .bind(t.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_transaction_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: TransactionStatus,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE wallet_transactions SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_db())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn list_transactions(
    pool: &PgPool,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<WalletTransaction>, BoxError> {
    let rows: Vec<WalletTransaction> = sqlx::query_as(
        "SELECT * FROM wallet_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ── Withdrawals ──

pub async fn insert_withdrawal(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    w: &Withdrawal,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO withdrawals (id, user_id, amount, status, iban_last4, review_required, priority, transaction_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(w.id)
    .bind(w.user_id)
    .bind(w.amount)
    .bind(&w.status)
    .bind(&w.iban_last4)
    .bind(w.review_required)
    .bind(w.priority)
    .bind(w.transaction_id)
    .bind(w.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn has_open_withdrawal(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    user_id: i64,
) -> Result<bool, BoxError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM withdrawals WHERE user_id = $1 AND status IN ('PENDING', 'PROCESSING'))",
    )
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

pub async fn find_withdrawal_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Withdrawal>, BoxError> {
    let row: Option<Withdrawal> =
        sqlx::query_as("SELECT * FROM withdrawals WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(row)
}

pub async fn list_withdrawals_by_user(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<Withdrawal>, BoxError> {
    let rows: Vec<Withdrawal> = sqlx::query_as(
        "SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Admin queue: high priority first, then oldest
pub async fn list_withdrawals_by_status(
    pool: &PgPool,
    status: WithdrawalStatus,
) -> Result<Vec<Withdrawal>, BoxError> {
    let rows: Vec<Withdrawal> = sqlx::query_as(
        "SELECT * FROM withdrawals WHERE status = $1 ORDER BY priority DESC, created_at",
    )
    .bind(status.as_db())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn update_withdrawal(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: WithdrawalStatus,
    processed_by: i64,
    reason: Option<&str>,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE withdrawals SET status = $2, processed_by = $3,
            rejection_reason = COALESCE($4, rejection_reason), processed_at = $5
         WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_db())
    .bind(processed_by)
    .bind(reason)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}
