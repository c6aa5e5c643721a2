//! Escrowed payments

use shared::models::{EscrowStatus, Payment, PaymentKind};
use sqlx::PgPool;

use super::BoxError;

pub async fn insert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    p: &Payment,
) -> Result<(), BoxError> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, kind, reference_id, payer_id, payee_id, amount, currency, status,
            stripe_payment_intent_id, platform_fee, payee_amount, refunded_amount,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, 0, 0, $10, $10)
        "#,
    )
    .bind(p.id)
    .bind(&p.kind)
    .bind(p.reference_id)
    .bind(p.payer_id)
    .bind(p.payee_id)
    .bind(p.amount)
    .bind(&p.currency)
    .bind(&p.status)
    .bind(&p.stripe_payment_intent_id)
    .bind(p.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Payment>, BoxError> {
    let row: Option<Payment> = sqlx::query_as("SELECT * FROM payments WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn find_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Payment>, BoxError> {
    let row: Option<Payment> = sqlx::query_as("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn find_by_intent_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    intent_id: &str,
) -> Result<Option<Payment>, BoxError> {
    let row: Option<Payment> = sqlx::query_as(
        "SELECT * FROM payments WHERE stripe_payment_intent_id = $1 FOR UPDATE",
    )
    .bind(intent_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Latest payment attached to a delivery, booking or reservation
pub async fn find_by_reference(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    kind: PaymentKind,
    reference_id: i64,
) -> Result<Option<Payment>, BoxError> {
    let row: Option<Payment> = sqlx::query_as(
        "SELECT * FROM payments WHERE kind = $1 AND reference_id = $2 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(kind.as_db())
    .bind(reference_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn list_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<Payment>, BoxError> {
    let rows: Vec<Payment> = sqlx::query_as(
        "SELECT * FROM payments WHERE payer_id = $1 OR payee_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_by_status(pool: &PgPool, status: EscrowStatus) -> Result<Vec<Payment>, BoxError> {
    let rows: Vec<Payment> = sqlx::query_as(
        "SELECT * FROM payments WHERE status = $1 ORDER BY updated_at",
    )
    .bind(status.as_db())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// HELD payments whose work finished before `ready_before`: validated
/// deliveries and completed bookings
pub async fn list_release_candidates(
    pool: &PgPool,
    ready_before: i64,
) -> Result<Vec<(i64, i64)>, BoxError> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT p.id, d.validated_at FROM payments p
        JOIN deliveries d ON p.kind = 'DELIVERY' AND d.id = p.reference_id
        WHERE p.status = 'HELD' AND d.validated_at IS NOT NULL AND d.validated_at <= $1
        UNION ALL
        SELECT p.id, b.updated_at FROM payments p
        JOIN bookings b ON p.kind = 'BOOKING' AND b.id = p.reference_id
        WHERE p.status = 'HELD' AND b.status = 'COMPLETED' AND b.updated_at <= $1
        "#,
    )
    .bind(ready_before)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_intent(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    intent_id: &str,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE payments SET stripe_payment_intent_id = $2, updated_at = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(intent_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: EscrowStatus,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE payments SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(status.as_db())
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn mark_held(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE payments SET status = 'HELD', captured_at = $2, updated_at = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn mark_released(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    platform_fee: f64,
    payee_amount: f64,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE payments SET status = 'RELEASED', platform_fee = $2, payee_amount = $3,
            released_at = $4, updated_at = $4
         WHERE id = $1",
    )
    .bind(id)
    .bind(platform_fee)
    .bind(payee_amount)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn record_refund(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    refunded_amount: f64,
    status: EscrowStatus,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE payments SET refunded_amount = $2, status = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(refunded_amount)
    .bind(status.as_db())
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn mark_disputed(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    reason: &str,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE payments SET status = 'DISPUTED', dispute_reason = $2, updated_at = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(reason)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}
