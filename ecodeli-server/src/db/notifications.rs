//! In-app notifications

use shared::models::Notification;
use sqlx::PgPool;

use super::BoxError;

pub async fn insert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    n: &Notification,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO notifications (id, user_id, kind, title, body, reference_id, is_read, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)",
    )
    .bind(n.id)
    .bind(n.user_id)
    .bind(&n.kind)
    .bind(&n.title)
    .bind(&n.body)
    .bind(n.reference_id)
    .bind(n.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list(
    pool: &PgPool,
    user_id: i64,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<Notification>, BoxError> {
    let rows: Vec<Notification> = sqlx::query_as(
        "SELECT * FROM notifications
         WHERE user_id = $1 AND (NOT $2 OR NOT is_read)
         ORDER BY created_at DESC LIMIT $3",
    )
    .bind(user_id)
    .bind(unread_only)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn mark_read(pool: &PgPool, id: i64, user_id: i64) -> Result<bool, BoxError> {
    let rows = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows > 0)
}

pub async fn mark_all_read(pool: &PgPool, user_id: i64) -> Result<u64, BoxError> {
    let rows = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows)
}
