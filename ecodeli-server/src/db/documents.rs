//! Verification documents

use shared::models::{Document, VerificationStatus};
use sqlx::PgPool;

use super::BoxError;

pub async fn insert(pool: &PgPool, d: &Document) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO documents (id, user_id, doc_type, file_url, file_name, status, expires_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(d.id)
    .bind(d.user_id)
    .bind(&d.doc_type)
    .bind(&d.file_url)
    .bind(&d.file_name)
    .bind(&d.status)
    .bind(d.expires_at)
    .bind(d.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Document>, BoxError> {
    let row: Option<Document> = sqlx::query_as("SELECT * FROM documents WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn list_by_user(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    user_id: i64,
) -> Result<Vec<Document>, BoxError> {
    let rows: Vec<Document> = sqlx::query_as(
        "SELECT * FROM documents WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Review queue, oldest first
pub async fn list_pending(pool: &PgPool) -> Result<Vec<Document>, BoxError> {
    let rows: Vec<Document> = sqlx::query_as(
        "SELECT * FROM documents WHERE status = 'PENDING' ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn review(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: VerificationStatus,
    reason: Option<&str>,
    reviewer_id: i64,
    now: i64,
) -> Result<Document, BoxError> {
    let row: Document = sqlx::query_as(
        "UPDATE documents SET status = $2, rejection_reason = $3, reviewed_by = $4, reviewed_at = $5
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status.as_db())
    .bind(reason)
    .bind(reviewer_id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Flip lapsed approvals to EXPIRED, returns the owners affected
pub async fn expire_lapsed(pool: &PgPool, now: i64) -> Result<Vec<i64>, BoxError> {
    let users: Vec<i64> = sqlx::query_scalar(
        "UPDATE documents SET status = 'EXPIRED'
         WHERE status = 'APPROVED' AND expires_at IS NOT NULL AND expires_at <= $1
         RETURNING user_id",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(users)
}
