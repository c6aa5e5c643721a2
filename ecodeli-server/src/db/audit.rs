//! Audit log operations

use sqlx::PgPool;

use super::BoxError;

/// Write an audit log entry
pub async fn log(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    actor_id: Option<i64>,
    action: &str,
    target_id: Option<i64>,
    detail: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO audit_logs (actor_id, action, target_id, detail, ip_address, created_at) VALUES ($1, $2, $3, $4, $5, $6)"
    )
    .bind(actor_id)
    .bind(action)
    .bind(target_id)
    .bind(detail)
    .bind(ip_address)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow, serde::Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub action: String,
    pub target_id: Option<i64>,
    pub detail: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_at: i64,
}

/// Query audit log entries, newest first
pub async fn query(
    pool: &PgPool,
    action: Option<&str>,
    actor_id: Option<i64>,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditEntry>, BoxError> {
    let rows: Vec<AuditEntry> = sqlx::query_as(
        "SELECT id, actor_id, action, target_id, detail, ip_address, created_at FROM audit_logs
         WHERE ($1::TEXT IS NULL OR action = $1) AND ($2::BIGINT IS NULL OR actor_id = $2)
         ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    )
    .bind(action)
    .bind(actor_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
