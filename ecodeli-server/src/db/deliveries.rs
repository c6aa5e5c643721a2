//! Deliveries, tracking events and positions

use shared::models::{Delivery, DeliveryPosition, DeliveryStatus, TrackingEvent};
use sqlx::PgPool;

use super::BoxError;

pub async fn insert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    d: &Delivery,
) -> Result<(), BoxError> {
    sqlx::query(
        r#"
        INSERT INTO deliveries (
            id, announcement_id, client_id, deliverer_id, status, tracking_code, validation_code,
            price, pickup_latitude, pickup_longitude, delivery_latitude, delivery_longitude,
            failed_validation_attempts, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0, $13, $13)
        "#,
    )
    .bind(d.id)
    .bind(d.announcement_id)
    .bind(d.client_id)
    .bind(d.deliverer_id)
    .bind(&d.status)
    .bind(&d.tracking_code)
    .bind(&d.validation_code)
    .bind(d.price)
    .bind(d.pickup_latitude)
    .bind(d.pickup_longitude)
    .bind(d.delivery_latitude)
    .bind(d.delivery_longitude)
    .bind(d.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Delivery>, BoxError> {
    let row: Option<Delivery> = sqlx::query_as("SELECT * FROM deliveries WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn find_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Delivery>, BoxError> {
    let row: Option<Delivery> =
        sqlx::query_as("SELECT * FROM deliveries WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(row)
}

pub async fn find_by_tracking_code(
    pool: &PgPool,
    code: &str,
) -> Result<Option<Delivery>, BoxError> {
    let row: Option<Delivery> = sqlx::query_as("SELECT * FROM deliveries WHERE tracking_code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// The delivery of an announcement that has not been cancelled
pub async fn find_open_for_announcement(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    announcement_id: i64,
) -> Result<Option<Delivery>, BoxError> {
    let row: Option<Delivery> = sqlx::query_as(
        "SELECT * FROM deliveries WHERE announcement_id = $1 AND status NOT IN ('CANCELLED', 'DELIVERED')
         ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
    )
    .bind(announcement_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: i64,
    status: Option<DeliveryStatus>,
) -> Result<Vec<Delivery>, BoxError> {
    let rows: Vec<Delivery> = sqlx::query_as(
        "SELECT * FROM deliveries
         WHERE (client_id = $1 OR deliverer_id = $1) AND ($2::TEXT IS NULL OR status = $2)
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(status.map(|s| s.as_db()))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Move to `status`, stamping pickup and delivery times on the way
pub async fn set_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: DeliveryStatus,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE deliveries SET
            status = $2,
            picked_up_at = CASE WHEN $2 = 'PICKED_UP' THEN $3 ELSE picked_up_at END,
            delivered_at = CASE WHEN $2 = 'DELIVERED' THEN $3 ELSE delivered_at END,
            updated_at = $3
         WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_db())
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn mark_validated(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    proof_photo_url: Option<&str>,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE deliveries SET status = 'DELIVERED', delivered_at = $3, validated_at = $3,
            proof_photo_url = COALESCE($2, proof_photo_url), updated_at = $3
         WHERE id = $1",
    )
    .bind(id)
    .bind(proof_photo_url)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Count a wrong validation code, returns the new total
pub async fn record_failed_validation(pool: &PgPool, id: i64, now: i64) -> Result<i32, BoxError> {
    let attempts: i32 = sqlx::query_scalar(
        "UPDATE deliveries SET failed_validation_attempts = failed_validation_attempts + 1, updated_at = $2
         WHERE id = $1 RETURNING failed_validation_attempts",
    )
    .bind(id)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(attempts)
}

/// Completed deliveries per deliverer
pub async fn completed_counts(
    pool: &PgPool,
    deliverer_ids: &[i64],
) -> Result<Vec<(i64, i64)>, BoxError> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT deliverer_id, COUNT(*) FROM deliveries
         WHERE deliverer_id = ANY($1) AND status = 'DELIVERED' GROUP BY deliverer_id",
    )
    .bind(deliverer_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ── Tracking ──

pub async fn insert_event(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    e: &TrackingEvent,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO tracking_events (id, delivery_id, status, note, latitude, longitude, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(e.id)
    .bind(e.delivery_id)
    .bind(&e.status)
    .bind(&e.note)
    .bind(e.latitude)
    .bind(e.longitude)
    .bind(e.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_events(pool: &PgPool, delivery_id: i64) -> Result<Vec<TrackingEvent>, BoxError> {
    let rows: Vec<TrackingEvent> = sqlx::query_as(
        "SELECT * FROM tracking_events WHERE delivery_id = $1 ORDER BY created_at",
    )
    .bind(delivery_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn insert_position(pool: &PgPool, p: &DeliveryPosition) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO delivery_positions (delivery_id, latitude, longitude, recorded_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(p.delivery_id)
    .bind(p.latitude)
    .bind(p.longitude)
    .bind(p.recorded_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn latest_position(
    pool: &PgPool,
    delivery_id: i64,
) -> Result<Option<DeliveryPosition>, BoxError> {
    let row: Option<DeliveryPosition> = sqlx::query_as(
        "SELECT delivery_id, latitude, longitude, recorded_at FROM delivery_positions
         WHERE delivery_id = $1 ORDER BY recorded_at DESC LIMIT 1",
    )
    .bind(delivery_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
