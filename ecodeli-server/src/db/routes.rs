//! Deliverer planned routes

use shared::models::PlannedRoute;
use sqlx::PgPool;

use super::BoxError;

pub async fn insert(pool: &PgPool, r: &PlannedRoute) -> Result<(), BoxError> {
    sqlx::query(
        r#"
        INSERT INTO planned_routes (
            id, deliverer_id, departure_address, departure_latitude, departure_longitude,
            arrival_address, arrival_latitude, arrival_longitude, departure_time,
            available_capacity_m3, max_capacity_m3, corridor_km, is_active, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, TRUE, $13)
        "#,
    )
    .bind(r.id)
    .bind(r.deliverer_id)
    .bind(&r.departure_address)
    .bind(r.departure_latitude)
    .bind(r.departure_longitude)
    .bind(&r.arrival_address)
    .bind(r.arrival_latitude)
    .bind(r.arrival_longitude)
    .bind(r.departure_time)
    .bind(r.available_capacity_m3)
    .bind(r.max_capacity_m3)
    .bind(r.corridor_km)
    .bind(r.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find(pool: &PgPool, id: i64) -> Result<Option<PlannedRoute>, BoxError> {
    let row: Option<PlannedRoute> = sqlx::query_as("SELECT * FROM planned_routes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_by_deliverer(
    pool: &PgPool,
    deliverer_id: i64,
) -> Result<Vec<PlannedRoute>, BoxError> {
    let rows: Vec<PlannedRoute> = sqlx::query_as(
        "SELECT * FROM planned_routes WHERE deliverer_id = $1 AND is_active ORDER BY departure_time",
    )
    .bind(deliverer_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Active routes departing after `after`, optionally limited to some deliverers
pub async fn list_upcoming(
    pool: &PgPool,
    after: i64,
    deliverer_ids: Option<&[i64]>,
) -> Result<Vec<PlannedRoute>, BoxError> {
    let rows: Vec<PlannedRoute> = sqlx::query_as(
        "SELECT * FROM planned_routes
         WHERE is_active AND departure_time >= $1 AND ($2::BIGINT[] IS NULL OR deliverer_id = ANY($2))
         ORDER BY departure_time",
    )
    .bind(after)
    .bind(deliverer_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Soft delete; returns false when the route is not the deliverer's
pub async fn deactivate(pool: &PgPool, id: i64, deliverer_id: i64) -> Result<bool, BoxError> {
    let rows = sqlx::query(
        "UPDATE planned_routes SET is_active = FALSE WHERE id = $1 AND deliverer_id = $2 AND is_active",
    )
    .bind(id)
    .bind(deliverer_id)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}
