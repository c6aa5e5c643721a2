//! Announcements and deliverer applications

use shared::models::{
    Announcement, AnnouncementStatus, AnnouncementType, Application, ApplicationStatus,
    UpdateAnnouncementRequest,
};
use sqlx::{PgConnection, PgPool};

use super::BoxError;

pub async fn insert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    a: &Announcement,
) -> Result<(), BoxError> {
    sqlx::query(
        r#"
        INSERT INTO announcements (
            id, client_id, title, description, announcement_type, status, priority,
            pickup_address, pickup_latitude, pickup_longitude,
            delivery_address, delivery_latitude, delivery_longitude,
            pickup_date, delivery_date, weight_kg, length_cm, width_cm, height_cm,
            fragile, requires_cooling, suggested_price, final_price, negotiable,
            distance_km, deliverer_id, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $27)
        "#,
    )
    .bind(a.id)
    .bind(a.client_id)
    .bind(&a.title)
    .bind(&a.description)
    .bind(&a.announcement_type)
    .bind(&a.status)
    .bind(&a.priority)
    .bind(&a.pickup_address)
    .bind(a.pickup_latitude)
    .bind(a.pickup_longitude)
    .bind(&a.delivery_address)
    .bind(a.delivery_latitude)
    .bind(a.delivery_longitude)
    .bind(a.pickup_date)
    .bind(a.delivery_date)
    .bind(a.weight_kg)
    .bind(a.length_cm)
    .bind(a.width_cm)
    .bind(a.height_cm)
    .bind(a.fragile)
    .bind(a.requires_cooling)
    .bind(a.suggested_price)
    .bind(a.final_price)
    .bind(a.negotiable)
    .bind(a.distance_km)
    .bind(a.deliverer_id)
    .bind(a.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Announcement>, BoxError> {
    let row: Option<Announcement> = sqlx::query_as("SELECT * FROM announcements WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn find_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Announcement>, BoxError> {
    let row: Option<Announcement> =
        sqlx::query_as("SELECT * FROM announcements WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(row)
}

/// Status/type filtered page; the radius filter runs on the caller side
pub async fn list(
    pool: &PgPool,
    status: Option<AnnouncementStatus>,
    announcement_type: Option<AnnouncementType>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Announcement>, BoxError> {
    let rows: Vec<Announcement> = sqlx::query_as(
        "SELECT * FROM announcements
         WHERE ($1::TEXT IS NULL OR status = $1) AND ($2::TEXT IS NULL OR announcement_type = $2)
         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
    )
    .bind(status.map(|s| s.as_db()))
    .bind(announcement_type.map(|t| t.as_db()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_by_client(pool: &PgPool, client_id: i64) -> Result<Vec<Announcement>, BoxError> {
    let rows: Vec<Announcement> = sqlx::query_as(
        "SELECT * FROM announcements WHERE client_id = $1 ORDER BY created_at DESC",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Update editable fields of an OPEN announcement
pub async fn update(
    pool: &PgPool,
    id: i64,
    req: &UpdateAnnouncementRequest,
    now: i64,
) -> Result<Option<Announcement>, BoxError> {
    let row: Option<Announcement> = sqlx::query_as(
        "UPDATE announcements SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            priority = COALESCE($4, priority),
            pickup_date = COALESCE($5, pickup_date),
            delivery_date = COALESCE($6, delivery_date),
            suggested_price = COALESCE($7, suggested_price),
            negotiable = COALESCE($8, negotiable),
            updated_at = $9
         WHERE id = $1 AND status = 'OPEN' RETURNING *",
    )
    .bind(id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.priority.map(|p| p.as_db()))
    .bind(req.pickup_date)
    .bind(req.delivery_date)
    .bind(req.price)
    .bind(req.negotiable)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn set_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: AnnouncementStatus,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE announcements SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(status.as_db())
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn assign(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    deliverer_id: i64,
    final_price: f64,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE announcements SET status = 'ASSIGNED', deliverer_id = $2, final_price = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(deliverer_id)
    .bind(final_price)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Back to OPEN after the assigned deliverer dropped out
pub async fn reopen(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE announcements SET status = 'OPEN', deliverer_id = NULL, final_price = NULL, updated_at = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

// ── Applications ──

pub async fn insert_application(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    app: &Application,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO applications (id, announcement_id, deliverer_id, proposed_price, message, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
    )
    .bind(app.id)
    .bind(app.announcement_id)
    .bind(app.deliverer_id)
    .bind(app.proposed_price)
    .bind(&app.message)
    .bind(&app.status)
    .bind(app.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_application_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Application>, BoxError> {
    let row: Option<Application> =
        sqlx::query_as("SELECT * FROM applications WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(row)
}

pub async fn list_applications(
    pool: &PgPool,
    announcement_id: i64,
) -> Result<Vec<Application>, BoxError> {
    let rows: Vec<Application> = sqlx::query_as(
        "SELECT * FROM applications WHERE announcement_id = $1 ORDER BY created_at",
    )
    .bind(announcement_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_applications_by_deliverer(
    pool: &PgPool,
    deliverer_id: i64,
) -> Result<Vec<Application>, BoxError> {
    let rows: Vec<Application> = sqlx::query_as(
        "SELECT * FROM applications WHERE deliverer_id = $1 ORDER BY created_at DESC",
    )
    .bind(deliverer_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn has_pending_application(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    announcement_id: i64,
    deliverer_id: i64,
) -> Result<bool, BoxError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM applications WHERE announcement_id = $1 AND deliverer_id = $2 AND status = 'PENDING')",
    )
    .bind(announcement_id)
    .bind(deliverer_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

pub async fn set_application_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: ApplicationStatus,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE applications SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(status.as_db())
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

/// Reject every other pending application once one is accepted
pub async fn reject_other_applications(
    conn: &mut PgConnection,
    announcement_id: i64,
    accepted_id: i64,
    now: i64,
) -> Result<Vec<i64>, BoxError> {
    let rejected: Vec<i64> = sqlx::query_scalar(
        "UPDATE applications SET status = 'REJECTED', updated_at = $3
         WHERE announcement_id = $1 AND id <> $2 AND status = 'PENDING'
         RETURNING deliverer_id",
    )
    .bind(announcement_id)
    .bind(accepted_id)
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rejected)
}
