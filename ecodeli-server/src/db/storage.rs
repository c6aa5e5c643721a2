//! Warehouses, boxes, reservations and box access log

use shared::models::{
    BoxSearchQuery, BoxUpdate, BoxUsage, ExtensionStatus, Reservation, ReservationExtension,
    ReservationStatus, StorageBox, Warehouse,
};
use sqlx::PgPool;

use super::BoxError;

// ── Warehouses ──

pub async fn insert_warehouse(pool: &PgPool, w: &Warehouse) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO warehouses (id, name, address, city, latitude, longitude, is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)",
    )
    .bind(w.id)
    .bind(&w.name)
    .bind(&w.address)
    .bind(&w.city)
    .bind(w.latitude)
    .bind(w.longitude)
    .bind(w.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_warehouse(pool: &PgPool, id: i64) -> Result<Option<Warehouse>, BoxError> {
    let row: Option<Warehouse> = sqlx::query_as("SELECT * FROM warehouses WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_warehouses(pool: &PgPool) -> Result<Vec<Warehouse>, BoxError> {
    let rows: Vec<Warehouse> =
        sqlx::query_as("SELECT * FROM warehouses WHERE is_active ORDER BY city, name")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

// ── Boxes ──

pub async fn insert_box(pool: &PgPool, b: &StorageBox) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO storage_boxes (id, warehouse_id, box_number, size_m3, box_type, features, price_per_day, is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8)",
    )
    .bind(b.id)
    .bind(b.warehouse_id)
    .bind(&b.box_number)
    .bind(b.size_m3)
    .bind(&b.box_type)
    .bind(&b.features)
    .bind(b.price_per_day)
    .bind(b.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_box(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<StorageBox>, BoxError> {
    let row: Option<StorageBox> = sqlx::query_as("SELECT * FROM storage_boxes WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Lock the box row so concurrent reservations of it serialize
pub async fn find_box_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<StorageBox>, BoxError> {
    let row: Option<StorageBox> =
        sqlx::query_as("SELECT * FROM storage_boxes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(row)
}

pub async fn update_box(
    pool: &PgPool,
    id: i64,
    req: &BoxUpdate,
) -> Result<Option<StorageBox>, BoxError> {
    let row: Option<StorageBox> = sqlx::query_as(
        "UPDATE storage_boxes SET
            price_per_day = COALESCE($2, price_per_day),
            features = COALESCE($3, features),
            is_active = COALESCE($4, is_active)
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(req.price_per_day)
    .bind(&req.features)
    .bind(req.is_active)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Active boxes matching the filters. When a period is given, boxes with
/// a blocking reservation touching it are excluded.
pub async fn search_boxes(pool: &PgPool, q: &BoxSearchQuery) -> Result<Vec<StorageBox>, BoxError> {
    let period = q.start_date.zip(q.end_date);
    let rows: Vec<StorageBox> = sqlx::query_as(
        r#"
        SELECT b.* FROM storage_boxes b
        JOIN warehouses w ON w.id = b.warehouse_id
        WHERE b.is_active AND w.is_active
          AND ($1::BIGINT IS NULL OR b.warehouse_id = $1)
          AND ($2::TEXT IS NULL OR LOWER(w.city) = LOWER($2))
          AND ($3::DOUBLE PRECISION IS NULL OR b.size_m3 >= $3)
          AND ($4::DOUBLE PRECISION IS NULL OR b.size_m3 <= $4)
          AND ($5::DOUBLE PRECISION IS NULL OR b.price_per_day <= $5)
          AND ($6::TEXT IS NULL OR b.box_type = $6)
          AND b.features @> $7::TEXT[]
          AND ($8::BIGINT IS NULL OR NOT EXISTS (
                SELECT 1 FROM reservations r
                WHERE r.box_id = b.id
                  AND r.status IN ('PENDING', 'ACTIVE', 'EXTENDED')
                  AND r.start_date <= $9 AND r.end_date >= $8
          ))
        ORDER BY b.price_per_day, b.size_m3
        "#,
    )
    .bind(q.warehouse_id)
    .bind(&q.city)
    .bind(q.min_size_m3)
    .bind(q.max_size_m3)
    .bind(q.max_price_per_day)
    .bind(q.box_type.map(|t| t.as_db()))
    .bind(q.feature_list())
    .bind(period.map(|(start, _)| start))
    .bind(period.map(|(_, end)| end))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Any blocking reservation of the box overlapping [start, end], bounds
/// included. `exclude` skips the reservation being extended.
pub async fn has_conflict(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    box_id: i64,
    start: i64,
    end: i64,
    exclude: Option<i64>,
) -> Result<bool, BoxError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM reservations
            WHERE box_id = $1 AND status IN ('PENDING', 'ACTIVE', 'EXTENDED')
              AND start_date <= $3 AND end_date >= $2
              AND ($4::BIGINT IS NULL OR id <> $4)
         )",
    )
    .bind(box_id)
    .bind(start)
    .bind(end)
    .bind(exclude)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

// ── Reservations ──

pub async fn insert_reservation(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    r: &Reservation,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO reservations (id, box_id, client_id, start_date, end_date, status, total_price, access_code, extended_count, payment_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $10, $10)",
    )
    .bind(r.id)
    .bind(r.box_id)
    .bind(r.client_id)
    .bind(r.start_date)
    .bind(r.end_date)
    .bind(&r.status)
    .bind(r.total_price)
    .bind(&r.access_code)
    .bind(r.payment_id)
    .bind(r.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_reservation(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Reservation>, BoxError> {
    let row: Option<Reservation> = sqlx::query_as("SELECT * FROM reservations WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn find_reservation_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Reservation>, BoxError> {
    let row: Option<Reservation> =
        sqlx::query_as("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(row)
}

pub async fn list_reservations_by_client(
    pool: &PgPool,
    client_id: i64,
) -> Result<Vec<Reservation>, BoxError> {
    let rows: Vec<Reservation> = sqlx::query_as(
        "SELECT * FROM reservations WHERE client_id = $1 ORDER BY start_date DESC",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Completed reservations of a client, drives the loyalty discount
pub async fn count_completed(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    client_id: i64,
) -> Result<i64, BoxError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reservations WHERE client_id = $1 AND status = 'COMPLETED'",
    )
    .bind(client_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

pub async fn set_reservation_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: ReservationStatus,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE reservations SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(status.as_db())
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_reservation_payment(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    payment_id: i64,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE reservations SET payment_id = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(payment_id)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn extend_reservation(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    new_end: i64,
    extra_price: f64,
    now: i64,
) -> Result<Reservation, BoxError> {
    let row: Reservation = sqlx::query_as(
        "UPDATE reservations SET end_date = $2, total_price = total_price + $3,
            extended_count = extended_count + 1, status = 'EXTENDED', updated_at = $4
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(new_end)
    .bind(extra_price)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

// ── Extensions ──

pub async fn insert_extension(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    e: &ReservationExtension,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO reservation_extensions
            (id, reservation_id, payment_id, previous_end_date, new_end_date, extra_price,
             status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(e.id)
    .bind(e.reservation_id)
    .bind(e.payment_id)
    .bind(e.previous_end_date)
    .bind(e.new_end_date)
    .bind(e.extra_price)
    .bind(&e.status)
    .bind(e.created_at)
    .bind(e.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_extension_by_payment_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    payment_id: i64,
) -> Result<Option<ReservationExtension>, BoxError> {
    let row = sqlx::query_as("SELECT * FROM reservation_extensions WHERE payment_id = $1 FOR UPDATE")
        .bind(payment_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn has_unpaid_extension(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    reservation_id: i64,
) -> Result<bool, BoxError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM reservation_extensions
                       WHERE reservation_id = $1 AND status = 'PENDING')",
    )
    .bind(reservation_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

/// PENDING extensions opened before `created_before`
pub async fn list_unpaid_extensions(
    pool: &PgPool,
    created_before: i64,
) -> Result<Vec<ReservationExtension>, BoxError> {
    let rows = sqlx::query_as(
        "SELECT * FROM reservation_extensions
         WHERE status = 'PENDING' AND created_at < $1 ORDER BY created_at",
    )
    .bind(created_before)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_extension_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: ExtensionStatus,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE reservation_extensions SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(status.as_db())
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

/// Put back the end date and price from before `e`. The status falls
/// back to ACTIVE when no other extension remains.
pub async fn revert_extension(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    e: &ReservationExtension,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE reservations SET end_date = $2,
            total_price = GREATEST(total_price - $3, 0),
            extended_count = GREATEST(extended_count - 1, 0),
            status = CASE WHEN extended_count > 1 THEN 'EXTENDED' ELSE 'ACTIVE' END,
            updated_at = $4
         WHERE id = $1 AND status IN ('ACTIVE', 'EXTENDED')",
    )
    .bind(e.reservation_id)
    .bind(e.previous_end_date)
    .bind(e.extra_price)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Close reservations whose period ended before `now`, returns them
pub async fn complete_expired(pool: &PgPool, now: i64) -> Result<Vec<Reservation>, BoxError> {
    let rows: Vec<Reservation> = sqlx::query_as(
        "UPDATE reservations SET status = 'COMPLETED', updated_at = $1
         WHERE status IN ('ACTIVE', 'EXTENDED') AND end_date < $1
         RETURNING *",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Ids of PENDING reservations created before `created_before`
pub async fn list_stale_pending(pool: &PgPool, created_before: i64) -> Result<Vec<i64>, BoxError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM reservations WHERE status = 'PENDING' AND created_at < $1 ORDER BY created_at",
    )
    .bind(created_before)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

// ── Access log ──

pub async fn insert_usage(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    u: &BoxUsage,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO box_usages (id, reservation_id, box_id, action, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(u.id)
    .bind(u.reservation_id)
    .bind(u.box_id)
    .bind(&u.action)
    .bind(u.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_usages(pool: &PgPool, reservation_id: i64) -> Result<Vec<BoxUsage>, BoxError> {
    let rows: Vec<BoxUsage> = sqlx::query_as(
        "SELECT * FROM box_usages WHERE reservation_id = $1 ORDER BY created_at DESC",
    )
    .bind(reservation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
