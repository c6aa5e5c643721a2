//! Provider services, availability windows and bookings

use shared::models::{
    Availability, Booking, BookingStatus, Service, ServiceSearchQuery, ServiceUpdate,
};
use sqlx::PgPool;

use super::BoxError;

pub async fn insert_service(pool: &PgPool, s: &Service) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO services (id, provider_id, name, description, category, price, duration_minutes, is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $8)",
    )
    .bind(s.id)
    .bind(s.provider_id)
    .bind(&s.name)
    .bind(&s.description)
    .bind(&s.category)
    .bind(s.price)
    .bind(s.duration_minutes)
    .bind(s.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_service(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Service>, BoxError> {
    let row: Option<Service> = sqlx::query_as("SELECT * FROM services WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn update_service(
    pool: &PgPool,
    id: i64,
    req: &ServiceUpdate,
    now: i64,
) -> Result<Option<Service>, BoxError> {
    let row: Option<Service> = sqlx::query_as(
        "UPDATE services SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            price = COALESCE($5, price),
            duration_minutes = COALESCE($6, duration_minutes),
            is_active = COALESCE($7, is_active),
            updated_at = $8
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.category)
    .bind(req.price)
    .bind(req.duration_minutes)
    .bind(req.is_active)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn search_services(
    pool: &PgPool,
    q: &ServiceSearchQuery,
) -> Result<Vec<Service>, BoxError> {
    let pattern = q.q.as_deref().map(|text| format!("%{}%", text.to_lowercase()));
    let rows: Vec<Service> = sqlx::query_as(
        "SELECT * FROM services
         WHERE is_active
           AND ($1::TEXT IS NULL OR category = $1)
           AND ($2::TEXT IS NULL OR LOWER(name) LIKE $2 OR LOWER(COALESCE(description, '')) LIKE $2)
           AND ($3::DOUBLE PRECISION IS NULL OR price <= $3)
           AND ($4::BIGINT IS NULL OR provider_id = $4)
         ORDER BY price, name",
    )
    .bind(&q.category)
    .bind(pattern)
    .bind(q.max_price)
    .bind(q.provider_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ── Availability ──

pub async fn insert_availability(pool: &PgPool, a: &Availability) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO availabilities (id, provider_id, day_of_week, start_time, end_time, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(a.id)
    .bind(a.provider_id)
    .bind(a.day_of_week)
    .bind(&a.start_time)
    .bind(&a.end_time)
    .bind(a.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_availability(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    provider_id: i64,
    day_of_week: Option<i32>,
) -> Result<Vec<Availability>, BoxError> {
    let rows: Vec<Availability> = sqlx::query_as(
        "SELECT * FROM availabilities
         WHERE provider_id = $1 AND ($2::INTEGER IS NULL OR day_of_week = $2)
         ORDER BY day_of_week, start_time",
    )
    .bind(provider_id)
    .bind(day_of_week)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn delete_availability(
    pool: &PgPool,
    id: i64,
    provider_id: i64,
) -> Result<bool, BoxError> {
    let rows = sqlx::query("DELETE FROM availabilities WHERE id = $1 AND provider_id = $2")
        .bind(id)
        .bind(provider_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows > 0)
}

// ── Bookings ──

pub async fn insert_booking(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    b: &Booking,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO bookings (id, service_id, client_id, provider_id, start_at, end_at, status, total_price, notes, payment_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
    )
    .bind(b.id)
    .bind(b.service_id)
    .bind(b.client_id)
    .bind(b.provider_id)
    .bind(b.start_at)
    .bind(b.end_at)
    .bind(&b.status)
    .bind(b.total_price)
    .bind(&b.notes)
    .bind(b.payment_id)
    .bind(b.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_booking(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Booking>, BoxError> {
    let row: Option<Booking> = sqlx::query_as("SELECT * FROM bookings WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn find_booking_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Booking>, BoxError> {
    let row: Option<Booking> = sqlx::query_as("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn list_bookings_for_user(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<Booking>, BoxError> {
    let rows: Vec<Booking> = sqlx::query_as(
        "SELECT * FROM bookings WHERE client_id = $1 OR provider_id = $1 ORDER BY start_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Calendar-blocking bookings of a provider intersecting [from, to)
pub async fn busy_intervals(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    provider_id: i64,
    from: i64,
    to: i64,
    exclude: Option<i64>,
) -> Result<Vec<(i64, i64)>, BoxError> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT start_at, end_at FROM bookings
         WHERE provider_id = $1 AND status IN ('PENDING', 'CONFIRMED', 'RESCHEDULED')
           AND start_at < $3 AND end_at > $2
           AND ($4::BIGINT IS NULL OR id <> $4)",
    )
    .bind(provider_id)
    .bind(from)
    .bind(to)
    .bind(exclude)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn set_booking_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: BookingStatus,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(status.as_db())
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_booking_payment(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    payment_id: i64,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query("UPDATE bookings SET payment_id = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(payment_id)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn reschedule_booking(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    start_at: i64,
    end_at: i64,
    now: i64,
) -> Result<Booking, BoxError> {
    let row: Booking = sqlx::query_as(
        "UPDATE bookings SET start_at = $2, end_at = $3, status = 'RESCHEDULED', updated_at = $4
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(start_at)
    .bind(end_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(row)
}
