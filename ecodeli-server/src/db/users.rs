//! Users and deliverer profiles

use shared::models::{
    DelivererProfile, DelivererProfileUpdate, UpdateProfileRequest, User, UserRole, UserStatus,
};
use sqlx::PgPool;

use super::BoxError;

pub async fn insert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    user: &User,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, phone, role, status, is_verified, latitude, longitude, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.name)
    .bind(&user.phone)
    .bind(&user.role)
    .bind(&user.status)
    .bind(user.is_verified)
    .bind(user.latitude)
    .bind(user.longitude)
    .bind(user.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_by_id(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<User>, BoxError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(user)
}

/// Lock the user row; serializes bookings against one provider
pub async fn find_for_update(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<User>, BoxError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(user)
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, BoxError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn update_profile(
    pool: &PgPool,
    id: i64,
    req: &UpdateProfileRequest,
    now: i64,
) -> Result<Option<User>, BoxError> {
    let user: Option<User> = sqlx::query_as(
        "UPDATE users SET
            name = COALESCE($2, name),
            phone = COALESCE($3, phone),
            latitude = COALESCE($4, latitude),
            longitude = COALESCE($5, longitude),
            updated_at = $6
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.phone)
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn set_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: UserStatus,
    is_verified: bool,
    now: i64,
) -> Result<u64, BoxError> {
    let rows = sqlx::query(
        "UPDATE users SET status = $2, is_verified = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_db())
    .bind(is_verified)
    .bind(now)
    .execute(conn)
    .await?
    .rows_affected();
    Ok(rows)
}

pub async fn list(
    pool: &PgPool,
    role: Option<UserRole>,
    status: Option<UserStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<User>, BoxError> {
    let users: Vec<User> = sqlx::query_as(
        "SELECT * FROM users
         WHERE ($1::TEXT IS NULL OR role = $1) AND ($2::TEXT IS NULL OR status = $2)
         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
    )
    .bind(role.map(|r| r.as_db()))
    .bind(status.map(|s| s.as_db()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(users)
}

/// Verified, active deliverers: the matching candidate pool
pub async fn list_active_deliverers(pool: &PgPool) -> Result<Vec<User>, BoxError> {
    let users: Vec<User> = sqlx::query_as(
        "SELECT * FROM users WHERE role = 'DELIVERER' AND status = 'ACTIVE' AND is_verified",
    )
    .fetch_all(pool)
    .await?;
    Ok(users)
}

pub async fn upsert_deliverer_profile(
    pool: &PgPool,
    user_id: i64,
    req: &DelivererProfileUpdate,
    now: i64,
) -> Result<DelivererProfile, BoxError> {
    let profile: DelivererProfile = sqlx::query_as(
        "INSERT INTO deliverer_profiles (user_id, vehicle_type, max_weight_kg, max_volume_m3, careful_handling, refrigerated, accepts_negotiation, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (user_id) DO UPDATE SET
            vehicle_type = EXCLUDED.vehicle_type,
            max_weight_kg = EXCLUDED.max_weight_kg,
            max_volume_m3 = EXCLUDED.max_volume_m3,
            careful_handling = EXCLUDED.careful_handling,
            refrigerated = EXCLUDED.refrigerated,
            accepts_negotiation = EXCLUDED.accepts_negotiation,
            updated_at = EXCLUDED.updated_at
         RETURNING *",
    )
    .bind(user_id)
    .bind(&req.vehicle_type)
    .bind(req.max_weight_kg)
    .bind(req.max_volume_m3)
    .bind(req.careful_handling)
    .bind(req.refrigerated)
    .bind(req.accepts_negotiation)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(profile)
}

pub async fn find_deliverer_profile(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<DelivererProfile>, BoxError> {
    let profile: Option<DelivererProfile> = sqlx::query_as("SELECT * FROM deliverer_profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(profile)
}

pub async fn list_deliverer_profiles(
    pool: &PgPool,
    user_ids: &[i64],
) -> Result<Vec<DelivererProfile>, BoxError> {
    let profiles: Vec<DelivererProfile> = sqlx::query_as("SELECT * FROM deliverer_profiles WHERE user_id = ANY($1)")
        .bind(user_ids)
        .fetch_all(pool)
        .await?;
    Ok(profiles)
}
