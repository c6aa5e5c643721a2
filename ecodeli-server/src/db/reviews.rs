//! Reviews and rating aggregates

use shared::matching::ClientPreferences;
use shared::models::Review;
use sqlx::PgPool;

use super::BoxError;

/// Insert a review; a second review of the same booking or delivery
/// surfaces as a unique violation
pub async fn insert(pool: &PgPool, r: &Review) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO reviews (id, author_id, target_id, booking_id, delivery_id, rating, punctuality, quality,
            communication, value_for_money, comment, would_recommend, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(r.id)
    .bind(r.author_id)
    .bind(r.target_id)
    .bind(r.booking_id)
    .bind(r.delivery_id)
    .bind(r.rating)
    .bind(r.punctuality)
    .bind(r.quality)
    .bind(r.communication)
    .bind(r.value_for_money)
    .bind(&r.comment)
    .bind(r.would_recommend)
    .bind(r.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_for_target(pool: &PgPool, target_id: i64) -> Result<Vec<Review>, BoxError> {
    let rows: Vec<Review> = sqlx::query_as(
        "SELECT * FROM reviews WHERE target_id = $1 ORDER BY created_at DESC",
    )
    .bind(target_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Average rating per target
pub async fn average_ratings(
    pool: &PgPool,
    target_ids: &[i64],
) -> Result<Vec<(i64, f64)>, BoxError> {
    let rows: Vec<(i64, f64)> = sqlx::query_as(
        "SELECT target_id, AVG(rating)::DOUBLE PRECISION FROM reviews
         WHERE target_id = ANY($1) GROUP BY target_id",
    )
    .bind(target_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Last `per_target` ratings of each target, newest first
pub async fn recent_ratings(
    pool: &PgPool,
    target_ids: &[i64],
    per_target: i64,
) -> Result<Vec<(i64, i32)>, BoxError> {
    let rows: Vec<(i64, i32)> = sqlx::query_as(
        "SELECT target_id, rating FROM (
            SELECT target_id, rating, created_at,
                   ROW_NUMBER() OVER (PARTITION BY target_id ORDER BY created_at DESC) AS rn
            FROM reviews WHERE target_id = ANY($1)
         ) ranked
         WHERE rn <= $2
         ORDER BY target_id, created_at DESC",
    )
    .bind(target_ids)
    .bind(per_target)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Mean rating a user received, None without reviews
pub async fn average_for(pool: &PgPool, target_id: i64) -> Result<Option<f64>, BoxError> {
    let avg: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(rating)::DOUBLE PRECISION FROM reviews WHERE target_id = $1",
    )
    .bind(target_id)
    .fetch_one(pool)
    .await?;
    Ok(avg)
}

/// Deliverers the client rated well (preferred) or badly (blacklisted)
pub async fn client_preferences(pool: &PgPool, client_id: i64) -> Result<ClientPreferences, BoxError> {
    let rows: Vec<(i64, f64, bool)> = sqlx::query_as(
        "SELECT r.target_id, AVG(r.rating)::DOUBLE PRECISION, BOOL_AND(r.would_recommend)
         FROM reviews r
         WHERE r.author_id = $1 AND r.delivery_id IS NOT NULL
         GROUP BY r.target_id",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    let mut prefs = ClientPreferences::default();
    for (deliverer_id, avg, recommended) in rows {
        if avg >= 4.0 && recommended {
            prefs.preferred_deliverers.push(deliverer_id);
        } else if avg <= 2.0 {
            prefs.blacklisted_deliverers.push(deliverer_id);
        }
    }
    Ok(prefs)
}
