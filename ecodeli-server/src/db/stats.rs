//! Admin dashboard counters

use serde::Serialize;
use sqlx::PgPool;

use super::BoxError;

#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct PlatformStats {
    pub total_users: i64,
    pub pending_users: i64,
    pub open_announcements: i64,
    pub active_deliveries: i64,
    pub completed_deliveries: i64,
    pub held_amount: f64,
    pub released_amount: f64,
    pub platform_revenue: f64,
    pub pending_documents: i64,
    pub pending_withdrawals: i64,
    pub active_reservations: i64,
    pub upcoming_bookings: i64,
}

pub async fn platform_stats(pool: &PgPool, now: i64) -> Result<PlatformStats, BoxError> {
    let stats: PlatformStats = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS total_users,
            (SELECT COUNT(*) FROM users WHERE status = 'PENDING_VERIFICATION') AS pending_users,
            (SELECT COUNT(*) FROM announcements WHERE status = 'OPEN') AS open_announcements,
            (SELECT COUNT(*) FROM deliveries WHERE status NOT IN ('DELIVERED', 'CANCELLED', 'RETURNED')) AS active_deliveries,
            (SELECT COUNT(*) FROM deliveries WHERE status = 'DELIVERED') AS completed_deliveries,
            (SELECT COALESCE(SUM(amount), 0)::DOUBLE PRECISION FROM payments WHERE status IN ('HELD', 'DISPUTED')) AS held_amount,
            (SELECT COALESCE(SUM(payee_amount), 0)::DOUBLE PRECISION FROM payments WHERE status = 'RELEASED') AS released_amount,
            (SELECT COALESCE(SUM(platform_fee), 0)::DOUBLE PRECISION FROM payments WHERE status = 'RELEASED') AS platform_revenue,
            (SELECT COUNT(*) FROM documents WHERE status = 'PENDING') AS pending_documents,
            (SELECT COUNT(*) FROM withdrawals WHERE status IN ('PENDING', 'PROCESSING')) AS pending_withdrawals,
            (SELECT COUNT(*) FROM reservations WHERE status IN ('ACTIVE', 'EXTENDED')) AS active_reservations,
            (SELECT COUNT(*) FROM bookings WHERE status IN ('PENDING', 'CONFIRMED', 'RESCHEDULED') AND start_at >= $1) AS upcoming_bookings
        "#,
    )
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(stats)
}
