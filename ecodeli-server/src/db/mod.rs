//! Database access layer
//!
//! Single-statement functions take any executor (`&PgPool` or `&mut *tx`);
//! multi-statement ones take a `&mut PgConnection` so callers decide the
//! transaction boundary.

pub mod announcements;
pub mod audit;
pub mod deliveries;
pub mod documents;
pub mod notifications;
pub mod payments;
pub mod reviews;
pub mod routes;
pub mod services;
pub mod stats;
pub mod storage;
pub mod users;
pub mod wallets;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// True when the error is a unique-constraint violation
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.kind() == sqlx::error::ErrorKind::UniqueViolation)
}
