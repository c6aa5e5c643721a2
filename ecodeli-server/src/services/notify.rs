//! In-app notification writer

use shared::models::{Notification, NotificationKind};
use shared::util::snowflake_id;

use crate::db::{self, BoxError};

/// Queue a notification for `user_id`. Runs on the caller's executor so
/// it commits or rolls back with the change it reports.
pub async fn send(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    user_id: i64,
    kind: NotificationKind,
    title: &str,
    body: impl Into<String>,
    reference_id: Option<i64>,
    now: i64,
) -> Result<(), BoxError> {
    let notification = Notification {
        id: snowflake_id(),
        user_id,
        kind: kind.as_db().to_string(),
        title: title.to_string(),
        body: body.into(),
        reference_id,
        is_read: false,
        created_at: now,
    };
    db::notifications::insert(conn, &notification).await
}
