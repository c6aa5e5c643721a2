//! Role verification from approved documents

use shared::models::{NotificationKind, UserStatus, verification_summary};
use sqlx::PgConnection;

use crate::db;
use crate::error::ServiceResult;
use crate::services::notify;

/// Recompute whether a user holds every document their role requires and
/// move the account between PENDING_VERIFICATION and ACTIVE accordingly.
///
/// Suspended and inactive accounts keep their status; only the verified
/// flag follows the documents. Returns the new verified flag.
pub async fn reevaluate(conn: &mut PgConnection, user_id: i64, now: i64) -> ServiceResult<bool> {
    let Some(user) = db::users::find_for_update(&mut *conn, user_id).await? else {
        return Ok(false);
    };
    let (Some(role), Some(status)) = (user.role(), user.status()) else {
        tracing::warn!(user_id, role = %user.role, "User row with unknown role or status");
        return Ok(user.is_verified);
    };

    let documents = db::documents::list_by_user(&mut *conn, user_id).await?;
    let summary = verification_summary(role, &documents, now);

    let next_status = match status {
        UserStatus::PendingVerification if summary.verified => UserStatus::Active,
        UserStatus::Active if !summary.verified => UserStatus::PendingVerification,
        other => other,
    };

    if summary.verified == user.is_verified && next_status == status {
        return Ok(summary.verified);
    }

    db::users::set_status(&mut *conn, user_id, next_status, summary.verified, now).await?;
    tracing::info!(
        user_id,
        verified = summary.verified,
        status = %next_status,
        "User verification changed"
    );

    if summary.verified && !user.is_verified {
        notify::send(
            &mut *conn,
            user_id,
            NotificationKind::AccountVerified,
            "Account verified",
            "All your documents are approved, your account is now active.",
            None,
            now,
        )
        .await?;
    } else if !summary.verified && user.is_verified {
        let missing: Vec<&str> = summary.missing.iter().map(|d| d.as_db()).collect();
        notify::send(
            &mut *conn,
            user_id,
            NotificationKind::AccountVerified,
            "Verification required",
            format!("Please provide up-to-date documents: {}", missing.join(", ")),
            None,
            now,
        )
        .await?;
    }
    Ok(summary.verified)
}
