//! Reservation follow-ups of storage payments

use shared::error::{AppError, ErrorCode};
use shared::models::{
    EscrowStatus, ExtensionStatus, NotificationKind, PaymentKind, ReservationExtension,
    ReservationStatus, StoragePaymentEffect,
};
use sqlx::PgConnection;

use crate::db;
use crate::error::ServiceResult;
use crate::services::{escrow, notify};
use crate::state::AppState;

/// Restore the end date and price from before an unpaid extension
pub async fn undo_extension(
    conn: &mut PgConnection,
    extension: &ReservationExtension,
    client_id: i64,
    now: i64,
) -> ServiceResult<()> {
    db::storage::revert_extension(&mut *conn, extension, now).await?;
    db::storage::set_extension_status(&mut *conn, extension.id, ExtensionStatus::Reverted, now).await?;
    notify::send(
        &mut *conn,
        client_id,
        NotificationKind::ReservationUpdate,
        "Extension cancelled",
        "The extension was not paid, your reservation keeps its previous end date.",
        Some(extension.reservation_id),
        now,
    )
    .await?;
    tracing::info!(
        reservation_id = extension.reservation_id,
        payment_id = extension.payment_id,
        "Unpaid extension reverted"
    );
    Ok(())
}

/// Cancel a reservation nobody paid for. The intent is voided before the
/// reservation changes, so a failed void leaves both untouched for the
/// next attempt. Returns false when the reservation is no longer PENDING
/// or its payment went through meanwhile.
pub async fn drop_unpaid_reservation(state: &AppState, reservation_id: i64, now: i64) -> ServiceResult<bool> {
    let mut tx = state.pool.begin().await?;
    let Some(reservation) = db::storage::find_reservation_for_update(&mut *tx, reservation_id).await? else {
        return Ok(false);
    };
    if reservation.status() != Some(ReservationStatus::Pending) {
        return Ok(false);
    }
    if let Some(payment_id) = reservation.payment_id {
        let payment = db::payments::find_for_update(&mut *tx, payment_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))?;
        if !payment.status().is_some_and(|s| s.is_uncaptured()) {
            return Ok(false);
        }
        escrow::void(state, &mut tx, &payment, None, now).await?;
    }
    db::storage::set_reservation_status(&mut *tx, reservation.id, ReservationStatus::Cancelled, now).await?;
    tx.commit().await?;
    Ok(true)
}

/// Void the intent of an extension left unpaid and restore the previous
/// end date. An intent that already settled without its webhook reaching
/// us is recorded as it ended. Returns false when there is nothing to undo.
pub async fn drop_unpaid_extension(state: &AppState, payment_id: i64, now: i64) -> ServiceResult<bool> {
    let mut tx = state.pool.begin().await?;
    let Some(payment) = db::payments::find_for_update(&mut *tx, payment_id).await? else {
        return Ok(false);
    };
    let Some(status) = payment.status().filter(|_| payment.kind() == Some(PaymentKind::Storage)) else {
        return Ok(false);
    };
    let Some(reservation) = db::storage::find_reservation_for_update(&mut *tx, payment.reference_id).await? else {
        return Ok(false);
    };
    let Some(extension) = db::storage::find_extension_by_payment_for_update(&mut *tx, payment.id).await? else {
        return Ok(false);
    };

    if status.is_uncaptured() {
        escrow::void(state, &mut tx, &payment, None, now).await?;
    } else if !matches!(status, EscrowStatus::Cancelled | EscrowStatus::Expired) {
        db::storage::set_extension_status(&mut *tx, extension.id, ExtensionStatus::Paid, now).await?;
        tx.commit().await?;
        return Ok(false);
    }

    if reservation.effect_of_drop(payment.id, Some(&extension)) == StoragePaymentEffect::RevertExtension {
        undo_extension(&mut tx, &extension, reservation.client_id, now).await?;
    } else {
        // reservation already over or cancelled: only close the record
        db::storage::set_extension_status(&mut *tx, extension.id, ExtensionStatus::Reverted, now).await?;
    }
    tx.commit().await?;
    Ok(true)
}
