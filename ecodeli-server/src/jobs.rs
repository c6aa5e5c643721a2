//! Periodic background work
//!
//! One loop, one pass per tick. Each item runs in its own transaction; a
//! failing item is logged and retried on the next tick.

use std::time::Duration;

use shared::error::AppError;
use shared::models::{EscrowStatus, NotificationKind};
use shared::util::{HOUR_MS, now_millis};
use tokio::task::JoinHandle;

use crate::db;
use crate::error::ServiceResult;
use crate::services::{escrow, notify, storage, verification};
use crate::state::AppState;

/// Unpaid reservations and extensions are dropped after this long
const STALE_PAYMENT_MS: i64 = HOUR_MS;

/// Start the jobs loop
pub fn spawn(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_once(&state).await;
        }
    })
}

/// One pass over every job
pub async fn run_once(state: &AppState) {
    let now = now_millis();
    log_failure("auto_release", auto_release(state, now).await);
    log_failure("hold_watch", warn_long_holds(state, now).await);
    log_failure("document_expiry", expire_documents(state, now).await);
    log_failure("reservation_completion", complete_reservations(state, now).await);
    log_failure("stale_reservations", drop_stale_reservations(state, now).await);
    log_failure("stale_extensions", drop_stale_extensions(state, now).await);
    state.rate_limiter.cleanup().await;
}

fn log_failure(job: &str, result: ServiceResult<()>) {
    if let Err(e) = result {
        let e: AppError = e.into();
        tracing::error!(job, error = %e, "Background job failed");
    }
}

/// Pay out held funds whose work was validated long enough ago
async fn auto_release(state: &AppState, now: i64) -> ServiceResult<()> {
    let policy = state.settings.escrow;
    let ready_before = now - policy.auto_release_hours * HOUR_MS;
    let candidates = db::payments::list_release_candidates(&state.pool, ready_before).await?;

    let mut released = 0usize;
    for (payment_id, ready_at) in candidates {
        let mut tx = state.pool.begin().await?;
        let Some(payment) = db::payments::find_for_update(&mut *tx, payment_id).await? else {
            continue;
        };
        let Some(status) = payment.status() else {
            continue;
        };
        if !policy.auto_release_due(status, Some(ready_at), now) {
            continue;
        }
        match escrow::try_release(&state.settings, &mut tx, &payment, None, now).await {
            Ok(true) => {
                tx.commit().await?;
                released += 1;
            }
            Ok(false) => {}
            Err(e) => {
                let e: AppError = e.into();
                tracing::warn!(payment_id, error = %e, "Auto-release failed");
            }
        }
    }
    if released > 0 {
        tracing::info!(released, "Escrow auto-release pass");
    }
    Ok(())
}

/// Held funds past the maximum hold need an admin
async fn warn_long_holds(state: &AppState, now: i64) -> ServiceResult<()> {
    let held = db::payments::list_by_status(&state.pool, EscrowStatus::Held).await?;
    for payment in held
        .iter()
        .filter(|p| state.settings.escrow.hold_expired(p.captured_at, now))
    {
        tracing::warn!(
            payment_id = payment.id,
            kind = %payment.kind,
            captured_at = payment.captured_at,
            "Payment held past the maximum hold"
        );
    }
    Ok(())
}

/// Approved documents past their expiry no longer count
async fn expire_documents(state: &AppState, now: i64) -> ServiceResult<()> {
    let mut owners = db::documents::expire_lapsed(&state.pool, now).await?;
    if owners.is_empty() {
        return Ok(());
    }
    owners.sort_unstable();
    owners.dedup();
    tracing::info!(users = owners.len(), "Documents expired");

    for user_id in owners {
        let mut tx = state.pool.begin().await?;
        verification::reevaluate(&mut tx, user_id, now).await?;
        tx.commit().await?;
    }
    Ok(())
}

async fn complete_reservations(state: &AppState, now: i64) -> ServiceResult<()> {
    let finished = db::storage::complete_expired(&state.pool, now).await?;
    for reservation in &finished {
        notify::send(
            &state.pool,
            reservation.client_id,
            NotificationKind::ReservationUpdate,
            "Reservation ended",
            "Your storage period is over, thank you for using EcoDeli.",
            Some(reservation.id),
            now,
        )
        .await?;
    }
    if !finished.is_empty() {
        tracing::info!(count = finished.len(), "Reservations completed");
    }
    Ok(())
}

/// Void the intents of reservations left unpaid, then cancel them
async fn drop_stale_reservations(state: &AppState, now: i64) -> ServiceResult<()> {
    let stale = db::storage::list_stale_pending(&state.pool, now - STALE_PAYMENT_MS).await?;
    let mut dropped = 0usize;
    for reservation_id in stale {
        match storage::drop_unpaid_reservation(state, reservation_id, now).await {
            Ok(true) => dropped += 1,
            Ok(false) => {}
            Err(e) => {
                let e: AppError = e.into();
                tracing::warn!(reservation_id, error = %e, "Could not drop unpaid reservation");
            }
        }
    }
    if dropped > 0 {
        tracing::info!(count = dropped, "Unpaid reservations cancelled");
    }
    Ok(())
}

/// Undo extensions whose payment never arrived
async fn drop_stale_extensions(state: &AppState, now: i64) -> ServiceResult<()> {
    let stale = db::storage::list_unpaid_extensions(&state.pool, now - STALE_PAYMENT_MS).await?;
    let mut reverted = 0usize;
    for extension in stale {
        match storage::drop_unpaid_extension(state, extension.payment_id, now).await {
            Ok(true) => reverted += 1,
            Ok(false) => {}
            Err(e) => {
                let e: AppError = e.into();
                tracing::warn!(
                    reservation_id = extension.reservation_id,
                    error = %e,
                    "Could not drop unpaid extension"
                );
            }
        }
    }
    if reverted > 0 {
        tracing::info!(count = reverted, "Unpaid extensions reverted");
    }
    Ok(())
}
