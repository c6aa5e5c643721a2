//! Stripe webhook handler
//!
//! POST /stripe/webhook: PaymentIntent, refund and dispute events (raw body
//! for signature verification)

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use shared::error::ErrorCode;
use shared::models::{
    BookingStatus, ExtensionStatus, NotificationKind, Payment, PaymentKind, ReservationStatus,
    StoragePaymentEffect,
};
use shared::pricing::from_minor_units;
use shared::util::now_millis;
use sqlx::PgConnection;

use crate::error::{ServiceError, ServiceResult};
use crate::services::{escrow, notify, storage};
use crate::state::AppState;
use crate::{db, stripe};

/// Handle incoming Stripe webhook events
///
/// Must receive raw body (not JSON) for HMAC signature verification. The
/// event id is recorded in the same transaction as its effects, so a
/// failed event is retried by Stripe and a processed one is skipped.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(sig_header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Missing Stripe-Signature header");
        return StatusCode::BAD_REQUEST;
    };

    if let Err(e) =
        stripe::verify_webhook_signature(&body, sig_header, &state.stripe_webhook_secret)
    {
        tracing::warn!(error = e, "Webhook signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    let event: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%e, "Failed to parse webhook JSON");
            return StatusCode::BAD_REQUEST;
        }
    };
    let event_type = event["type"].as_str().unwrap_or("");
    let Some(event_id) = event["id"].as_str() else {
        tracing::warn!("Webhook event missing id");
        return StatusCode::BAD_REQUEST;
    };
    tracing::info!(event_id, event_type, "Received Stripe webhook");

    match process(&state, event_id, event_type, &event).await {
        Ok(()) => StatusCode::OK,
        Err(ServiceError::App(e)) if e.code == ErrorCode::PaymentProviderError => {
            // nothing was committed, let Stripe deliver the event again
            tracing::error!(event_id, event_type, error = %e, "Stripe call failed while handling webhook");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(ServiceError::App(e)) => {
            // business refusal: retrying the same event will not change it
            tracing::warn!(event_id, event_type, error = %e, "Webhook event not applied");
            StatusCode::OK
        }
        Err(ServiceError::Db(e)) => {
            tracing::error!(event_id, event_type, error = %e, "DB error handling webhook");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn process(state: &AppState, event_id: &str, event_type: &str, event: &Value) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO processed_webhook_events (event_id, event_type, processed_at)
         VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
    )
    .bind(event_id)
    .bind(event_type)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if inserted == 0 {
        tracing::info!(event_id, "Duplicate webhook event, skipping");
        return Ok(());
    }

    let object = &event["data"]["object"];
    match event_type {
        "payment_intent.amount_capturable_updated" => {
            if let Some(payment) = payment_for_intent(&mut tx, object["id"].as_str()).await? {
                escrow::mark_authorized(&mut tx, &payment, now).await?;
            }
        }
        "payment_intent.succeeded" => {
            if let Some(payment) = payment_for_intent(&mut tx, object["id"].as_str()).await? {
                if escrow::mark_succeeded(state, &mut tx, &payment, now).await? {
                    on_paid(state, &mut tx, &payment, now).await?;
                }
            }
        }
        "payment_intent.payment_failed" | "payment_intent.canceled" => {
            if let Some(payment) = payment_for_intent(&mut tx, object["id"].as_str()).await? {
                if escrow::mark_cancelled(&mut tx, &payment, now).await? {
                    on_payment_dropped(&mut tx, &payment, now).await?;
                }
            }
        }
        "charge.refunded" => {
            if let Some(payment) = payment_for_intent(&mut tx, object["payment_intent"].as_str()).await? {
                let refunded = from_minor_units(object["amount_refunded"].as_i64().unwrap_or(0));
                escrow::sync_refund(&mut tx, &payment, refunded, now).await?;
            }
        }
        "charge.dispute.created" => {
            if let Some(payment) = payment_for_intent(&mut tx, object["payment_intent"].as_str()).await? {
                let reason = object["reason"].as_str().unwrap_or("chargeback");
                escrow::mark_disputed_externally(&mut tx, &payment, reason, now).await?;
            }
        }
        _ => {
            tracing::debug!(event_type, "Unhandled webhook event type");
        }
    }

    tx.commit().await?;
    Ok(())
}

async fn payment_for_intent(
    conn: &mut PgConnection,
    intent_id: Option<&str>,
) -> ServiceResult<Option<Payment>> {
    let Some(intent_id) = intent_id else {
        tracing::warn!("Webhook object without PaymentIntent id");
        return Ok(None);
    };
    let payment = db::payments::find_by_intent_for_update(&mut *conn, intent_id).await?;
    if payment.is_none() {
        tracing::warn!(intent_id, "No payment for PaymentIntent");
    }
    Ok(payment)
}

/// Funds captured: a reserved box becomes usable, an extension is settled,
/// money for a cancelled reservation goes back, the provider learns about
/// the paid booking.
async fn on_paid(state: &AppState, conn: &mut PgConnection, payment: &Payment, now: i64) -> ServiceResult<()> {
    match payment.kind() {
        Some(PaymentKind::Storage) => {
            let Some(reservation) =
                db::storage::find_reservation_for_update(&mut *conn, payment.reference_id).await?
            else {
                return Ok(());
            };
            match reservation.effect_of_capture(payment.id) {
                StoragePaymentEffect::Activate => {
                    db::storage::set_reservation_status(&mut *conn, reservation.id, ReservationStatus::Active, now)
                        .await?;
                    notify::send(
                        &mut *conn,
                        reservation.client_id,
                        NotificationKind::ReservationUpdate,
                        "Reservation confirmed",
                        format!("Your box is reserved, access code {}", reservation.access_code),
                        Some(reservation.id),
                        now,
                    )
                    .await?;
                    tracing::info!(reservation_id = reservation.id, "Reservation paid and active");
                }
                StoragePaymentEffect::Refund => {
                    let Some(captured) = db::payments::find_for_update(&mut *conn, payment.id).await? else {
                        return Ok(());
                    };
                    escrow::refund(state, conn, &captured, None, Some("reservation cancelled"), None, now)
                        .await?;
                    tracing::warn!(
                        reservation_id = reservation.id,
                        payment_id = payment.id,
                        "Payment for a cancelled reservation refunded"
                    );
                }
                _ => {
                    let pending_extension =
                        db::storage::find_extension_by_payment_for_update(&mut *conn, payment.id)
                            .await?
                            .filter(|e| e.status() == Some(ExtensionStatus::Pending));
                    if let Some(extension) = pending_extension {
                        db::storage::set_extension_status(&mut *conn, extension.id, ExtensionStatus::Paid, now)
                            .await?;
                        tracing::info!(reservation_id = reservation.id, "Extension paid");
                    }
                }
            }
        }
        Some(PaymentKind::Booking) => {
            if let Some(booking) = db::services::find_booking(&mut *conn, payment.reference_id).await? {
                notify::send(
                    &mut *conn,
                    booking.provider_id,
                    NotificationKind::BookingUpdate,
                    "Booking paid",
                    "The client paid for the booking, please confirm it.",
                    Some(booking.id),
                    now,
                )
                .await?;
            }
        }
        Some(PaymentKind::Delivery) | None => {}
    }
    Ok(())
}

/// Intent failed or cancelled before capture: free what it was holding
async fn on_payment_dropped(conn: &mut PgConnection, payment: &Payment, now: i64) -> ServiceResult<()> {
    match payment.kind() {
        Some(PaymentKind::Storage) => {
            let Some(reservation) =
                db::storage::find_reservation_for_update(&mut *conn, payment.reference_id).await?
            else {
                return Ok(());
            };
            let extension = db::storage::find_extension_by_payment_for_update(&mut *conn, payment.id).await?;
            match (reservation.effect_of_drop(payment.id, extension.as_ref()), extension) {
                (StoragePaymentEffect::Cancel, _) => {
                    db::storage::set_reservation_status(&mut *conn, reservation.id, ReservationStatus::Cancelled, now)
                        .await?;
                    tracing::info!(reservation_id = reservation.id, "Unpaid reservation cancelled");
                }
                (StoragePaymentEffect::RevertExtension, Some(extension)) => {
                    storage::undo_extension(conn, &extension, reservation.client_id, now).await?;
                }
                _ => {}
            }
        }
        Some(PaymentKind::Booking) => {
            let Some(booking) =
                db::services::find_booking_for_update(&mut *conn, payment.reference_id).await?
            else {
                return Ok(());
            };
            if booking.status() == Some(BookingStatus::Pending) {
                db::services::set_booking_status(&mut *conn, booking.id, BookingStatus::Cancelled, now)
                    .await?;
                notify::send(
                    &mut *conn,
                    booking.client_id,
                    NotificationKind::BookingUpdate,
                    "Booking cancelled",
                    "The payment did not go through, the booking was cancelled.",
                    Some(booking.id),
                    now,
                )
                .await?;
                tracing::info!(booking_id = booking.id, "Unpaid booking cancelled");
            }
        }
        Some(PaymentKind::Delivery) | None => {}
    }
    Ok(())
}
