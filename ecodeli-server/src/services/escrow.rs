//! Escrow lifecycle around Stripe PaymentIntents
//!
//! Delivery payments authorize the card when the client pays, capture at
//! pickup and pay the deliverer once the delivery is validated. Booking
//! and storage payments are captured immediately; bookings are held until
//! the service is completed, storage goes straight to the platform.
//!
//! State changes run on the caller's transaction. Stripe is called while
//! the payment row is locked so a webhook for the same intent waits for
//! the outcome.

use rust_decimal::Decimal;
use serde_json::json;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    DisputeResolution, EscrowStatus, NotificationKind, Payment, PaymentIntentInfo, PaymentKind,
};
use shared::pricing::{commission_split, to_decimal, to_f64, to_minor_units};
use shared::util::snowflake_id;
use sqlx::PgConnection;

use crate::db;
use crate::error::ServiceResult;
use crate::services::{notify, wallet};
use crate::state::{AppState, Settings};
use crate::stripe::CaptureMethod;

/// Payment about to be created for a delivery, booking or reservation
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub kind: PaymentKind,
    pub reference_id: i64,
    pub payer_id: i64,
    pub payee_id: Option<i64>,
    pub amount: f64,
}

fn status_of(payment: &Payment) -> ServiceResult<EscrowStatus> {
    payment
        .status()
        .ok_or_else(|| AppError::internal(format!("Unknown escrow status {}", payment.status)).into())
}

fn kind_of(payment: &Payment) -> ServiceResult<PaymentKind> {
    payment
        .kind()
        .ok_or_else(|| AppError::internal(format!("Unknown payment kind {}", payment.kind)).into())
}

fn ensure_transition(from: EscrowStatus, to: EscrowStatus) -> ServiceResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::with_message(
            ErrorCode::EscrowInvalidState,
            format!("Cannot move payment from {from} to {to}"),
        )
        .into())
    }
}

fn capture_method(kind: PaymentKind) -> CaptureMethod {
    match kind {
        PaymentKind::Delivery => CaptureMethod::Manual,
        PaymentKind::Booking | PaymentKind::Storage => CaptureMethod::Automatic,
    }
}

/// Commission rate applied when paying out
pub fn commission_percent(settings: &Settings, kind: PaymentKind) -> f64 {
    match kind {
        PaymentKind::Delivery => settings.platform_fee_percent,
        PaymentKind::Booking => settings.service_commission_percent,
        PaymentKind::Storage => 100.0,
    }
}

async fn audit(
    conn: &mut PgConnection,
    actor_id: Option<i64>,
    action: &str,
    payment: &Payment,
    detail: serde_json::Value,
    now: i64,
) -> ServiceResult<()> {
    db::audit::log(&mut *conn, actor_id, action, Some(payment.id), Some(&detail), None, now).await?;
    Ok(())
}

/// Insert a PENDING payment row
pub async fn create(
    conn: &mut PgConnection,
    currency: &str,
    new: NewPayment,
    now: i64,
) -> ServiceResult<Payment> {
    if to_decimal(new.amount) <= Decimal::ZERO {
        return Err(AppError::validation("Payment amount must be positive").into());
    }
    let payment = Payment {
        id: snowflake_id(),
        kind: new.kind.as_db().to_string(),
        reference_id: new.reference_id,
        payer_id: new.payer_id,
        payee_id: new.payee_id,
        amount: to_f64(to_decimal(new.amount)),
        currency: currency.to_string(),
        status: EscrowStatus::Pending.as_db().to_string(),
        stripe_payment_intent_id: None,
        platform_fee: 0.0,
        payee_amount: 0.0,
        refunded_amount: 0.0,
        captured_at: None,
        released_at: None,
        dispute_reason: None,
        created_at: now,
        updated_at: now,
    };
    db::payments::insert(&mut *conn, &payment).await?;
    Ok(payment)
}

/// Create (or recreate) the Stripe PaymentIntent of a PENDING payment and
/// hand its client secret to the payer. Called after the row is committed.
pub async fn open_intent(state: &AppState, payment_id: i64) -> ServiceResult<PaymentIntentInfo> {
    let mut tx = state.pool.begin().await?;
    let payment = db::payments::find_for_update(&mut *tx, payment_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))?;
    let status = status_of(&payment)?;
    if status != EscrowStatus::Pending {
        return Err(AppError::with_message(
            ErrorCode::EscrowInvalidState,
            format!("Payment is already {status}"),
        )
        .into());
    }
    let kind = kind_of(&payment)?;

    if let Some(previous) = payment.stripe_payment_intent_id.as_deref() {
        // the old secret is unknown to us, replace the intent
        if let Err(e) = state.stripe.cancel_payment_intent(previous).await {
            tracing::warn!(payment_id, intent_id = previous, error = %e, "Failed to cancel superseded intent");
        }
    }

    let metadata = [
        ("payment_id", payment.id.to_string()),
        ("kind", kind.as_db().to_string()),
        ("reference_id", payment.reference_id.to_string()),
    ];
    let intent = state
        .stripe
        .create_payment_intent(
            to_minor_units(payment.amount),
            &payment.currency,
            capture_method(kind),
            &metadata,
        )
        .await?;

    let now = shared::util::now_millis();
    db::payments::set_intent(&mut *tx, payment.id, &intent.id, now).await?;
    tx.commit().await?;

    tracing::info!(payment_id, intent_id = %intent.id, kind = %kind, "PaymentIntent created");
    Ok(PaymentIntentInfo {
        payment_id: payment.id,
        client_secret: intent.client_secret,
        amount: payment.amount,
        currency: payment.currency,
    })
}

/// Card authorized (manual capture intents)
pub async fn mark_authorized(conn: &mut PgConnection, payment: &Payment, now: i64) -> ServiceResult<()> {
    let status = status_of(payment)?;
    if status != EscrowStatus::Pending {
        tracing::debug!(payment_id = payment.id, status = %status, "Authorization ignored");
        return Ok(());
    }
    db::payments::set_status(&mut *conn, payment.id, EscrowStatus::Authorized, now).await?;
    tracing::info!(payment_id = payment.id, "Payment authorized");
    Ok(())
}

/// Capture an authorized delivery payment when the parcel is picked up
pub async fn capture(
    state: &AppState,
    conn: &mut PgConnection,
    payment: &Payment,
    actor_id: i64,
    now: i64,
) -> ServiceResult<()> {
    let status = status_of(payment)?;
    if status != EscrowStatus::Authorized {
        return Err(AppError::with_message(
            ErrorCode::PaymentFailed,
            format!("Payment must be authorized before pickup, current status {status}"),
        )
        .into());
    }
    let intent_id = payment
        .stripe_payment_intent_id
        .as_deref()
        .ok_or_else(|| AppError::with_message(ErrorCode::PaymentFailed, "Payment has no intent"))?;

    let stripe_status = state.stripe.capture_payment_intent(intent_id).await?;
    if stripe_status != "succeeded" {
        tracing::warn!(payment_id = payment.id, stripe_status, "Capture did not succeed");
        return Err(AppError::with_message(
            ErrorCode::PaymentFailed,
            format!("Capture returned status {stripe_status}"),
        )
        .into());
    }

    db::payments::mark_held(&mut *conn, payment.id, now).await?;
    audit(conn, Some(actor_id), "escrow_captured", payment, json!({ "amount": payment.amount }), now).await?;
    tracing::info!(payment_id = payment.id, amount = payment.amount, "Funds captured and held");
    Ok(())
}

/// Automatic-capture payment succeeded. Bookings are held, storage
/// payments go straight to the platform. Returns true when the payment
/// row changed.
pub async fn mark_succeeded(
    state: &AppState,
    conn: &mut PgConnection,
    payment: &Payment,
    now: i64,
) -> ServiceResult<bool> {
    let status = status_of(payment)?;
    if !status.is_uncaptured() {
        return Ok(false);
    }
    db::payments::mark_held(&mut *conn, payment.id, now).await?;
    let mut held = payment.clone();
    held.status = EscrowStatus::Held.as_db().to_string();
    held.captured_at = Some(now);

    if kind_of(payment)? == PaymentKind::Storage {
        payout(&state.settings, conn, &held, None, now).await?;
    }
    tracing::info!(payment_id = payment.id, "Payment captured");
    Ok(true)
}

/// Intent failed or was cancelled before capture
pub async fn mark_cancelled(conn: &mut PgConnection, payment: &Payment, now: i64) -> ServiceResult<bool> {
    let status = status_of(payment)?;
    if !status.can_transition_to(EscrowStatus::Cancelled) {
        return Ok(false);
    }
    db::payments::set_status(&mut *conn, payment.id, EscrowStatus::Cancelled, now).await?;
    tracing::info!(payment_id = payment.id, "Payment cancelled");
    Ok(true)
}

/// Pay the payee their share and keep the commission. No checks: callers
/// validate the release first.
async fn payout(
    settings: &Settings,
    conn: &mut PgConnection,
    payment: &Payment,
    actor_id: Option<i64>,
    now: i64,
) -> ServiceResult<()> {
    let kind = kind_of(payment)?;
    let (payee_amount, commission) = match payment.payee_id {
        Some(_) => commission_split(payment.amount, commission_percent(settings, kind)),
        None => (0.0, payment.amount),
    };

    if let Some(payee_id) = payment.payee_id {
        wallet::credit_payout(conn, payee_id, payment.amount, commission, payment.id, now).await?;
        notify::send(
            &mut *conn,
            payee_id,
            NotificationKind::PaymentReleased,
            "Payment released",
            format!("{payee_amount:.2} {} credited to your wallet", payment.currency.to_uppercase()),
            Some(payment.id),
            now,
        )
        .await?;
    }
    db::payments::mark_released(&mut *conn, payment.id, commission, payee_amount, now).await?;
    audit(
        conn,
        actor_id,
        "escrow_released",
        payment,
        json!({ "payee_amount": payee_amount, "platform_fee": commission }),
        now,
    )
    .await?;
    tracing::info!(payment_id = payment.id, payee_amount, commission, "Escrow released");
    Ok(())
}

/// Release held funds once the work is done and proven
pub async fn release(
    settings: &Settings,
    conn: &mut PgConnection,
    payment: &Payment,
    work_validated: bool,
    has_proof: bool,
    actor_id: Option<i64>,
    now: i64,
) -> ServiceResult<()> {
    let status = status_of(payment)?;
    settings
        .escrow
        .check_release(status, payment.captured_at, now, work_validated, has_proof)?;
    payout(settings, conn, payment, actor_id, now).await
}

/// Release when the rules already allow it. A refused release (hold too
/// short, disputed, not captured) is left for the auto-release job or an
/// admin and reported as `false`.
pub async fn try_release(
    settings: &Settings,
    conn: &mut PgConnection,
    payment: &Payment,
    actor_id: Option<i64>,
    now: i64,
) -> ServiceResult<bool> {
    let status = status_of(payment)?;
    if let Err(e) = settings
        .escrow
        .check_release(status, payment.captured_at, now, true, true)
    {
        tracing::info!(payment_id = payment.id, code = ?e.code, "Release deferred");
        return Ok(false);
    }
    payout(settings, conn, payment, actor_id, now).await?;
    Ok(true)
}

/// Refund part or all of a captured payment. Money already paid out is
/// taken back from the payee in proportion.
pub async fn refund(
    state: &AppState,
    conn: &mut PgConnection,
    payment: &Payment,
    amount: Option<f64>,
    reason: Option<&str>,
    actor_id: Option<i64>,
    now: i64,
) -> ServiceResult<EscrowStatus> {
    let status = status_of(payment)?;
    let remaining = to_decimal(payment.amount) - to_decimal(payment.refunded_amount);
    let requested = amount.unwrap_or_else(|| to_f64(remaining));
    let next = state.settings.escrow.check_refund(
        status,
        payment.captured_at,
        now,
        requested,
        payment.amount,
        payment.refunded_amount,
    )?;
    let intent_id = payment.stripe_payment_intent_id.as_deref().ok_or_else(|| {
        AppError::with_message(ErrorCode::EscrowInvalidState, "Payment has no intent to refund")
    })?;

    let refund_id = state
        .stripe
        .create_refund(intent_id, Some(to_minor_units(requested)))
        .await?;

    let refunded_total = to_f64(to_decimal(payment.refunded_amount) + to_decimal(requested));
    db::payments::record_refund(&mut *conn, payment.id, refunded_total, next, now).await?;

    let paid_out = payment.released_at.is_some() && payment.payee_amount > 0.0;
    if let Some(payee_id) = payment.payee_id.filter(|_| paid_out) {
        let share = to_decimal(requested) * to_decimal(payment.payee_amount) / to_decimal(payment.amount);
        wallet::claw_back(conn, payee_id, to_f64(share), payment.id, now).await?;
    }

    notify::send(
        &mut *conn,
        payment.payer_id,
        NotificationKind::PaymentRefunded,
        "Refund issued",
        format!("{requested:.2} {} refunded", payment.currency.to_uppercase()),
        Some(payment.id),
        now,
    )
    .await?;
    audit(
        conn,
        actor_id,
        "escrow_refunded",
        payment,
        json!({ "amount": requested, "refund_id": refund_id, "reason": reason, "status": next.as_db() }),
        now,
    )
    .await?;
    tracing::info!(payment_id = payment.id, amount = requested, status = %next, "Payment refunded");
    Ok(next)
}

/// Cancel an intent that was never captured
pub async fn void(
    state: &AppState,
    conn: &mut PgConnection,
    payment: &Payment,
    actor_id: Option<i64>,
    now: i64,
) -> ServiceResult<()> {
    let status = status_of(payment)?;
    ensure_transition(status, EscrowStatus::Cancelled)?;
    if let Some(intent_id) = payment.stripe_payment_intent_id.as_deref() {
        state.stripe.cancel_payment_intent(intent_id).await?;
    }
    db::payments::set_status(&mut *conn, payment.id, EscrowStatus::Cancelled, now).await?;
    audit(conn, actor_id, "escrow_voided", payment, json!({ "previous": status.as_db() }), now).await?;
    tracing::info!(payment_id = payment.id, "Uncaptured payment voided");
    Ok(())
}

/// Undo the money side of a cancelled delivery, booking or reservation:
/// void an uncaptured payment, refund a held one. Released or already
/// refunded payments are left alone.
pub async fn cancel_for_reference(
    state: &AppState,
    conn: &mut PgConnection,
    kind: PaymentKind,
    reference_id: i64,
    actor_id: Option<i64>,
    now: i64,
) -> ServiceResult<Option<EscrowStatus>> {
    let Some(found) = db::payments::find_by_reference(&mut *conn, kind, reference_id).await? else {
        return Ok(None);
    };
    let Some(payment) = db::payments::find_for_update(&mut *conn, found.id).await? else {
        return Ok(None);
    };
    let status = status_of(&payment)?;
    if status.is_uncaptured() {
        void(state, conn, &payment, actor_id, now).await?;
        Ok(Some(EscrowStatus::Cancelled))
    } else if status == EscrowStatus::Held {
        let next = refund(state, conn, &payment, None, Some("cancelled"), actor_id, now).await?;
        Ok(Some(next))
    } else {
        tracing::info!(payment_id = payment.id, status = %status, "Payment left unchanged on cancellation");
        Ok(Some(status))
    }
}

/// Client contests held funds; release waits for an admin
pub async fn dispute(
    conn: &mut PgConnection,
    payment: &Payment,
    actor_id: i64,
    reason: &str,
    now: i64,
) -> ServiceResult<()> {
    if reason.trim().is_empty() {
        return Err(AppError::validation("A dispute reason is required").into());
    }
    let status = status_of(payment)?;
    ensure_transition(status, EscrowStatus::Disputed)?;
    db::payments::mark_disputed(&mut *conn, payment.id, reason, now).await?;
    audit(conn, Some(actor_id), "escrow_disputed", payment, json!({ "reason": reason }), now).await?;
    tracing::warn!(payment_id = payment.id, "Payment disputed");
    Ok(())
}

/// Admin decision on a disputed payment
#[allow(clippy::too_many_arguments)]
pub async fn resolve(
    state: &AppState,
    conn: &mut PgConnection,
    payment: &Payment,
    resolution: DisputeResolution,
    amount: Option<f64>,
    note: Option<&str>,
    admin_id: i64,
    now: i64,
) -> ServiceResult<EscrowStatus> {
    let status = status_of(payment)?;
    if status != EscrowStatus::Disputed {
        return Err(AppError::with_message(
            ErrorCode::EscrowInvalidState,
            format!("Payment is {status}, not disputed"),
        )
        .into());
    }
    let outcome = match resolution {
        DisputeResolution::Release => {
            payout(&state.settings, conn, payment, Some(admin_id), now).await?;
            EscrowStatus::Released
        }
        DisputeResolution::Refund => {
            refund(state, conn, payment, amount, note, Some(admin_id), now).await?
        }
    };
    audit(
        conn,
        Some(admin_id),
        "escrow_dispute_resolved",
        payment,
        json!({ "resolution": outcome.as_db(), "note": note }),
        now,
    )
    .await?;
    Ok(outcome)
}

/// Refund reported by Stripe (dashboard refunds included). Refunds we
/// issued ourselves are already recorded and change nothing.
pub async fn sync_refund(
    conn: &mut PgConnection,
    payment: &Payment,
    amount_refunded: f64,
    now: i64,
) -> ServiceResult<bool> {
    let status = status_of(payment)?;
    let refunded = to_decimal(amount_refunded);
    if refunded <= to_decimal(payment.refunded_amount) {
        return Ok(false);
    }
    let next = if refunded >= to_decimal(payment.amount) {
        EscrowStatus::Refunded
    } else {
        EscrowStatus::PartiallyRefunded
    };
    ensure_transition(status, next)?;
    db::payments::record_refund(&mut *conn, payment.id, to_f64(refunded), next, now).await?;
    audit(conn, None, "escrow_refunded_externally", payment, json!({ "amount_refunded": amount_refunded }), now).await?;
    Ok(true)
}

/// Chargeback opened at the card network
pub async fn mark_disputed_externally(
    conn: &mut PgConnection,
    payment: &Payment,
    reason: &str,
    now: i64,
) -> ServiceResult<bool> {
    let status = status_of(payment)?;
    if !status.can_transition_to(EscrowStatus::Disputed) {
        tracing::warn!(payment_id = payment.id, status = %status, "Chargeback on payment that is not held");
        return Ok(false);
    }
    db::payments::mark_disputed(&mut *conn, payment.id, reason, now).await?;
    audit(conn, None, "escrow_chargeback", payment, json!({ "reason": reason }), now).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::EscrowPolicy;

    fn settings() -> Settings {
        Settings {
            currency: "eur".into(),
            platform_fee_percent: 15.0,
            service_commission_percent: 20.0,
            min_withdrawal_amount: 10.0,
            escrow: EscrowPolicy::default(),
        }
    }

    #[test]
    fn test_capture_method_by_kind() {
        assert_eq!(capture_method(PaymentKind::Delivery), CaptureMethod::Manual);
        assert_eq!(capture_method(PaymentKind::Booking), CaptureMethod::Automatic);
        assert_eq!(capture_method(PaymentKind::Storage), CaptureMethod::Automatic);
    }

    #[test]
    fn test_commission_percent_by_kind() {
        let s = settings();
        assert_eq!(commission_percent(&s, PaymentKind::Delivery), 15.0);
        assert_eq!(commission_percent(&s, PaymentKind::Booking), 20.0);
        assert_eq!(commission_percent(&s, PaymentKind::Storage), 100.0);
    }

    #[test]
    fn test_ensure_transition() {
        assert!(ensure_transition(EscrowStatus::Held, EscrowStatus::Disputed).is_ok());
        let err: AppError = ensure_transition(EscrowStatus::Released, EscrowStatus::Disputed)
            .unwrap_err()
            .into();
        assert_eq!(err.code, ErrorCode::EscrowInvalidState);
    }
}
