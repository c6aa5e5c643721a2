//! Provider services, availability windows and bookings

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Availability, AvailabilityCreate, Booking, BookingCreate, BookingStatus, BookingStatusUpdate,
    NotificationKind, PaymentIntentInfo, PaymentKind, RescheduleRequest, Service, ServiceCreate,
    ServiceSearchQuery, ServiceUpdate, SlotQuery, TimeSlot, bookings_overlap, day_of_week,
    day_start_millis, fits_availability, generate_slots, validate_window,
};
use shared::util::{DAY_MS, now_millis, snowflake_id};
use sqlx::PgConnection;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::internal;
use crate::services::escrow::{self, NewPayment};
use crate::services::notify;
use crate::state::AppState;

use super::{ApiResult, checkout_intent};

const MAX_DURATION_MINUTES: i32 = 12 * 60;

fn validate_service_fields(price: Option<f64>, duration: Option<i32>) -> Result<(), AppError> {
    if price.is_some_and(|p| !p.is_finite() || p <= 0.0) {
        return Err(AppError::with_message(ErrorCode::ValueOutOfRange, "price must be positive"));
    }
    if duration.is_some_and(|d| !(1..=MAX_DURATION_MINUTES).contains(&d)) {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            "duration_minutes must be between 1 and 720",
        ));
    }
    Ok(())
}

fn date_of(millis: i64) -> Result<NaiveDate, AppError> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| AppError::new(ErrorCode::InvalidTimeWindow))
}

async fn windows_for(
    conn: &mut PgConnection,
    provider_id: i64,
    date: NaiveDate,
) -> Result<Vec<(i32, i32)>, AppError> {
    let rows = db::services::list_availability(&mut *conn, provider_id, Some(day_of_week(date)))
        .await
        .map_err(internal)?;
    rows.iter().map(Availability::window).collect()
}

/// Check a booking period against the provider's week and calendar.
/// Runs with the provider row locked.
async fn ensure_bookable(
    conn: &mut PgConnection,
    provider_id: i64,
    start: i64,
    end: i64,
    exclude: Option<i64>,
) -> Result<(), AppError> {
    let date = date_of(start)?;
    let windows = windows_for(conn, provider_id, date).await?;
    if !fits_availability(start, end, date, &windows) {
        return Err(AppError::new(ErrorCode::OutsideAvailability));
    }
    let busy = db::services::busy_intervals(&mut *conn, provider_id, start, end, exclude)
        .await
        .map_err(internal)?;
    if busy.iter().any(|&(b_start, b_end)| bookings_overlap(start, end, b_start, b_end)) {
        return Err(AppError::new(ErrorCode::SlotUnavailable));
    }
    Ok(())
}

// ── Provider catalog ──

/// POST /api/provider/services
pub async fn create_service(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ServiceCreate>,
) -> ApiResult<Service> {
    if req.name.trim().is_empty() || req.category.trim().is_empty() {
        return Err(AppError::validation("name and category are required"));
    }
    validate_service_fields(Some(req.price), Some(req.duration_minutes))?;

    let now = now_millis();
    let service = Service {
        id: snowflake_id(),
        provider_id: user.id,
        name: req.name.trim().to_string(),
        description: req.description,
        category: req.category.trim().to_string(),
        price: req.price,
        duration_minutes: req.duration_minutes,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db::services::insert_service(&state.pool, &service)
        .await
        .map_err(internal)?;
    tracing::info!(service_id = service.id, provider_id = user.id, "Service created");
    Ok(Json(service))
}

/// PATCH /api/provider/services/{id}
pub async fn update_service(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<ServiceUpdate>,
) -> ApiResult<Service> {
    let service = db::services::find_service(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::ServiceNotFound))?;
    if service.provider_id != user.id {
        return Err(AppError::not_owner());
    }
    validate_service_fields(req.price, req.duration_minutes)?;
    let updated = db::services::update_service(&state.pool, id, &req, now_millis())
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::ServiceNotFound))?;
    Ok(Json(updated))
}

/// POST /api/provider/availability
pub async fn add_availability(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<AvailabilityCreate>,
) -> ApiResult<Availability> {
    validate_window(req.day_of_week, &req.start_time, &req.end_time)?;
    let availability = Availability {
        id: snowflake_id(),
        provider_id: user.id,
        day_of_week: req.day_of_week,
        start_time: req.start_time,
        end_time: req.end_time,
        created_at: now_millis(),
    };
    db::services::insert_availability(&state.pool, &availability)
        .await
        .map_err(internal)?;
    Ok(Json(availability))
}

/// GET /api/provider/availability
pub async fn list_availability(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Vec<Availability>> {
    let rows = db::services::list_availability(&state.pool, user.id, None)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// DELETE /api/provider/availability/{id}
pub async fn delete_availability(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<bool> {
    let removed = db::services::delete_availability(&state.pool, id, user.id)
        .await
        .map_err(internal)?;
    if !removed {
        return Err(AppError::new(ErrorCode::AvailabilityNotFound));
    }
    Ok(Json(true))
}

// ── Public catalog ──

/// GET /api/services
pub async fn search(
    State(state): State<AppState>,
    Query(q): Query<ServiceSearchQuery>,
) -> ApiResult<Vec<Service>> {
    let rows = db::services::search_services(&state.pool, &q)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// GET /api/services/{id}
pub async fn get(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Service> {
    let service = db::services::find_service(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::ServiceNotFound))?;
    Ok(Json(service))
}

/// GET /api/services/{id}/slots?date=YYYY-MM-DD
pub async fn slots(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<SlotQuery>,
) -> ApiResult<Vec<TimeSlot>> {
    let service = db::services::find_service(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::ServiceNotFound))?;
    if !service.is_active {
        return Err(AppError::new(ErrorCode::ServiceInactive));
    }

    let mut conn = state.pool.acquire().await.map_err(internal)?;
    let windows = windows_for(&mut conn, service.provider_id, q.date).await?;
    if windows.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let day_start = day_start_millis(q.date);
    let busy = db::services::busy_intervals(&mut *conn, service.provider_id, day_start, day_start + DAY_MS, None)
        .await
        .map_err(internal)?;
    Ok(Json(generate_slots(
        q.date,
        &windows,
        service.duration_minutes,
        &busy,
        now_millis(),
    )))
}

// ── Bookings ──

#[derive(Debug, Serialize)]
pub struct BookingCheckout {
    pub booking: Booking,
    pub intent: Option<PaymentIntentInfo>,
}

/// POST /api/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<BookingCreate>,
) -> ApiResult<BookingCheckout> {
    let now = now_millis();
    if req.start_at <= now {
        return Err(AppError::with_message(
            ErrorCode::InvalidTimeWindow,
            "The booking must start in the future",
        ));
    }

    let mut tx = state.pool.begin().await.map_err(internal)?;
    let service = db::services::find_service(&mut *tx, req.service_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::ServiceNotFound))?;
    if !service.is_active {
        return Err(AppError::new(ErrorCode::ServiceInactive));
    }
    if service.provider_id == user.id {
        return Err(AppError::business_rule("Providers cannot book their own service"));
    }
    // serializes bookings of one provider
    db::users::find_for_update(&mut *tx, service.provider_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;

    let end_at = req.start_at + i64::from(service.duration_minutes) * 60_000;
    ensure_bookable(&mut tx, service.provider_id, req.start_at, end_at, None).await?;

    let mut booking = Booking {
        id: snowflake_id(),
        service_id: service.id,
        client_id: user.id,
        provider_id: service.provider_id,
        start_at: req.start_at,
        end_at,
        status: BookingStatus::Pending.as_db().to_string(),
        total_price: service.price,
        notes: req.notes,
        payment_id: None,
        created_at: now,
        updated_at: now,
    };
    db::services::insert_booking(&mut *tx, &booking)
        .await
        .map_err(internal)?;
    let payment = escrow::create(
        &mut tx,
        &state.settings.currency,
        NewPayment {
            kind: PaymentKind::Booking,
            reference_id: booking.id,
            payer_id: user.id,
            payee_id: Some(service.provider_id),
            amount: service.price,
        },
        now,
    )
    .await?;
    db::services::set_booking_payment(&mut *tx, booking.id, payment.id, now)
        .await
        .map_err(internal)?;
    booking.payment_id = Some(payment.id);
    notify::send(
        &mut *tx,
        service.provider_id,
        NotificationKind::BookingUpdate,
        "New booking",
        format!("{} booked for {}", service.name, format_start(req.start_at)),
        Some(booking.id),
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    tracing::info!(booking_id = booking.id, service_id = service.id, client_id = user.id, "Booking created");
    let intent = checkout_intent(&state, payment.id).await;
    Ok(Json(BookingCheckout { booking, intent }))
}

fn format_start(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default()
}

/// GET /api/bookings
pub async fn my_bookings(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Vec<Booking>> {
    let rows = db::services::list_bookings_for_user(&state.pool, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// PATCH /api/bookings/{id}/status
///
/// Clients may only cancel. The provider confirms, completes or cancels;
/// completing releases the booking payment to the provider.
pub async fn update_booking_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<BookingStatusUpdate>,
) -> ApiResult<Booking> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let mut booking = db::services::find_booking_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::BookingNotFound))?;

    let is_client = booking.client_id == user.id;
    let is_provider = booking.provider_id == user.id;
    if !is_client && !is_provider {
        return Err(AppError::not_owner());
    }
    if is_client && !is_provider && !req.status.client_may_set() {
        return Err(AppError::permission_denied("Clients can only cancel a booking"));
    }
    let current = booking
        .status()
        .ok_or_else(|| AppError::internal("Unknown booking status"))?;
    if !current.can_transition_to(req.status) {
        return Err(AppError::invalid_transition(current.as_db(), req.status.as_db()));
    }
    if req.status == BookingStatus::Completed && booking.start_at > now {
        return Err(AppError::business_rule("A booking cannot be completed before it starts"));
    }

    db::services::set_booking_status(&mut *tx, id, req.status, now)
        .await
        .map_err(internal)?;

    let mut payment_released = false;
    match req.status {
        BookingStatus::Completed => {
            if let Some(payment_id) = booking.payment_id {
                let payment = db::payments::find_for_update(&mut *tx, payment_id)
                    .await
                    .map_err(internal)?
                    .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))?;
                payment_released =
                    escrow::try_release(&state.settings, &mut tx, &payment, Some(user.id), now).await?;
            }
        }
        BookingStatus::Cancelled => {
            escrow::cancel_for_reference(&state, &mut tx, PaymentKind::Booking, id, Some(user.id), now)
                .await?;
        }
        _ => {}
    }

    let counterpart = if is_provider { booking.client_id } else { booking.provider_id };
    let body = match req.reason.as_deref() {
        Some(reason) => format!("Booking is now {}: {reason}", req.status),
        None => format!("Booking is now {}", req.status),
    };
    notify::send(
        &mut *tx,
        counterpart,
        NotificationKind::BookingUpdate,
        "Booking update",
        body,
        Some(id),
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    tracing::info!(booking_id = id, from = %current, to = %req.status, payment_released, "Booking status changed");
    booking.status = req.status.as_db().to_string();
    booking.updated_at = now;
    Ok(Json(booking))
}

/// POST /api/bookings/{id}/reschedule
///
/// Either party moves a confirmed booking to another free slot of the
/// same length.
pub async fn reschedule(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<RescheduleRequest>,
) -> ApiResult<Booking> {
    let now = now_millis();
    if req.start_at <= now {
        return Err(AppError::with_message(
            ErrorCode::InvalidTimeWindow,
            "The booking must start in the future",
        ));
    }

    let mut tx = state.pool.begin().await.map_err(internal)?;
    let booking = db::services::find_booking_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::BookingNotFound))?;
    booking.ensure_can_reschedule(user.id)?;

    db::users::find_for_update(&mut *tx, booking.provider_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    let end_at = req.start_at + (booking.end_at - booking.start_at);
    ensure_bookable(&mut tx, booking.provider_id, req.start_at, end_at, Some(id)).await?;

    let updated = db::services::reschedule_booking(&mut *tx, id, req.start_at, end_at, now)
        .await
        .map_err(internal)?;
    let counterpart = if booking.provider_id == user.id {
        booking.client_id
    } else {
        booking.provider_id
    };
    notify::send(
        &mut *tx,
        counterpart,
        NotificationKind::BookingUpdate,
        "Booking rescheduled",
        format!("Booking moved to {}", format_start(req.start_at)),
        Some(id),
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    tracing::info!(booking_id = id, start_at = req.start_at, "Booking rescheduled");
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_field_bounds() {
        assert!(validate_service_fields(Some(25.0), Some(60)).is_ok());
        assert!(validate_service_fields(None, None).is_ok());
        assert!(validate_service_fields(Some(0.0), None).is_err());
        assert!(validate_service_fields(Some(f64::NAN), None).is_err());
        assert!(validate_service_fields(None, Some(0)).is_err());
        assert!(validate_service_fields(None, Some(MAX_DURATION_MINUTES + 1)).is_err());
    }

    #[test]
    fn test_date_of_is_utc() {
        // 2025-03-03T23:30:00Z
        let date = date_of(1_741_044_600_000).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
    }
}
