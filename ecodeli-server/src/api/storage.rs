//! Warehouses, storage boxes and box reservations

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::geo::GeoPoint;
use shared::models::{
    AccessRequest, BoxCreate, BoxSearchQuery, BoxUpdate, BoxUsage, EscrowStatus, ExtendRequest,
    ExtensionStatus, Payment, PaymentIntentInfo, PaymentKind, QuoteQuery, Reservation,
    ReservationExtension, ReservationStatus, ReserveRequest, StorageBox, Warehouse,
    WarehouseCreate,
};
use shared::pricing::{StorageQuote, extension_price, storage_quote};
use shared::util::{alphanumeric_code, now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::auth::user_auth::authenticate;
use crate::db;
use crate::error::internal;
use crate::services::escrow::{self, NewPayment};
use crate::state::AppState;

use super::{ApiResult, checkout_intent};

const ACCESS_CODE_LEN: usize = 6;

#[derive(Debug, Serialize)]
pub struct ReservationCheckout {
    pub reservation: Reservation,
    pub quote: StorageQuote,
    pub intent: Option<PaymentIntentInfo>,
}

async fn load_owned(state: &AppState, id: i64, user: &CurrentUser) -> Result<Reservation, AppError> {
    let reservation = db::storage::find_reservation(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::ReservationNotFound))?;
    if reservation.client_id != user.id && !user.is_admin() {
        return Err(AppError::not_owner());
    }
    Ok(reservation)
}

fn status_of(reservation: &Reservation) -> Result<ReservationStatus, AppError> {
    reservation
        .status()
        .ok_or_else(|| AppError::internal("Unknown reservation status"))
}

// ── Public ──

/// GET /api/storage/warehouses
pub async fn warehouses(State(state): State<AppState>) -> ApiResult<Vec<Warehouse>> {
    let rows = db::storage::list_warehouses(&state.pool)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// GET /api/storage/boxes
pub async fn search_boxes(
    State(state): State<AppState>,
    Query(q): Query<BoxSearchQuery>,
) -> ApiResult<Vec<StorageBox>> {
    if q.start_date.zip(q.end_date).is_some_and(|(start, end)| end <= start) {
        return Err(AppError::new(ErrorCode::InvalidDateRange));
    }
    let rows = db::storage::search_boxes(&state.pool, &q)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// GET /api/storage/quote
///
/// Anonymous callers get no loyalty discount.
pub async fn quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<QuoteQuery>,
) -> ApiResult<StorageQuote> {
    let storage_box = db::storage::find_box(&state.pool, q.box_id)
        .await
        .map_err(internal)?
        .filter(|b| b.is_active)
        .ok_or_else(|| AppError::new(ErrorCode::StorageBoxNotFound))?;
    let completed = match authenticate(&headers, &state.jwt_secret) {
        Ok(user) => db::storage::count_completed(&state.pool, user.id)
            .await
            .map_err(internal)?,
        Err(_) => 0,
    };
    let quote = storage_quote(
        storage_box.price_per_day,
        q.start_date,
        q.end_date,
        now_millis(),
        completed,
    )?;
    Ok(Json(quote))
}

// ── Client ──

/// POST /api/storage/reservations
pub async fn reserve(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ReserveRequest>,
) -> ApiResult<ReservationCheckout> {
    let now = now_millis();
    if req.end_date <= req.start_date {
        return Err(AppError::new(ErrorCode::InvalidDateRange));
    }
    if req.end_date <= now {
        return Err(AppError::with_message(
            ErrorCode::InvalidDateRange,
            "The rental period is already over",
        ));
    }

    let mut tx = state.pool.begin().await.map_err(internal)?;
    let storage_box = db::storage::find_box_for_update(&mut *tx, req.box_id)
        .await
        .map_err(internal)?
        .filter(|b| b.is_active)
        .ok_or_else(|| AppError::new(ErrorCode::StorageBoxNotFound))?;
    if db::storage::has_conflict(&mut *tx, storage_box.id, req.start_date, req.end_date, None)
        .await
        .map_err(internal)?
    {
        return Err(AppError::new(ErrorCode::StorageBoxUnavailable));
    }
    let completed = db::storage::count_completed(&mut *tx, user.id)
        .await
        .map_err(internal)?;
    let quote = storage_quote(storage_box.price_per_day, req.start_date, req.end_date, now, completed)?;

    let mut reservation = Reservation {
        id: snowflake_id(),
        box_id: storage_box.id,
        client_id: user.id,
        start_date: req.start_date,
        end_date: req.end_date,
        status: ReservationStatus::Pending.as_db().to_string(),
        total_price: quote.total,
        access_code: alphanumeric_code(ACCESS_CODE_LEN),
        extended_count: 0,
        payment_id: None,
        created_at: now,
        updated_at: now,
    };
    db::storage::insert_reservation(&mut *tx, &reservation)
        .await
        .map_err(internal)?;
    let payment = escrow::create(
        &mut tx,
        &state.settings.currency,
        NewPayment {
            kind: PaymentKind::Storage,
            reference_id: reservation.id,
            payer_id: user.id,
            payee_id: None,
            amount: quote.total,
        },
        now,
    )
    .await?;
    db::storage::set_reservation_payment(&mut *tx, reservation.id, payment.id, now)
        .await
        .map_err(internal)?;
    reservation.payment_id = Some(payment.id);
    tx.commit().await.map_err(internal)?;

    tracing::info!(
        reservation_id = reservation.id,
        box_id = storage_box.id,
        client_id = user.id,
        total = quote.total,
        "Box reserved"
    );
    let intent = checkout_intent(&state, payment.id).await;
    Ok(Json(ReservationCheckout {
        reservation,
        quote,
        intent,
    }))
}

/// GET /api/storage/reservations
pub async fn mine(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Vec<Reservation>> {
    let rows = db::storage::list_reservations_by_client(&state.pool, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
pub struct ExtensionCheckout {
    pub reservation: Reservation,
    pub extra_days: i64,
    pub extra_price: f64,
    pub payment: Payment,
    pub intent: Option<PaymentIntentInfo>,
}

/// POST /api/storage/reservations/{id}/extend
///
/// The new end applies at once and is charged as a separate payment.
pub async fn extend(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<ExtendRequest>,
) -> ApiResult<ExtensionCheckout> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let reservation = db::storage::find_reservation_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::ReservationNotFound))?;
    if reservation.client_id != user.id {
        return Err(AppError::not_owner());
    }
    let status = status_of(&reservation)?;
    if !status.can_extend() {
        return Err(AppError::new(ErrorCode::ReservationNotActive));
    }
    if req.new_end_date <= reservation.end_date {
        return Err(AppError::new(ErrorCode::InvalidExtension));
    }
    // an unpaid extension must settle first so a failed payment only
    // ever undoes the latest one
    if db::storage::has_unpaid_extension(&mut *tx, reservation.id)
        .await
        .map_err(internal)?
    {
        return Err(AppError::new(ErrorCode::ExtensionPaymentPending));
    }
    let storage_box = db::storage::find_box_for_update(&mut *tx, reservation.box_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::StorageBoxNotFound))?;
    if db::storage::has_conflict(
        &mut *tx,
        storage_box.id,
        reservation.end_date,
        req.new_end_date,
        Some(reservation.id),
    )
    .await
    .map_err(internal)?
    {
        return Err(AppError::new(ErrorCode::StorageBoxUnavailable));
    }

    let (extra_days, extra_price) =
        extension_price(storage_box.price_per_day, reservation.end_date, req.new_end_date);
    let updated = db::storage::extend_reservation(&mut *tx, id, req.new_end_date, extra_price, now)
        .await
        .map_err(internal)?;
    let payment = escrow::create(
        &mut tx,
        &state.settings.currency,
        NewPayment {
            kind: PaymentKind::Storage,
            reference_id: reservation.id,
            payer_id: user.id,
            payee_id: None,
            amount: extra_price,
        },
        now,
    )
    .await?;
    let extension = ReservationExtension {
        id: snowflake_id(),
        reservation_id: reservation.id,
        payment_id: payment.id,
        previous_end_date: reservation.end_date,
        new_end_date: req.new_end_date,
        extra_price,
        status: ExtensionStatus::Pending.as_db().to_string(),
        created_at: now,
        updated_at: now,
    };
    db::storage::insert_extension(&mut *tx, &extension)
        .await
        .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    tracing::info!(reservation_id = id, extra_days, extra_price, "Reservation extended");
    let intent = checkout_intent(&state, payment.id).await;
    Ok(Json(ExtensionCheckout {
        reservation: updated,
        extra_days,
        extra_price,
        payment,
        intent,
    }))
}

/// POST /api/storage/reservations/{id}/access
pub async fn access(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<AccessRequest>,
) -> ApiResult<BoxUsage> {
    let reservation = load_owned(&state, id, &user).await?;
    if reservation.access_code != req.access_code.trim() {
        tracing::warn!(reservation_id = id, user_id = user.id, "Wrong box access code");
        return Err(AppError::new(ErrorCode::InvalidAccessCode));
    }
    let now = now_millis();
    let within_period = (reservation.start_date..=reservation.end_date).contains(&now);
    if !status_of(&reservation)?.grants_access() || !within_period {
        return Err(AppError::new(ErrorCode::ReservationNotActive));
    }

    let usage = BoxUsage {
        id: snowflake_id(),
        reservation_id: reservation.id,
        box_id: reservation.box_id,
        action: "ACCESS".to_string(),
        created_at: now,
    };
    db::storage::insert_usage(&state.pool, &usage)
        .await
        .map_err(internal)?;
    Ok(Json(usage))
}

/// POST /api/storage/reservations/{id}/cancel
///
/// Possible while PENDING or ACTIVE and before the period starts. An
/// unpaid intent is voided, a paid one refunded.
pub async fn cancel(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Reservation> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let mut reservation = db::storage::find_reservation_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::ReservationNotFound))?;
    if reservation.client_id != user.id && !user.is_admin() {
        return Err(AppError::not_owner());
    }
    reservation.ensure_cancellable(now)?;

    db::storage::set_reservation_status(&mut *tx, id, ReservationStatus::Cancelled, now)
        .await
        .map_err(internal)?;
    if let Some(payment_id) = reservation.payment_id {
        let payment = db::payments::find_for_update(&mut *tx, payment_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))?;
        match payment.status() {
            Some(s) if s.is_uncaptured() => {
                escrow::void(&state, &mut tx, &payment, Some(user.id), now).await?;
            }
            Some(EscrowStatus::Held | EscrowStatus::Released) => {
                escrow::refund(&state, &mut tx, &payment, None, Some("reservation cancelled"), Some(user.id), now)
                    .await?;
            }
            _ => {}
        }
    }
    db::audit::log(&mut *tx, Some(user.id), "reservation_cancelled", Some(id), None, None, now)
        .await
        .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    reservation.status = ReservationStatus::Cancelled.as_db().to_string();
    reservation.updated_at = now;
    tracing::info!(reservation_id = id, "Reservation cancelled");
    Ok(Json(reservation))
}

/// GET /api/storage/reservations/{id}/usages
pub async fn usages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Vec<BoxUsage>> {
    let reservation = load_owned(&state, id, &user).await?;
    let rows = db::storage::list_usages(&state.pool, reservation.id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

// ── Admin ──

/// POST /api/admin/warehouses
pub async fn create_warehouse(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<WarehouseCreate>,
) -> ApiResult<Warehouse> {
    GeoPoint::new(req.latitude, req.longitude).validate()?;
    if req.name.trim().is_empty() || req.city.trim().is_empty() {
        return Err(AppError::validation("name and city are required"));
    }
    let warehouse = Warehouse {
        id: snowflake_id(),
        name: req.name.trim().to_string(),
        address: req.address,
        city: req.city.trim().to_string(),
        latitude: req.latitude,
        longitude: req.longitude,
        is_active: true,
        created_at: now_millis(),
    };
    db::storage::insert_warehouse(&state.pool, &warehouse)
        .await
        .map_err(internal)?;
    tracing::info!(warehouse_id = warehouse.id, admin_id = user.id, "Warehouse created");
    Ok(Json(warehouse))
}

/// POST /api/admin/warehouses/{id}/boxes
pub async fn create_box(
    State(state): State<AppState>,
    Path(warehouse_id): Path<i64>,
    Json(req): Json<BoxCreate>,
) -> ApiResult<StorageBox> {
    db::storage::find_warehouse(&state.pool, warehouse_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::WarehouseNotFound))?;
    if req.box_number.trim().is_empty() {
        return Err(AppError::validation("box_number is required"));
    }
    if req.size_m3 <= 0.0 || req.price_per_day < 0.0 {
        return Err(AppError::new(ErrorCode::ValueOutOfRange));
    }

    let storage_box = StorageBox {
        id: snowflake_id(),
        warehouse_id,
        box_number: req.box_number.trim().to_string(),
        size_m3: req.size_m3,
        box_type: req.box_type.as_db().to_string(),
        features: req.features,
        price_per_day: req.price_per_day,
        is_active: true,
        created_at: now_millis(),
    };
    match db::storage::insert_box(&state.pool, &storage_box).await {
        Ok(()) => Ok(Json(storage_box)),
        Err(e) if db::is_unique_violation(&e) => Err(AppError::already_exists(format!(
            "Box {} already exists in this warehouse",
            storage_box.box_number
        ))),
        Err(e) => Err(internal(e)),
    }
}

/// PATCH /api/admin/boxes/{id}
pub async fn update_box(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<BoxUpdate>,
) -> ApiResult<StorageBox> {
    if req.price_per_day.is_some_and(|p| p < 0.0) {
        return Err(AppError::new(ErrorCode::ValueOutOfRange));
    }
    let updated = db::storage::update_box(&state.pool, id, &req)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::StorageBoxNotFound))?;
    Ok(Json(updated))
}
