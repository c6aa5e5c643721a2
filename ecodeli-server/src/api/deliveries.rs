//! Deliveries: status flow, GPS tracking and handover validation

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::geo::{GeoPoint, Geofence, NEARBY_RADIUS_KM};
use shared::models::{
    AnnouncementStatus, ClientDeliveryView, Delivery, DeliveryPosition, DeliveryStatus,
    EscrowStatus, MAX_VALIDATION_ATTEMPTS, NotificationKind, PaymentKind, TrackingEvent,
    TrackingInfo, UpdateDeliveryStatusRequest, ValidateDeliveryRequest,
};
use shared::util::{now_millis, snowflake_id};
use sqlx::PgConnection;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::internal;
use crate::services::{escrow, notify};
use crate::state::AppState;

use super::ApiResult;

/// Wrong codes allowed per delivery inside the window below
const VALIDATION_RATE_MAX: u32 = 5;
const VALIDATION_RATE_WINDOW_SECS: u64 = 15 * 60;

/// A delivery as its caller may see it: the client gets the handover code
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DeliveryView {
    Client(ClientDeliveryView),
    Other(Delivery),
}

impl DeliveryView {
    fn for_user(delivery: Delivery, user: &CurrentUser) -> Self {
        if delivery.client_id == user.id {
            let validation_code = delivery.validation_code.clone();
            Self::Client(ClientDeliveryView {
                delivery,
                validation_code,
            })
        } else {
            Self::Other(delivery)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryListQuery {
    pub status: Option<DeliveryStatus>,
}

fn status_of(d: &Delivery) -> Result<DeliveryStatus, AppError> {
    d.status()
        .ok_or_else(|| AppError::internal("Unknown delivery status"))
}

fn is_participant(d: &Delivery, user: &CurrentUser) -> bool {
    d.client_id == user.id || d.deliverer_id == user.id || user.is_admin()
}

async fn load(state: &AppState, id: i64) -> Result<Delivery, AppError> {
    db::deliveries::find(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::DeliveryNotFound))
}

async fn record_event(
    conn: &mut PgConnection,
    delivery_id: i64,
    status: DeliveryStatus,
    note: Option<String>,
    location: Option<GeoPoint>,
    now: i64,
) -> Result<(), AppError> {
    let event = TrackingEvent {
        id: snowflake_id(),
        delivery_id,
        status: status.as_db().to_string(),
        note,
        latitude: location.map(|p| p.latitude),
        longitude: location.map(|p| p.longitude),
        created_at: now,
    };
    db::deliveries::insert_event(&mut *conn, &event)
        .await
        .map_err(internal)
}

/// GET /api/deliveries
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(q): Query<DeliveryListQuery>,
) -> ApiResult<Vec<DeliveryView>> {
    let rows = db::deliveries::list_for_user(&state.pool, user.id, q.status)
        .await
        .map_err(internal)?;
    Ok(Json(
        rows.into_iter()
            .map(|d| DeliveryView::for_user(d, &user))
            .collect(),
    ))
}

/// GET /api/deliveries/{id}
pub async fn get(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<DeliveryView> {
    let delivery = load(&state, id).await?;
    if !is_participant(&delivery, &user) {
        return Err(AppError::new(ErrorCode::NotResourceOwner));
    }
    Ok(Json(DeliveryView::for_user(delivery, &user)))
}

/// PUT /api/deliveries/{id}/status
///
/// Driven by the assigned deliverer. PICKED_UP captures the escrow,
/// CANCELLED puts the announcement back on the market when the parcel
/// was not picked up yet. DELIVERED only happens through validation.
pub async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateDeliveryStatusRequest>,
) -> ApiResult<Delivery> {
    if req.status == DeliveryStatus::Delivered {
        return Err(AppError::invalid_request(
            "Deliveries become DELIVERED through code validation",
        ));
    }
    if let Some(location) = req.location {
        location.validate()?;
    }

    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let delivery = db::deliveries::find_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::DeliveryNotFound))?;
    if delivery.deliverer_id != user.id {
        return Err(AppError::new(ErrorCode::DeliveryNotAssigned));
    }
    let current = status_of(&delivery)?;
    if !current.can_transition_to(req.status) {
        return Err(AppError::invalid_transition(current.as_db(), req.status.as_db()));
    }

    let announcement = db::announcements::find_for_update(&mut *tx, delivery.announcement_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::AnnouncementNotFound))?;
    let announcement_status = announcement
        .status()
        .ok_or_else(|| AppError::internal("Unknown announcement status"))?;

    match req.status {
        DeliveryStatus::PickedUp => {
            let payment = db::payments::find_by_reference(&mut *tx, PaymentKind::Delivery, id)
                .await
                .map_err(internal)?
                .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))?;
            let payment = db::payments::find_for_update(&mut *tx, payment.id)
                .await
                .map_err(internal)?
                .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))?;
            escrow::capture(&state, &mut tx, &payment, user.id, now).await?;
            if announcement_status.can_transition_to(AnnouncementStatus::InTransit) {
                db::announcements::set_status(&mut *tx, announcement.id, AnnouncementStatus::InTransit, now)
                    .await
                    .map_err(internal)?;
            }
        }
        DeliveryStatus::Cancelled => {
            if announcement_status == AnnouncementStatus::Assigned {
                db::announcements::reopen(&mut *tx, announcement.id, now)
                    .await
                    .map_err(internal)?;
            } else if announcement_status.can_transition_to(AnnouncementStatus::Cancelled) {
                db::announcements::set_status(&mut *tx, announcement.id, AnnouncementStatus::Cancelled, now)
                    .await
                    .map_err(internal)?;
            }
            escrow::cancel_for_reference(&state, &mut tx, PaymentKind::Delivery, id, Some(user.id), now)
                .await?;
        }
        _ => {}
    }

    db::deliveries::set_status(&mut *tx, id, req.status, now)
        .await
        .map_err(internal)?;
    record_event(&mut tx, id, req.status, req.note, req.location, now).await?;
    notify::send(
        &mut *tx,
        delivery.client_id,
        NotificationKind::DeliveryStatus,
        "Delivery update",
        format!("Delivery {} is now {}", delivery.tracking_code, req.status),
        Some(id),
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    if req.status.is_terminal() {
        state.live.evict(id);
    }
    tracing::info!(delivery_id = id, from = %current, to = %req.status, "Delivery status changed");
    Ok(Json(load(&state, id).await?))
}

#[derive(Debug, Serialize)]
pub struct PositionAck {
    pub status: DeliveryStatus,
    /// Set when this fix moved the delivery to NEARBY
    pub became_nearby: bool,
}

/// POST /api/deliveries/{id}/position
///
/// A fix inside the destination geofence moves an IN_TRANSIT delivery to
/// NEARBY.
pub async fn update_position(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(point): Json<GeoPoint>,
) -> ApiResult<PositionAck> {
    point.validate()?;
    let delivery = load(&state, id).await?;
    if delivery.deliverer_id != user.id {
        return Err(AppError::new(ErrorCode::DeliveryNotAssigned));
    }
    let status = status_of(&delivery)?;
    if !status.is_in_progress() {
        return Err(AppError::business_rule(format!(
            "Positions are only tracked while the parcel is carried, delivery is {status}"
        )));
    }

    let now = now_millis();
    let position = DeliveryPosition {
        delivery_id: id,
        latitude: point.latitude,
        longitude: point.longitude,
        recorded_at: now,
    };
    db::deliveries::insert_position(&state.pool, &position)
        .await
        .map_err(internal)?;
    state.live.update(position);

    let arrived = Geofence::new(delivery.destination(), NEARBY_RADIUS_KM).contains(point);
    if status != DeliveryStatus::InTransit || !arrived {
        return Ok(Json(PositionAck {
            status,
            became_nearby: false,
        }));
    }

    let mut tx = state.pool.begin().await.map_err(internal)?;
    let locked = db::deliveries::find_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::DeliveryNotFound))?;
    // another request may have moved it meanwhile
    if locked.status() != Some(DeliveryStatus::InTransit) {
        return Ok(Json(PositionAck {
            status: status_of(&locked)?,
            became_nearby: false,
        }));
    }
    db::deliveries::set_status(&mut *tx, id, DeliveryStatus::Nearby, now)
        .await
        .map_err(internal)?;
    record_event(
        &mut tx,
        id,
        DeliveryStatus::Nearby,
        Some("Entered destination area".to_string()),
        Some(point),
        now,
    )
    .await?;
    notify::send(
        &mut *tx,
        delivery.client_id,
        NotificationKind::DeliveryStatus,
        "Deliverer nearby",
        format!("Delivery {} is almost there", delivery.tracking_code),
        Some(id),
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    tracing::info!(delivery_id = id, "Delivery entered destination geofence");
    Ok(Json(PositionAck {
        status: DeliveryStatus::Nearby,
        became_nearby: true,
    }))
}

/// GET /api/deliveries/{id}/live
pub async fn live_position(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Option<DeliveryPosition>> {
    let delivery = load(&state, id).await?;
    if !is_participant(&delivery, &user) {
        return Err(AppError::new(ErrorCode::NotResourceOwner));
    }
    Ok(Json(last_position(&state, id).await?))
}

async fn last_position(state: &AppState, id: i64) -> Result<Option<DeliveryPosition>, AppError> {
    if let Some(position) = state.live.get(id) {
        return Ok(Some(position));
    }
    db::deliveries::latest_position(&state.pool, id)
        .await
        .map_err(internal)
}

/// GET /api/deliveries/{id}/tracking
pub async fn tracking_events(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Vec<TrackingEvent>> {
    let delivery = load(&state, id).await?;
    if !is_participant(&delivery, &user) {
        return Err(AppError::new(ErrorCode::NotResourceOwner));
    }
    let events = db::deliveries::list_events(&state.pool, id)
        .await
        .map_err(internal)?;
    Ok(Json(events))
}

/// GET /api/tracking/{code}
///
/// Public view for whoever holds the tracking code.
pub async fn public_tracking(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<TrackingInfo> {
    let delivery = db::deliveries::find_by_tracking_code(&state.pool, code.trim())
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::DeliveryNotFound))?;
    let events = db::deliveries::list_events(&state.pool, delivery.id)
        .await
        .map_err(internal)?;
    let last_position = last_position(&state, delivery.id).await?;
    Ok(Json(TrackingInfo {
        tracking_code: delivery.tracking_code,
        status: delivery.status,
        events,
        last_position,
    }))
}

#[derive(Debug, Serialize)]
pub struct ValidationResult {
    pub delivery: Delivery,
    /// Whether the escrow was paid out right away
    pub payment_released: bool,
}

/// POST /api/deliveries/{id}/validate
///
/// The deliverer enters the code the client received. A match closes the
/// delivery and the announcement and releases the escrow when the minimum
/// hold has passed; otherwise the auto-release job pays out later.
pub async fn validate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<ValidateDeliveryRequest>,
) -> ApiResult<ValidationResult> {
    let delivery = load(&state, id).await?;
    delivery.ensure_can_validate(user.id)?;

    // only wrong codes count against the window
    let limiter_key = id.to_string();
    if state
        .rate_limiter
        .is_exhausted("delivery_validation", &limiter_key, VALIDATION_RATE_MAX)
        .await
    {
        tracing::warn!(delivery_id = id, "Validation attempts rate limited");
        return Err(AppError::new(ErrorCode::TooManyRequests));
    }

    let now = now_millis();
    if req.code.trim() != delivery.validation_code {
        state
            .rate_limiter
            .check("delivery_validation", &limiter_key, VALIDATION_RATE_MAX, VALIDATION_RATE_WINDOW_SECS)
            .await;
        let attempts = db::deliveries::record_failed_validation(&state.pool, id, now)
            .await
            .map_err(internal)?;
        tracing::warn!(delivery_id = id, attempts, "Wrong validation code");
        return Err(AppError::new(ErrorCode::InvalidValidationCode)
            .with_detail("remaining_attempts", (MAX_VALIDATION_ATTEMPTS - attempts).max(0)));
    }

    let mut tx = state.pool.begin().await.map_err(internal)?;
    let locked = db::deliveries::find_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::DeliveryNotFound))?;
    // the status may have moved since the unlocked read
    locked.ensure_can_validate(user.id)?;

    db::deliveries::mark_validated(&mut *tx, id, req.proof_photo_url.as_deref(), now)
        .await
        .map_err(internal)?;
    record_event(&mut tx, id, DeliveryStatus::Delivered, Some("Code validated".to_string()), None, now)
        .await?;

    let announcement = db::announcements::find_for_update(&mut *tx, delivery.announcement_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::AnnouncementNotFound))?;
    if announcement
        .status()
        .is_some_and(|s| s.can_transition_to(AnnouncementStatus::Delivered))
    {
        db::announcements::set_status(&mut *tx, announcement.id, AnnouncementStatus::Delivered, now)
            .await
            .map_err(internal)?;
    }

    let mut payment_released = false;
    if let Some(found) = db::payments::find_by_reference(&mut *tx, PaymentKind::Delivery, id)
        .await
        .map_err(internal)?
    {
        let payment = db::payments::find_for_update(&mut *tx, found.id)
            .await
            .map_err(internal)?
            .ok_or_else(|| AppError::new(ErrorCode::PaymentNotFound))?;
        if payment.status() == Some(EscrowStatus::Held) {
            payment_released =
                escrow::try_release(&state.settings, &mut tx, &payment, Some(user.id), now).await?;
        }
    }

    notify::send(
        &mut *tx,
        delivery.client_id,
        NotificationKind::DeliveryStatus,
        "Delivered",
        format!("Delivery {} was handed over", delivery.tracking_code),
        Some(id),
        now,
    )
    .await
    .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    state.live.evict(id);
    tracing::info!(delivery_id = id, payment_released, "Delivery validated");
    Ok(Json(ValidationResult {
        delivery: load(&state, id).await?,
        payment_released,
    }))
}
