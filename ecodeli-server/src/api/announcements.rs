//! Delivery announcements, deliverer applications and matching

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::geo::{GeoPoint, haversine_km};
use shared::matching::{DelivererCandidate, DelivererMatch, MatchingCriteria, VehicleCapacity, find_matches};
use shared::models::{
    Announcement, AnnouncementQuery, AnnouncementStatus, Application, ApplicationStatus,
    ApplyRequest, ClientDeliveryView, CreateAnnouncementRequest, Delivery, DeliveryStatus,
    NotificationKind, Payment, PaymentIntentInfo, PaymentKind, TrackingEvent,
    UpdateAnnouncementRequest, UserStatus,
};
use shared::pricing::{PackageTraits, suggest_delivery_price};
use shared::util::{now_millis, numeric_code, snowflake_id, tracking_code};

use crate::auth::CurrentUser;
use crate::db;
use crate::error::internal;
use crate::services::{escrow, notify};
use crate::state::AppState;

use super::{ApiResult, checkout_intent, page};

const MAX_MATCHES: usize = 20;
const RECENT_RATINGS: i64 = 5;
const VALIDATION_CODE_LEN: usize = 6;

fn status_of(a: &Announcement) -> Result<AnnouncementStatus, AppError> {
    a.status()
        .ok_or_else(|| AppError::internal("Unknown announcement status"))
}

fn ensure_owner(a: &Announcement, user: &CurrentUser) -> Result<(), AppError> {
    if a.client_id == user.id {
        Ok(())
    } else {
        Err(AppError::not_owner())
    }
}

async fn load(state: &AppState, id: i64) -> Result<Announcement, AppError> {
    db::announcements::find(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::AnnouncementNotFound))
}

fn positive_price(price: Option<f64>) -> Result<(), AppError> {
    if price.is_some_and(|p| !p.is_finite() || p <= 0.0) {
        return Err(AppError::validation("price must be positive"));
    }
    Ok(())
}

/// POST /api/announcements
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateAnnouncementRequest>,
) -> ApiResult<Announcement> {
    if !user.role.can_publish_announcements() {
        return Err(AppError::new(ErrorCode::RoleRequired)
            .with_detail("required", vec!["CLIENT", "MERCHANT"]));
    }
    if req.title.trim().is_empty() {
        return Err(AppError::validation("title is required"));
    }
    if req.pickup_address.trim().is_empty() || req.delivery_address.trim().is_empty() {
        return Err(AppError::validation("pickup and delivery addresses are required"));
    }
    req.pickup.validate()?;
    req.destination.validate()?;
    if !req.weight_kg.is_finite() || req.weight_kg <= 0.0 {
        return Err(AppError::validation("weight_kg must be positive"));
    }
    positive_price(req.price)?;
    if req
        .pickup_date
        .zip(req.delivery_date)
        .is_some_and(|(pickup, delivery)| delivery < pickup)
    {
        return Err(AppError::validation("delivery_date is before pickup_date"));
    }

    let now = now_millis();
    let distance_km = haversine_km(req.pickup, req.destination);
    let traits = PackageTraits {
        weight_kg: req.weight_kg,
        fragile: req.fragile,
        requires_cooling: req.requires_cooling,
        priority: req.priority,
    };
    let suggested_price = req
        .price
        .unwrap_or_else(|| suggest_delivery_price(distance_km, &traits));

    let announcement = Announcement {
        id: snowflake_id(),
        client_id: user.id,
        title: req.title.trim().to_string(),
        description: req.description,
        announcement_type: req.announcement_type.as_db().to_string(),
        status: AnnouncementStatus::Open.as_db().to_string(),
        priority: req.priority.as_db().to_string(),
        pickup_address: req.pickup_address,
        pickup_latitude: req.pickup.latitude,
        pickup_longitude: req.pickup.longitude,
        delivery_address: req.delivery_address,
        delivery_latitude: req.destination.latitude,
        delivery_longitude: req.destination.longitude,
        pickup_date: req.pickup_date,
        delivery_date: req.delivery_date,
        weight_kg: req.weight_kg,
        length_cm: req.length_cm,
        width_cm: req.width_cm,
        height_cm: req.height_cm,
        fragile: req.fragile,
        requires_cooling: req.requires_cooling,
        suggested_price,
        final_price: None,
        negotiable: req.negotiable,
        distance_km,
        deliverer_id: None,
        created_at: now,
        updated_at: now,
    };
    db::announcements::insert(&state.pool, &announcement)
        .await
        .map_err(internal)?;

    tracing::info!(
        announcement_id = announcement.id,
        client_id = user.id,
        distance_km,
        "Announcement published"
    );
    Ok(Json(announcement))
}

/// GET /api/announcements
///
/// With `latitude`, `longitude` and `radius_km` only announcements whose
/// pickup lies within the radius are returned.
pub async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(q): Query<AnnouncementQuery>,
) -> ApiResult<Vec<Announcement>> {
    let (limit, offset) = page(q.limit, q.offset);
    let rows = db::announcements::list(&state.pool, q.status, q.announcement_type, limit, offset)
        .await
        .map_err(internal)?;

    let rows = match (q.latitude, q.longitude, q.radius_km) {
        (Some(lat), Some(lng), Some(radius)) => {
            let center = GeoPoint::new(lat, lng);
            center.validate()?;
            rows.into_iter()
                .filter(|a| haversine_km(center, a.pickup()) <= radius)
                .collect()
        }
        _ => rows,
    };
    Ok(Json(rows))
}

/// GET /api/announcements/mine
pub async fn list_mine(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Vec<Announcement>> {
    let rows = db::announcements::list_by_client(&state.pool, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// GET /api/announcements/{id}
pub async fn get(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Announcement> {
    Ok(Json(load(&state, id).await?))
}

/// PUT /api/announcements/{id}
pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAnnouncementRequest>,
) -> ApiResult<Announcement> {
    let current = load(&state, id).await?;
    ensure_owner(&current, &user)?;
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::validation("title cannot be empty"));
    }
    positive_price(req.price)?;

    let updated = db::announcements::update(&state.pool, id, &req, now_millis())
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::AnnouncementNotOpen))?;
    Ok(Json(updated))
}

/// POST /api/announcements/{id}/cancel
///
/// Cancels the running delivery too and voids or refunds its escrow.
pub async fn cancel(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Announcement> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;

    let announcement = db::announcements::find_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::AnnouncementNotFound))?;
    if !user.is_admin() {
        ensure_owner(&announcement, &user)?;
    }
    let status = status_of(&announcement)?;
    if !status.can_transition_to(AnnouncementStatus::Cancelled) {
        return Err(AppError::invalid_transition(
            status.as_db(),
            AnnouncementStatus::Cancelled.as_db(),
        ));
    }
    db::announcements::set_status(&mut *tx, id, AnnouncementStatus::Cancelled, now)
        .await
        .map_err(internal)?;

    if let Some(delivery) = db::deliveries::find_open_for_announcement(&mut *tx, id)
        .await
        .map_err(internal)?
    {
        db::deliveries::set_status(&mut *tx, delivery.id, DeliveryStatus::Cancelled, now)
            .await
            .map_err(internal)?;
        let event = TrackingEvent {
            id: snowflake_id(),
            delivery_id: delivery.id,
            status: DeliveryStatus::Cancelled.as_db().to_string(),
            note: Some("Announcement cancelled".to_string()),
            latitude: None,
            longitude: None,
            created_at: now,
        };
        db::deliveries::insert_event(&mut *tx, &event)
            .await
            .map_err(internal)?;
        escrow::cancel_for_reference(&state, &mut tx, PaymentKind::Delivery, delivery.id, Some(user.id), now)
            .await?;
        notify::send(
            &mut *tx,
            delivery.deliverer_id,
            NotificationKind::DeliveryStatus,
            "Delivery cancelled",
            format!("The announcement \"{}\" was cancelled", announcement.title),
            Some(delivery.id),
            now,
        )
        .await
        .map_err(internal)?;
        state.live.evict(delivery.id);
    }

    db::audit::log(&mut *tx, Some(user.id), "announcement_cancelled", Some(id), None, None, now)
        .await
        .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    tracing::info!(announcement_id = id, user_id = user.id, "Announcement cancelled");
    Ok(Json(load(&state, id).await?))
}

// ==================== Applications ====================

/// POST /api/announcements/{id}/applications
pub async fn apply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<ApplyRequest>,
) -> ApiResult<Application> {
    let deliverer = db::users::find_by_id(&state.pool, user.id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    if !deliverer.is_verified || deliverer.status() != Some(UserStatus::Active) {
        return Err(AppError::new(ErrorCode::VerificationRequired));
    }

    let announcement = load(&state, id).await?;
    if status_of(&announcement)? != AnnouncementStatus::Open {
        return Err(AppError::new(ErrorCode::AnnouncementNotOpen));
    }
    if announcement.client_id == user.id {
        return Err(AppError::business_rule("Cannot apply to your own announcement"));
    }
    positive_price(req.proposed_price)?;
    if req.proposed_price.is_some() && !announcement.negotiable {
        return Err(AppError::business_rule("This announcement does not accept price proposals"));
    }

    let now = now_millis();
    let application = Application {
        id: snowflake_id(),
        announcement_id: id,
        deliverer_id: user.id,
        proposed_price: req.proposed_price.unwrap_or(announcement.suggested_price),
        message: req.message,
        status: ApplicationStatus::Pending.as_db().to_string(),
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = db::announcements::insert_application(&state.pool, &application).await {
        if db::is_unique_violation(&e) {
            return Err(AppError::new(ErrorCode::ApplicationAlreadyExists));
        }
        return Err(internal(e));
    }

    notify::send(
        &state.pool,
        announcement.client_id,
        NotificationKind::ApplicationReceived,
        "New application",
        format!("A deliverer applied to \"{}\"", announcement.title),
        Some(id),
        now,
    )
    .await
    .map_err(internal)?;

    tracing::info!(announcement_id = id, deliverer_id = user.id, "Application submitted");
    Ok(Json(application))
}

/// GET /api/announcements/{id}/applications
pub async fn list_applications(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Vec<Application>> {
    let announcement = load(&state, id).await?;
    if !user.is_admin() {
        ensure_owner(&announcement, &user)?;
    }
    let rows = db::announcements::list_applications(&state.pool, id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// GET /api/applications/mine
pub async fn my_applications(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Vec<Application>> {
    let rows = db::announcements::list_applications_by_deliverer(&state.pool, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// Result of accepting an application
#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub delivery: ClientDeliveryView,
    pub payment: Payment,
    /// Absent when the payment provider could not be reached; retry with
    /// `POST /api/payments/{id}/intent`
    pub intent: Option<PaymentIntentInfo>,
}

/// POST /api/announcements/{id}/applications/{application_id}/accept
pub async fn accept(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, application_id)): Path<(i64, i64)>,
) -> ApiResult<AcceptResponse> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;

    let announcement = db::announcements::find_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::AnnouncementNotFound))?;
    ensure_owner(&announcement, &user)?;
    if status_of(&announcement)? != AnnouncementStatus::Open {
        return Err(AppError::new(ErrorCode::AnnouncementNotOpen));
    }

    let application = db::announcements::find_application_for_update(&mut *tx, application_id)
        .await
        .map_err(internal)?
        .filter(|a| a.announcement_id == id)
        .ok_or_else(|| AppError::new(ErrorCode::ApplicationNotFound))?;
    if ApplicationStatus::from_db(&application.status) != Some(ApplicationStatus::Pending) {
        return Err(AppError::invalid_transition(
            application.status.as_str(),
            ApplicationStatus::Accepted.as_db(),
        ));
    }

    db::announcements::set_application_status(&mut *tx, application_id, ApplicationStatus::Accepted, now)
        .await
        .map_err(internal)?;
    let rejected = db::announcements::reject_other_applications(&mut tx, id, application_id, now)
        .await
        .map_err(internal)?;
    db::announcements::assign(&mut *tx, id, application.deliverer_id, application.proposed_price, now)
        .await
        .map_err(internal)?;

    let delivery = Delivery {
        id: snowflake_id(),
        announcement_id: id,
        client_id: announcement.client_id,
        deliverer_id: application.deliverer_id,
        status: DeliveryStatus::Assigned.as_db().to_string(),
        tracking_code: tracking_code(now),
        validation_code: numeric_code(VALIDATION_CODE_LEN),
        price: application.proposed_price,
        pickup_latitude: announcement.pickup_latitude,
        pickup_longitude: announcement.pickup_longitude,
        delivery_latitude: announcement.delivery_latitude,
        delivery_longitude: announcement.delivery_longitude,
        picked_up_at: None,
        delivered_at: None,
        validated_at: None,
        proof_photo_url: None,
        failed_validation_attempts: 0,
        created_at: now,
        updated_at: now,
    };
    db::deliveries::insert(&mut *tx, &delivery)
        .await
        .map_err(internal)?;
    let event = TrackingEvent {
        id: snowflake_id(),
        delivery_id: delivery.id,
        status: DeliveryStatus::Assigned.as_db().to_string(),
        note: None,
        latitude: None,
        longitude: None,
        created_at: now,
    };
    db::deliveries::insert_event(&mut *tx, &event)
        .await
        .map_err(internal)?;

    let payment = escrow::create(
        &mut tx,
        &state.settings.currency,
        escrow::NewPayment {
            kind: PaymentKind::Delivery,
            reference_id: delivery.id,
            payer_id: announcement.client_id,
            payee_id: Some(application.deliverer_id),
            amount: application.proposed_price,
        },
        now,
    )
    .await?;

    notify::send(
        &mut *tx,
        application.deliverer_id,
        NotificationKind::DeliveryAssigned,
        "Application accepted",
        format!("You deliver \"{}\", tracking {}", announcement.title, delivery.tracking_code),
        Some(delivery.id),
        now,
    )
    .await
    .map_err(internal)?;
    for deliverer_id in rejected {
        notify::send(
            &mut *tx,
            deliverer_id,
            NotificationKind::DeliveryStatus,
            "Application not selected",
            format!("Another deliverer was chosen for \"{}\"", announcement.title),
            Some(id),
            now,
        )
        .await
        .map_err(internal)?;
    }

    let detail = serde_json::json!({
        "application_id": application_id,
        "deliverer_id": application.deliverer_id,
        "delivery_id": delivery.id,
        "price": application.proposed_price,
    });
    db::audit::log(&mut *tx, Some(user.id), "application_accepted", Some(id), Some(&detail), None, now)
        .await
        .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    tracing::info!(
        announcement_id = id,
        delivery_id = delivery.id,
        deliverer_id = application.deliverer_id,
        "Application accepted"
    );

    let intent = checkout_intent(&state, payment.id).await;
    let validation_code = delivery.validation_code.clone();
    Ok(Json(AcceptResponse {
        delivery: ClientDeliveryView {
            delivery,
            validation_code,
        },
        payment,
        intent,
    }))
}

/// POST /api/applications/{id}/withdraw
pub async fn withdraw_application(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Application> {
    let now = now_millis();
    let mut tx = state.pool.begin().await.map_err(internal)?;
    let mut application = db::announcements::find_application_for_update(&mut *tx, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::ApplicationNotFound))?;
    if application.deliverer_id != user.id {
        return Err(AppError::not_owner());
    }
    if ApplicationStatus::from_db(&application.status) != Some(ApplicationStatus::Pending) {
        return Err(AppError::invalid_transition(
            application.status.as_str(),
            ApplicationStatus::Withdrawn.as_db(),
        ));
    }
    db::announcements::set_application_status(&mut *tx, id, ApplicationStatus::Withdrawn, now)
        .await
        .map_err(internal)?;
    tx.commit().await.map_err(internal)?;

    application.status = ApplicationStatus::Withdrawn.as_db().to_string();
    application.updated_at = now;
    Ok(Json(application))
}

// ==================== Matching ====================

/// GET /api/announcements/{id}/matches
///
/// Ranks verified deliverers for the announcement. Query parameters
/// override the default [`MatchingCriteria`].
pub async fn matches(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(criteria): Query<MatchingCriteria>,
) -> ApiResult<Vec<DelivererMatch>> {
    let announcement = load(&state, id).await?;
    if !user.is_admin() {
        ensure_owner(&announcement, &user)?;
    }
    let now = now_millis();
    let candidates = load_candidates(&state, now).await?;
    let prefs = db::reviews::client_preferences(&state.pool, announcement.client_id)
        .await
        .map_err(internal)?;

    let found = find_matches(&announcement, &candidates, &criteria, &prefs, now, MAX_MATCHES);
    Ok(Json(found))
}

/// Every active, verified deliverer with what the engine needs to score them
async fn load_candidates(state: &AppState, now: i64) -> Result<Vec<DelivererCandidate>, AppError> {
    let deliverers = db::users::list_active_deliverers(&state.pool)
        .await
        .map_err(internal)?;
    if deliverers.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = deliverers.iter().map(|u| u.id).collect();

    let profiles: HashMap<i64, _> = db::users::list_deliverer_profiles(&state.pool, &ids)
        .await
        .map_err(internal)?
        .into_iter()
        .map(|p| (p.user_id, p))
        .collect();
    let averages: HashMap<i64, f64> = db::reviews::average_ratings(&state.pool, &ids)
        .await
        .map_err(internal)?
        .into_iter()
        .collect();
    let completed: HashMap<i64, i64> = db::deliveries::completed_counts(&state.pool, &ids)
        .await
        .map_err(internal)?
        .into_iter()
        .collect();

    let mut recent: HashMap<i64, Vec<i32>> = HashMap::new();
    for (target_id, rating) in db::reviews::recent_ratings(&state.pool, &ids, RECENT_RATINGS)
        .await
        .map_err(internal)?
    {
        recent.entry(target_id).or_default().push(rating);
    }

    let mut routes: HashMap<i64, Vec<_>> = HashMap::new();
    for route in db::routes::list_upcoming(&state.pool, now, Some(&ids))
        .await
        .map_err(internal)?
    {
        routes.entry(route.deliverer_id).or_default().push(route.as_trip());
    }

    let candidates = deliverers
        .into_iter()
        .map(|u| {
            let profile = profiles.get(&u.id);
            DelivererCandidate {
                deliverer_id: u.id,
                location: u.latitude.zip(u.longitude).map(|(lat, lng)| GeoPoint::new(lat, lng)),
                average_rating: averages.get(&u.id).copied(),
                completed_deliveries: completed.get(&u.id).copied().unwrap_or(0),
                recent_ratings: recent.remove(&u.id).unwrap_or_default(),
                vehicle: profile.map(|p| VehicleCapacity {
                    max_weight_kg: Some(p.max_weight_kg),
                    max_volume_m3: Some(p.max_volume_m3),
                    careful_handling: p.careful_handling,
                    refrigerated: p.refrigerated,
                }),
                routes: routes.remove(&u.id).unwrap_or_default(),
                accepts_negotiation: profile.is_some_and(|p| p.accepts_negotiation),
            }
        })
        .collect();
    Ok(candidates)
}
