//! Deliverer planned routes, route optimization and route search

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::geo::GeoPoint;
use shared::models::{
    Announcement, AnnouncementStatus, PlannedRoute, PlannedRouteCreate, RouteOptimizationRequest,
    RouteSearchQuery,
};
use shared::routing::{
    DelivererStats, DetourEvaluation, OptimizedRoute, PickupWindow, evaluate_trip_detour,
    optimize_delivery_route, route_compatibility,
};
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::db;
use crate::error::internal;
use crate::state::AppState;

use super::ApiResult;

const DEFAULT_MAX_DETOUR_KM: f64 = 15.0;
const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_OPTIMIZED_STOPS: usize = 50;
/// Open announcements scanned for a route
const ROUTE_SCAN_LIMIT: i64 = 500;

/// POST /api/deliverer/routes
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<PlannedRouteCreate>,
) -> ApiResult<PlannedRoute> {
    req.departure.validate()?;
    req.arrival.validate()?;
    if req.departure_address.trim().is_empty() || req.arrival_address.trim().is_empty() {
        return Err(AppError::validation("departure and arrival addresses are required"));
    }
    let now = now_millis();
    if req.departure_time <= now {
        return Err(AppError::validation("departure_time must be in the future"));
    }
    if req.max_capacity_m3 <= 0.0
        || req.available_capacity_m3 < 0.0
        || req.available_capacity_m3 > req.max_capacity_m3
    {
        return Err(AppError::validation(
            "available capacity must be between 0 and the maximum capacity",
        ));
    }
    if req.corridor_km <= 0.0 {
        return Err(AppError::validation("corridor_km must be positive"));
    }

    let route = PlannedRoute {
        id: snowflake_id(),
        deliverer_id: user.id,
        departure_address: req.departure_address,
        departure_latitude: req.departure.latitude,
        departure_longitude: req.departure.longitude,
        arrival_address: req.arrival_address,
        arrival_latitude: req.arrival.latitude,
        arrival_longitude: req.arrival.longitude,
        departure_time: req.departure_time,
        available_capacity_m3: req.available_capacity_m3,
        max_capacity_m3: req.max_capacity_m3,
        corridor_km: req.corridor_km,
        is_active: true,
        created_at: now,
    };
    db::routes::insert(&state.pool, &route)
        .await
        .map_err(internal)?;
    tracing::info!(route_id = route.id, deliverer_id = user.id, "Planned route created");
    Ok(Json(route))
}

/// GET /api/deliverer/routes
pub async fn list_mine(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Vec<PlannedRoute>> {
    let rows = db::routes::list_by_deliverer(&state.pool, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// DELETE /api/deliverer/routes/{id}
pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<bool> {
    let removed = db::routes::deactivate(&state.pool, id, user.id)
        .await
        .map_err(internal)?;
    if !removed {
        return Err(AppError::new(ErrorCode::RouteNotFound));
    }
    Ok(Json(true))
}

/// POST /api/deliverer/route-optimization
pub async fn optimize(
    _user: CurrentUser,
    Json(req): Json<RouteOptimizationRequest>,
) -> ApiResult<OptimizedRoute> {
    req.start.validate()?;
    if req.stops.is_empty() {
        return Err(AppError::validation("at least one stop is required"));
    }
    if req.stops.len() > MAX_OPTIMIZED_STOPS {
        return Err(AppError::new(ErrorCode::ValueOutOfRange)
            .with_detail("max_stops", MAX_OPTIMIZED_STOPS));
    }
    for stop in &req.stops {
        stop.location.validate()?;
    }
    Ok(Json(optimize_delivery_route(req.start, &req.stops, now_millis())))
}

#[derive(Debug, Serialize)]
pub struct RouteMatch {
    pub route: PlannedRoute,
    pub evaluation: DetourEvaluation,
}

/// GET /api/routes/search
///
/// Upcoming planned trips that can carry a parcel from pickup to delivery,
/// best score first.
pub async fn search(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(q): Query<RouteSearchQuery>,
) -> ApiResult<Vec<RouteMatch>> {
    let pickup = GeoPoint::new(q.pickup_latitude, q.pickup_longitude);
    let delivery = GeoPoint::new(q.delivery_latitude, q.delivery_longitude);
    pickup.validate()?;
    delivery.validate()?;
    let max_detour = q.max_detour_km.unwrap_or(DEFAULT_MAX_DETOUR_KM);
    let limit = q.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(50);

    let now = now_millis();
    let routes = db::routes::list_upcoming(&state.pool, now, None)
        .await
        .map_err(internal)?;
    if routes.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let mut deliverer_ids: Vec<i64> = routes.iter().map(|r| r.deliverer_id).collect();
    deliverer_ids.sort_unstable();
    deliverer_ids.dedup();
    let ratings: HashMap<i64, f64> = db::reviews::average_ratings(&state.pool, &deliverer_ids)
        .await
        .map_err(internal)?
        .into_iter()
        .collect();
    let completed: HashMap<i64, i64> = db::deliveries::completed_counts(&state.pool, &deliverer_ids)
        .await
        .map_err(internal)?
        .into_iter()
        .collect();

    let mut found: Vec<RouteMatch> = routes
        .into_iter()
        .filter_map(|route| {
            let stats = DelivererStats {
                average_rating: ratings.get(&route.deliverer_id).copied(),
                total_deliveries: completed.get(&route.deliverer_id).copied().unwrap_or(0),
                on_time_rate: None,
            };
            let evaluation = evaluate_trip_detour(
                &route.as_trip(),
                pickup,
                delivery,
                q.departure_time,
                max_detour,
                Some(stats),
            );
            evaluation
                .compatible
                .then_some(RouteMatch { route, evaluation })
        })
        .collect();

    found.sort_by(|a, b| b.evaluation.score.cmp(&a.evaluation.score));
    found.truncate(limit);
    Ok(Json(found))
}

#[derive(Debug, Serialize)]
pub struct RouteAnnouncement {
    pub announcement: Announcement,
    pub compatibility: u32,
}

/// GET /api/deliverer/routes/{id}/announcements
///
/// Open announcements picked up inside the route's geofences, ranked by
/// how well pickup place and time fit the departure.
pub async fn announcements_on_route(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Vec<RouteAnnouncement>> {
    let route = db::routes::find(&state.pool, id)
        .await
        .map_err(internal)?
        .filter(|r| r.deliverer_id == user.id && r.is_active)
        .ok_or_else(|| AppError::new(ErrorCode::RouteNotFound))?;

    let open = db::announcements::list(&state.pool, Some(AnnouncementStatus::Open), None, ROUTE_SCAN_LIMIT, 0)
        .await
        .map_err(internal)?;

    let mut matches: Vec<RouteAnnouncement> = open
        .into_iter()
        .filter(|a| a.client_id != user.id && route.covers(a.pickup()))
        .map(|announcement| {
            let window = PickupWindow {
                location: announcement.pickup(),
                pickup_time: announcement.pickup_date.unwrap_or(route.departure_time),
            };
            let compatibility = route_compatibility(route.departure(), route.departure_time, &[window]);
            RouteAnnouncement {
                announcement,
                compatibility,
            }
        })
        .collect();
    matches.sort_by(|a, b| b.compatibility.cmp(&a.compatibility));
    Ok(Json(matches))
}
