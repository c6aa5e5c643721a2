//! API routes for ecodeli-server

pub mod admin;
pub mod announcements;
pub mod auth;
pub mod deliveries;
pub mod documents;
pub mod health;
pub mod notifications;
pub mod payments;
pub mod reviews;
pub mod routes;
pub mod services;
pub mod storage;
pub mod stripe_webhook;
pub mod wallet;

#[cfg(test)]
mod tests;

use axum::http::{HeaderName, HeaderValue};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router, middleware};
use shared::error::AppError;
use shared::models::{PaymentIntentInfo, UserRole};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::rate_limit::{login_rate_limit, register_rate_limit};
use crate::auth::{require_auth, require_role};
use crate::services::escrow;
use crate::state::AppState;

pub type ApiResult<T> = Result<Json<T>, AppError>;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Clamp pagination parameters to (limit, offset)
pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Open the PaymentIntent of a freshly committed payment. A Stripe failure
/// does not undo the booking; the payer retries via the intent endpoint.
pub(crate) async fn checkout_intent(state: &AppState, payment_id: i64) -> Option<PaymentIntentInfo> {
    match escrow::open_intent(state, payment_id).await {
        Ok(intent) => Some(intent),
        Err(e) => {
            let e: AppError = e.into();
            tracing::warn!(payment_id, error = %e, "PaymentIntent not opened");
            None
        }
    }
}

/// Random v4 request ids
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    match allowed_origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

/// Create the combined router
pub fn create_router(state: AppState, cors_origin: Option<&str>) -> Router {
    // Public (no auth)
    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/tracking/{code}", get(deliveries::public_tracking))
        .route("/api/storage/warehouses", get(storage::warehouses))
        .route("/api/storage/boxes", get(storage::search_boxes))
        .route("/api/storage/quote", get(storage::quote))
        .route("/api/services", get(services::search))
        .route("/api/services/{id}", get(services::get))
        .route("/api/services/{id}/slots", get(services::slots))
        .route("/api/users/{id}/reviews", get(reviews::list_for_user))
        .route("/api/users/{id}/reviews/stats", get(reviews::stats));

    let login = Router::new()
        .route("/api/auth/login", post(auth::login))
        .layer(middleware::from_fn_with_state(state.clone(), login_rate_limit));
    let registration = Router::new()
        .route("/api/auth/register", post(auth::register))
        .layer(middleware::from_fn_with_state(state.clone(), register_rate_limit));

    // Stripe webhook (signature-verified, raw body)
    let webhook = Router::new().route("/stripe/webhook", post(stripe_webhook::handle_webhook));

    // Any signed-in user; ownership is checked by the handlers
    let user = Router::new()
        .route("/api/me", get(auth::me).put(auth::update_me))
        .route("/api/announcements", get(announcements::list).post(announcements::create))
        .route("/api/announcements/mine", get(announcements::list_mine))
        .route("/api/announcements/{id}", get(announcements::get).put(announcements::update))
        .route("/api/announcements/{id}/cancel", post(announcements::cancel))
        .route(
            "/api/announcements/{id}/applications",
            get(announcements::list_applications).post(announcements::apply),
        )
        .route(
            "/api/announcements/{id}/applications/{application_id}/accept",
            post(announcements::accept),
        )
        .route("/api/announcements/{id}/matches", get(announcements::matches))
        .route("/api/applications/mine", get(announcements::my_applications))
        .route("/api/applications/{id}/withdraw", post(announcements::withdraw_application))
        .route("/api/deliveries", get(deliveries::list))
        .route("/api/deliveries/{id}", get(deliveries::get))
        .route("/api/deliveries/{id}/status", put(deliveries::update_status))
        .route("/api/deliveries/{id}/position", post(deliveries::update_position))
        .route("/api/deliveries/{id}/live", get(deliveries::live_position))
        .route("/api/deliveries/{id}/tracking", get(deliveries::tracking_events))
        .route("/api/deliveries/{id}/validate", post(deliveries::validate))
        .route("/api/routes/search", get(routes::search))
        .route("/api/payments", get(payments::list_mine))
        .route("/api/payments/{id}", get(payments::get))
        .route("/api/payments/{id}/intent", post(payments::open_intent))
        .route("/api/payments/{id}/breakdown", get(payments::breakdown))
        .route("/api/payments/{id}/dispute", post(payments::dispute))
        .route("/api/wallet", get(wallet::get))
        .route("/api/wallet/transactions", get(wallet::transactions))
        .route(
            "/api/wallet/withdrawals",
            get(wallet::list_withdrawals).post(wallet::request_withdrawal),
        )
        .route("/api/wallet/withdrawals/{id}/cancel", post(wallet::cancel_withdrawal))
        .route("/api/storage/reservations", get(storage::mine).post(storage::reserve))
        .route("/api/storage/reservations/{id}/extend", post(storage::extend))
        .route("/api/storage/reservations/{id}/access", post(storage::access))
        .route("/api/storage/reservations/{id}/cancel", post(storage::cancel))
        .route("/api/storage/reservations/{id}/usages", get(storage::usages))
        .route("/api/bookings", get(services::my_bookings).post(services::create_booking))
        .route("/api/bookings/{id}/status", patch(services::update_booking_status))
        .route("/api/bookings/{id}/reschedule", post(services::reschedule))
        .route("/api/documents", get(documents::mine).post(documents::upload))
        .route("/api/reviews", post(reviews::create))
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/{id}/read", post(notifications::mark_read));

    let deliverer = Router::new()
        .route(
            "/api/me/deliverer-profile",
            get(auth::get_deliverer_profile).put(auth::update_deliverer_profile),
        )
        .route("/api/deliverer/routes", get(routes::list_mine).post(routes::create))
        .route("/api/deliverer/routes/{id}", delete(routes::delete))
        .route(
            "/api/deliverer/routes/{id}/announcements",
            get(routes::announcements_on_route),
        )
        .route("/api/deliverer/route-optimization", post(routes::optimize))
        .route_layer(middleware::from_fn(require_role(&[UserRole::Deliverer])));

    let provider = Router::new()
        .route("/api/provider/services", post(services::create_service))
        .route("/api/provider/services/{id}", patch(services::update_service))
        .route(
            "/api/provider/availability",
            get(services::list_availability).post(services::add_availability),
        )
        .route("/api/provider/availability/{id}", delete(services::delete_availability))
        .route_layer(middleware::from_fn(require_role(&[UserRole::Provider])));

    let admin = Router::new()
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}/status", put(admin::set_user_status))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/audit", get(admin::audit_log))
        .route("/api/admin/payments", get(admin::list_payments))
        .route("/api/admin/payments/{id}/refund", post(admin::refund))
        .route("/api/admin/payments/{id}/resolve", post(admin::resolve_dispute))
        .route("/api/admin/payments/{id}/release", post(admin::release))
        .route("/api/admin/withdrawals", get(admin::list_withdrawals))
        .route("/api/admin/withdrawals/{id}/process", post(admin::process_withdrawal))
        .route("/api/admin/documents/pending", get(documents::pending))
        .route("/api/admin/documents/{id}/review", post(documents::review))
        .route("/api/admin/warehouses", post(storage::create_warehouse))
        .route("/api/admin/warehouses/{id}/boxes", post(storage::create_box))
        .route("/api/admin/boxes/{id}", patch(storage::update_box))
        .route_layer(middleware::from_fn(require_role(&[UserRole::Admin])));

    // require_auth runs before the role checks of the merged groups
    let authenticated = user
        .merge(deliverer)
        .merge(provider)
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(login)
        .merge(registration)
        .merge(webhook)
        .merge(authenticated)
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            XRequestId,
        ))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}
