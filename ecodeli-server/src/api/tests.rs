//! Router tests that stop before the database: auth, role gates, webhook
//! signature checks.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use shared::models::UserRole;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use super::{create_router, page};
use crate::auth::user_auth::create_token;
use crate::config::Config;
use crate::state::AppState;

const SECRET: &str = "router-test-secret";

fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/ecodeli_test".into(),
        http_port: 0,
        environment: "development".into(),
        jwt_secret: SECRET.into(),
        stripe_secret_key: "sk_test_unused".into(),
        stripe_webhook_secret: "whsec_test".into(),
        currency: "eur".into(),
        platform_fee_percent: 15.0,
        service_commission_percent: 10.0,
        escrow_auto_release_hours: 72,
        escrow_max_hold_hours: 720,
        refund_window_days: 30,
        min_withdrawal_amount: 10.0,
        job_interval_secs: 60,
        cors_allowed_origin: None,
    }
}

fn test_state() -> AppState {
    let config = test_config();
    // never connects unless a handler reaches the database
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy(&config.database_url)
        .unwrap();
    AppState::with_pool(pool, &config)
}

fn app() -> axum::Router {
    create_router(test_state(), None)
}

fn bearer(role: UserRole) -> String {
    format!("Bearer {}", create_token(42, "user@example.com", role, SECRET).unwrap())
}

#[tokio::test]
async fn test_health_is_public() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "ecodeli-server");
    assert_eq!(json["tracked_deliveries"], 0);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let response = app()
        .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let response = app()
        .oneshot(
            Request::get("/api/wallet")
                .header("authorization", "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_reject_other_roles() {
    for role in [UserRole::Client, UserRole::Deliverer, UserRole::Provider] {
        let response = app()
            .oneshot(
                Request::get("/api/admin/stats")
                    .header("authorization", bearer(role))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "role {role}");
    }
}

#[tokio::test]
async fn test_deliverer_routes_reject_clients() {
    let response = app()
        .oneshot(
            Request::post("/api/deliverer/route-optimization")
                .header("authorization", bearer(UserRole::Client))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"start":{"latitude":48.85,"longitude":2.35},"stops":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_provider_routes_reject_deliverers() {
    let response = app()
        .oneshot(
            Request::get("/api/provider/availability")
                .header("authorization", bearer(UserRole::Deliverer))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_requires_signature() {
    let response = app()
        .oneshot(
            Request::post("/stripe/webhook")
                .body(Body::from(r#"{"id":"evt_1","type":"payment_intent.succeeded"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let response = app()
        .oneshot(
            Request::post("/stripe/webhook")
                .header("stripe-signature", "t=1700000000,v1=deadbeef")
                .body(Body::from(r#"{"id":"evt_1","type":"payment_intent.succeeded"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_strangers_do_not_use_up_validation_attempts() {
    let state = test_state();
    let router = create_router(state.clone(), None);
    for _ in 0..6 {
        let response = router
            .clone()
            .oneshot(
                Request::post("/api/deliveries/777/validate")
                    .header("authorization", bearer(UserRole::Client))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"code":"000000"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
    assert!(
        !state
            .rate_limiter
            .is_exhausted("delivery_validation", "777", 5)
            .await
    );
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = app()
        .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_page_bounds() {
    assert_eq!(page(None, None), (50, 0));
    assert_eq!(page(Some(500), Some(10)), (200, 10));
    assert_eq!(page(Some(0), Some(-5)), (1, 0));
}
