//! Registration, login and the caller's own account

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    AuthResponse, DelivererProfile, DelivererProfileUpdate, LoginRequest, RegisterRequest,
    UpdateProfileRequest, User, UserInfo, UserRole,
};
use shared::geo::GeoPoint;
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::auth::user_auth::create_token;
use crate::db;
use crate::error::internal;
use crate::state::AppState;
use crate::util::{forwarded_ip, hash_password, verify_password};

use super::ApiResult;

const MIN_PASSWORD_LEN: usize = 8;

fn issue_token(state: &AppState, user: &User, role: UserRole) -> Result<String, AppError> {
    create_token(user.id, &user.email, role, &state.jwt_secret).map_err(|e| {
        tracing::error!("JWT creation failed: {e}");
        AppError::new(ErrorCode::InternalError)
    })
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || email.len() > 254 {
        return Err(AppError::validation("Invalid email address"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::new(ErrorCode::PasswordTooShort).with_detail("min_length", MIN_PASSWORD_LEN));
    }
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    if !req.role.is_self_registrable() {
        return Err(AppError::new(ErrorCode::RoleNotRegistrable));
    }

    let password_hash = hash_password(&req.password).map_err(internal)?;
    let now = now_millis();
    let status = req.role.initial_status();
    let user = User {
        id: snowflake_id(),
        email,
        password_hash,
        name: name.to_string(),
        phone: req.phone.clone(),
        role: req.role.as_db().to_string(),
        status: status.as_db().to_string(),
        // roles without required documents are verified from the start
        is_verified: shared::models::required_documents(req.role).is_empty(),
        latitude: None,
        longitude: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = db::users::insert(&state.pool, &user).await {
        if db::is_unique_violation(&e) {
            return Err(AppError::new(ErrorCode::EmailAlreadyRegistered));
        }
        return Err(internal(e));
    }

    let ip = forwarded_ip(&headers);
    let detail = serde_json::json!({ "role": user.role });
    let _ = db::audit::log(&state.pool, Some(user.id), "register", Some(user.id), Some(&detail), ip.as_deref(), now).await;
    tracing::info!(user_id = user.id, role = %user.role, "User registered");

    let token = issue_token(&state, &user, req.role)?;
    Ok(Json(AuthResponse {
        token,
        user: UserInfo::from(&user),
    }))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let email = req.email.trim().to_lowercase();
    let user = db::users::find_by_email(&state.pool, &email)
        .await
        .map_err(internal)?
        .ok_or_else(AppError::invalid_credentials)?;

    if !verify_password(&req.password, &user.password_hash) {
        tracing::warn!(user_id = user.id, "Login with wrong password");
        return Err(AppError::invalid_credentials());
    }

    let status = user
        .status()
        .ok_or_else(|| AppError::internal("Unknown user status"))?;
    if !status.can_login() {
        return Err(match status {
            shared::models::UserStatus::Suspended => AppError::new(ErrorCode::AccountSuspended),
            _ => AppError::new(ErrorCode::AccountInactive),
        });
    }
    let role = user
        .role()
        .ok_or_else(|| AppError::internal("Unknown user role"))?;

    let token = issue_token(&state, &user, role)?;
    let now = now_millis();
    let ip = forwarded_ip(&headers);
    let _ = db::audit::log(&state.pool, Some(user.id), "login", Some(user.id), None, ip.as_deref(), now).await;

    Ok(Json(AuthResponse {
        token,
        user: UserInfo::from(&user),
    }))
}

/// GET /api/me
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<User> {
    let row = db::users::find_by_id(&state.pool, user.id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    Ok(Json(row))
}

/// PUT /api/me
pub async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<User> {
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::validation("Name cannot be empty"));
    }
    match (req.latitude, req.longitude) {
        (Some(lat), Some(lng)) => GeoPoint::new(lat, lng).validate()?,
        (None, None) => {}
        _ => return Err(AppError::validation("latitude and longitude go together")),
    }

    let row = db::users::update_profile(&state.pool, user.id, &req, now_millis())
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    Ok(Json(row))
}

/// PUT /api/me/deliverer-profile
pub async fn update_deliverer_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<DelivererProfileUpdate>,
) -> ApiResult<DelivererProfile> {
    if req.max_weight_kg <= 0.0 || req.max_volume_m3 <= 0.0 {
        return Err(AppError::validation("Vehicle capacities must be positive"));
    }
    if req.vehicle_type.trim().is_empty() {
        return Err(AppError::validation("vehicle_type is required"));
    }
    let profile = db::users::upsert_deliverer_profile(&state.pool, user.id, &req, now_millis())
        .await
        .map_err(internal)?;
    Ok(Json(profile))
}

/// GET /api/me/deliverer-profile
pub async fn get_deliverer_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Option<DelivererProfile>> {
    let profile = db::users::find_deliverer_profile(&state.pool, user.id)
        .await
        .map_err(internal)?;
    Ok(Json(profile))
}
