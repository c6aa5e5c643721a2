//! User JWT authentication
//!
//! Tokens carry the user id, email and role. `require_auth` verifies the
//! token and inserts a [`CurrentUser`] into the request extensions;
//! `require_role` narrows a router to the given roles (admins always pass).

use std::future::Future;
use std::pin::Pin;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use http::HeaderMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::UserRole;

use crate::state::AppState;

/// JWT claims for user authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub email: String,
    /// Role in database form (CLIENT, DELIVERER, ...)
    pub role: String,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated user extracted from the JWT
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Admins pass every role check
    pub fn has_any_role(&self, roles: &[UserRole]) -> bool {
        self.is_admin() || roles.contains(&self.role)
    }

    /// Reject unless the user is one of `roles`
    pub fn ensure_role(&self, roles: &[UserRole]) -> Result<(), AppError> {
        if self.has_any_role(roles) {
            Ok(())
        } else {
            Err(AppError::new(ErrorCode::RoleRequired).with_detail(
                "required",
                roles.iter().map(|r| r.as_db()).collect::<Vec<_>>(),
            ))
        }
    }
}

impl TryFrom<Claims> for CurrentUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let id = claims
            .sub
            .parse()
            .map_err(|_| AppError::invalid_token("Malformed subject"))?;
        let role = UserRole::from_db(&claims.role)
            .ok_or_else(|| AppError::invalid_token("Unknown role"))?;
        Ok(Self {
            id,
            email: claims.email,
            role,
        })
    }
}

const JWT_EXPIRY_HOURS: i64 = 24;

/// Create a JWT token for a user
pub fn create_token(
    user_id: i64,
    email: &str,
    role: UserRole,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.as_db().to_string(),
        exp: (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify the bearer token of a request
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<CurrentUser, AppError> {
    let auth_header = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::new(ErrorCode::NotAuthenticated))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::invalid_token("Invalid Authorization format"))?;

    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("JWT validation failed: {e}");
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::token_expired(),
            _ => AppError::invalid_token("Invalid token"),
        }
    })?;

    CurrentUser::try_from(token_data.claims)
}

/// Middleware that requires a valid user token
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // CORS preflight carries no credentials
    if request.method() == http::Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let user = authenticate(request.headers(), &state.jwt_secret).inspect_err(|_| {
        tracing::warn!(uri = %request.uri(), "Rejected unauthenticated request");
    })?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Role check middleware factory
///
/// ```ignore
/// Router::new()
///     .route("/api/deliverer/routes", post(routes::create))
///     .layer(middleware::from_fn(require_role(&[UserRole::Deliverer])));
/// ```
pub fn require_role(
    roles: &'static [UserRole],
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>> + Clone
{
    move |request: Request, next: Next| {
        Box::pin(async move {
            let user = request
                .extensions()
                .get::<CurrentUser>()
                .ok_or_else(|| AppError::new(ErrorCode::NotAuthenticated))?;

            if let Err(e) = user.ensure_role(roles) {
                tracing::warn!(
                    user_id = user.id,
                    role = %user.role,
                    uri = %request.uri(),
                    "Role check failed"
                );
                return Err(e);
            }

            Ok(next.run(request).await)
        })
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Already verified by require_auth
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let user = authenticate(&parts.headers, &state.jwt_secret)?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    #[test]
    fn test_token_roundtrip() {
        let token = create_token(42, "dana@example.com", UserRole::Deliverer, SECRET).unwrap();
        let user = authenticate(&bearer(&token), SECRET).unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.email, "dana@example.com");
        assert_eq!(user.role, UserRole::Deliverer);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_token(1, "a@b.c", UserRole::Client, SECRET).unwrap();
        let err = authenticate(&bearer(&token), "other").unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenInvalid);
    }

    #[test]
    fn test_missing_header() {
        let err = authenticate(&HeaderMap::new(), SECRET).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotAuthenticated);
    }

    #[test]
    fn test_admin_passes_role_checks() {
        let admin = CurrentUser {
            id: 1,
            email: "root@example.com".into(),
            role: UserRole::Admin,
        };
        assert!(admin.ensure_role(&[UserRole::Deliverer]).is_ok());

        let client = CurrentUser {
            role: UserRole::Client,
            ..admin
        };
        assert_eq!(
            client.ensure_role(&[UserRole::Deliverer]).unwrap_err().code,
            ErrorCode::RoleRequired
        );
    }
}
