//! `AppError` and the JSON body it renders to

use super::category::ErrorCategory;
use super::codes::ErrorCode;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Error returned by every EcoDeli endpoint.
///
/// `code` decides the HTTP status; `details` carries field names,
/// offending ids or transition endpoints when the caller needs them.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Error with the stock message of `code`
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    /// Broken business rule (amounts, dates, capacity). Same code as
    /// `validation`; call sites read as what they check.
    pub fn business_rule(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidRequest, msg)
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{resource} not found"))
            .with_detail("resource", resource)
    }

    pub fn already_exists(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::with_message(ErrorCode::AlreadyExists, format!("{resource} already exists"))
            .with_detail("resource", resource)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::PermissionDenied, msg)
    }

    /// The caller is authenticated but the row belongs to someone else
    pub fn not_owner() -> Self {
        Self::new(ErrorCode::NotResourceOwner)
    }

    pub fn invalid_credentials() -> Self {
        Self::new(ErrorCode::InvalidCredentials)
    }

    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::TokenInvalid, msg)
    }

    pub fn token_expired() -> Self {
        Self::new(ErrorCode::TokenExpired)
    }

    /// A status machine refused `from -> to`. Both ends go into `details`.
    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        let (from, to) = (from.into(), to.into());
        Self::with_message(
            ErrorCode::InvalidStatusTransition,
            format!("Cannot transition from {from} to {to}"),
        )
        .with_detail("from", from)
        .with_detail("to", to)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }
}

/// JSON body of an error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code.code(),
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.http_status();
        if self.code.category() == ErrorCategory::System {
            tracing::error!(code = %self.code, message = %self.message, "System error");
        }
        (status, axum::Json(ErrorBody::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_and_custom_messages() {
        let err = AppError::new(ErrorCode::DeliveryNotFound);
        assert_eq!(err.message, "Delivery not found");
        assert!(err.details.is_none());

        let err = AppError::with_message(ErrorCode::TooManyRequests, "Slow down");
        assert_eq!(err.to_string(), "Slow down");
        assert_eq!(err.http_status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_not_found_names_the_resource() {
        let err = AppError::not_found("Notification");
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Notification not found");
        assert_eq!(err.details.unwrap()["resource"], "Notification");
    }

    #[test]
    fn test_invalid_transition() {
        let err = AppError::invalid_transition("DELIVERED", "IN_TRANSIT");
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);
        assert_eq!(err.message, "Cannot transition from DELIVERED to IN_TRANSIT");
        assert_eq!(err.http_status(), StatusCode::CONFLICT);
        let details = err.details.unwrap();
        assert_eq!(details["from"], "DELIVERED");
        assert_eq!(details["to"], "IN_TRANSIT");
    }

    #[test]
    fn test_business_rule_is_a_validation_failure() {
        let err = AppError::business_rule("Pickup date is in the past");
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_body_json() {
        let err = AppError::validation("weight must be positive").with_detail("field", "weight_kg");
        let json = serde_json::to_value(ErrorBody::from(&err)).unwrap();
        assert_eq!(json["code"], 2);
        assert_eq!(json["message"], "weight must be positive");
        assert_eq!(json["details"]["field"], "weight_kg");

        let json = serde_json::to_value(ErrorBody::from(&AppError::not_owner())).unwrap();
        assert!(json.get("details").is_none());
    }
}
