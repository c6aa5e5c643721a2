//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::UserNotFound
            | Self::AnnouncementNotFound
            | Self::DeliveryNotFound
            | Self::ApplicationNotFound
            | Self::RouteNotFound
            | Self::PaymentNotFound
            | Self::WithdrawalNotFound
            | Self::WarehouseNotFound
            | Self::StorageBoxNotFound
            | Self::ReservationNotFound
            | Self::ServiceNotFound
            | Self::BookingNotFound
            | Self::AvailabilityNotFound
            | Self::DocumentNotFound
            | Self::ReviewNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists
            | Self::EmailAlreadyRegistered
            | Self::AnnouncementNotOpen
            | Self::InvalidStatusTransition
            | Self::ApplicationAlreadyExists
            | Self::DeliveryAlreadyValidated
            | Self::EscrowInvalidState
            | Self::PaymentDisputed
            | Self::WithdrawalAlreadyPending
            | Self::StorageBoxUnavailable
            | Self::ExtensionPaymentPending
            | Self::ReservationNotActive
            | Self::SlotUnavailable
            | Self::DocumentAlreadyReviewed
            | Self::ReviewAlreadyExists => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::TokenInvalid => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            Self::PermissionDenied
            | Self::RoleRequired
            | Self::AdminRequired
            | Self::NotResourceOwner
            | Self::AccountSuspended
            | Self::AccountInactive
            | Self::VerificationRequired
            | Self::RoleNotRegistrable
            | Self::DeliveryNotAssigned
            | Self::InvalidAccessCode
            | Self::ReviewNotAllowed => StatusCode::FORBIDDEN,

            // 402 Payment Required
            Self::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,

            // 429 Too Many Requests
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            // 502 Bad Gateway (upstream payment provider)
            Self::PaymentProviderError => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::NetworkError | Self::TimeoutError => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::InternalError | Self::DatabaseError | Self::ConfigError | Self::Unknown => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_status() {
        assert_eq!(ErrorCode::Success.http_status(), StatusCode::OK);
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::DeliveryNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::StorageBoxNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_conflict_status() {
        assert_eq!(
            ErrorCode::InvalidStatusTransition.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::SlotUnavailable.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::StorageBoxUnavailable.http_status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_auth_and_permission_status() {
        assert_eq!(
            ErrorCode::TokenExpired.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::DeliveryNotAssigned.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::AccountSuspended.http_status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_bad_request_status() {
        // Validation and business rule errors default to 400
        assert_eq!(
            ErrorCode::ValidationFailed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::RefundExceedsAmount.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::InvalidRating.http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_upstream_status() {
        assert_eq!(
            ErrorCode::PaymentProviderError.http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ErrorCode::TooManyRequests.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
