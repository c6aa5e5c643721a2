//! Unified error codes for EcoDeli
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Account and verification errors
//! - 4xxx: Announcement and delivery errors
//! - 5xxx: Payment, escrow and wallet errors
//! - 6xxx: Storage errors
//! - 7xxx: Service and booking errors
//! - 8xxx: Document and review errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so clients can switch on
/// them without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,
    /// Too many requests
    TooManyRequests = 9,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Invalid credentials (email/password)
    InvalidCredentials = 1002,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,
    /// Account is suspended
    AccountSuspended = 1005,
    /// Account is inactive
    AccountInactive = 1006,
    /// Email already registered
    EmailAlreadyRegistered = 1007,
    /// Password too short
    PasswordTooShort = 1008,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Specific role required
    RoleRequired = 2002,
    /// Admin role required
    AdminRequired = 2003,
    /// Caller does not own the resource
    NotResourceOwner = 2004,

    // ==================== 3xxx: Account ====================
    /// User not found
    UserNotFound = 3001,
    /// Account must be verified first
    VerificationRequired = 3002,
    /// Deliverer profile missing
    DelivererProfileMissing = 3003,
    /// Role cannot be self-registered
    RoleNotRegistrable = 3004,

    // ==================== 4xxx: Delivery ====================
    /// Announcement not found
    AnnouncementNotFound = 4001,
    /// Announcement is not open
    AnnouncementNotOpen = 4002,
    /// Status transition not allowed
    InvalidStatusTransition = 4003,
    /// Delivery not found
    DeliveryNotFound = 4004,
    /// Delivery is not assigned to the caller
    DeliveryNotAssigned = 4005,
    /// Validation code does not match
    InvalidValidationCode = 4006,
    /// Application not found
    ApplicationNotFound = 4007,
    /// Deliverer already applied
    ApplicationAlreadyExists = 4008,
    /// Invalid coordinates
    InvalidCoordinates = 4009,
    /// Planned route not found
    RouteNotFound = 4010,
    /// Delivery already validated
    DeliveryAlreadyValidated = 4011,

    // ==================== 5xxx: Payment ====================
    /// Payment processing failed
    PaymentFailed = 5001,
    /// Payment not found
    PaymentNotFound = 5002,
    /// Escrow is not in the required state
    EscrowInvalidState = 5003,
    /// Escrow minimum hold period not reached
    EscrowHoldTooShort = 5004,
    /// Refund amount exceeds payment
    RefundExceedsAmount = 5005,
    /// Refund window has closed
    RefundWindowExpired = 5006,
    /// Payment is disputed
    PaymentDisputed = 5007,
    /// Insufficient wallet balance
    InsufficientBalance = 5008,
    /// Withdrawal below minimum amount
    WithdrawalBelowMinimum = 5009,
    /// Another withdrawal is still pending
    WithdrawalAlreadyPending = 5010,
    /// Withdrawal not found
    WithdrawalNotFound = 5011,
    /// Payment provider error
    PaymentProviderError = 5012,

    // ==================== 6xxx: Storage ====================
    /// Warehouse not found
    WarehouseNotFound = 6001,
    /// Storage box not found
    StorageBoxNotFound = 6002,
    /// Storage box not available for the period
    StorageBoxUnavailable = 6003,
    /// Reservation not found
    ReservationNotFound = 6004,
    /// Access code does not match
    InvalidAccessCode = 6005,
    /// Reservation is not active
    ReservationNotActive = 6006,
    /// Extension end date must be later than current end
    InvalidExtension = 6007,
    /// Invalid date range
    InvalidDateRange = 6008,
    /// An earlier extension is still waiting for its payment
    ExtensionPaymentPending = 6009,

    // ==================== 7xxx: Booking ====================
    /// Service not found
    ServiceNotFound = 7001,
    /// Service is not active
    ServiceInactive = 7002,
    /// Booking not found
    BookingNotFound = 7003,
    /// Time slot unavailable
    SlotUnavailable = 7004,
    /// Requested time is outside provider availability
    OutsideAvailability = 7005,
    /// Availability window not found
    AvailabilityNotFound = 7006,
    /// Invalid time window
    InvalidTimeWindow = 7007,

    // ==================== 8xxx: Verification ====================
    /// Document not found
    DocumentNotFound = 8001,
    /// Document already reviewed
    DocumentAlreadyReviewed = 8002,
    /// Rejection requires a reason
    RejectionReasonRequired = 8003,
    /// Review not found
    ReviewNotFound = 8101,
    /// Review already exists
    ReviewAlreadyExists = 8102,
    /// Review not allowed for this resource
    ReviewNotAllowed = 8103,
    /// Rating out of range
    InvalidRating = 8104,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Timeout error
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",
            ErrorCode::TooManyRequests => "Too many requests, please try again later",

            // Auth
            ErrorCode::NotAuthenticated => "Authentication required",
            ErrorCode::InvalidCredentials => "Invalid email or password",
            ErrorCode::TokenExpired => "Token has expired",
            ErrorCode::TokenInvalid => "Invalid token",
            ErrorCode::AccountSuspended => "Account is suspended",
            ErrorCode::AccountInactive => "Account is inactive",
            ErrorCode::EmailAlreadyRegistered => "Email is already registered",
            ErrorCode::PasswordTooShort => "Password is too short",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::RoleRequired => "Role required",
            ErrorCode::AdminRequired => "Admin role required",
            ErrorCode::NotResourceOwner => "You do not own this resource",

            // Account
            ErrorCode::UserNotFound => "User not found",
            ErrorCode::VerificationRequired => "Account verification required",
            ErrorCode::DelivererProfileMissing => "Deliverer profile is missing",
            ErrorCode::RoleNotRegistrable => "This role cannot be registered",

            // Delivery
            ErrorCode::AnnouncementNotFound => "Announcement not found",
            ErrorCode::AnnouncementNotOpen => "Announcement is not open",
            ErrorCode::InvalidStatusTransition => "Status transition not allowed",
            ErrorCode::DeliveryNotFound => "Delivery not found",
            ErrorCode::DeliveryNotAssigned => "Delivery is not assigned to you",
            ErrorCode::InvalidValidationCode => "Invalid validation code",
            ErrorCode::ApplicationNotFound => "Application not found",
            ErrorCode::ApplicationAlreadyExists => "You already applied to this announcement",
            ErrorCode::InvalidCoordinates => "Invalid coordinates",
            ErrorCode::RouteNotFound => "Route not found",
            ErrorCode::DeliveryAlreadyValidated => "Delivery already validated",

            // Payment
            ErrorCode::PaymentFailed => "Payment failed",
            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::EscrowInvalidState => "Payment is not in the required state",
            ErrorCode::EscrowHoldTooShort => "Minimum escrow hold period not reached",
            ErrorCode::RefundExceedsAmount => "Refund amount exceeds payment amount",
            ErrorCode::RefundWindowExpired => "Refund period has expired",
            ErrorCode::PaymentDisputed => "Payment is disputed",
            ErrorCode::InsufficientBalance => "Insufficient balance",
            ErrorCode::WithdrawalBelowMinimum => "Withdrawal amount below minimum",
            ErrorCode::WithdrawalAlreadyPending => "A withdrawal is already pending",
            ErrorCode::WithdrawalNotFound => "Withdrawal not found",
            ErrorCode::PaymentProviderError => "Payment provider error",

            // Storage
            ErrorCode::WarehouseNotFound => "Warehouse not found",
            ErrorCode::StorageBoxNotFound => "Storage box not found",
            ErrorCode::StorageBoxUnavailable => "Storage box is not available for this period",
            ErrorCode::ReservationNotFound => "Reservation not found",
            ErrorCode::InvalidAccessCode => "Invalid access code",
            ErrorCode::ReservationNotActive => "Reservation is not active",
            ErrorCode::InvalidExtension => "New end date must be after the current end date",
            ErrorCode::InvalidDateRange => "Invalid date range",
            ErrorCode::ExtensionPaymentPending => "Previous extension is not paid yet",

            // Booking
            ErrorCode::ServiceNotFound => "Service not found",
            ErrorCode::ServiceInactive => "Service is not active",
            ErrorCode::BookingNotFound => "Booking not found",
            ErrorCode::SlotUnavailable => "Time slot is not available",
            ErrorCode::OutsideAvailability => "Requested time is outside provider availability",
            ErrorCode::AvailabilityNotFound => "Availability not found",
            ErrorCode::InvalidTimeWindow => "Invalid time window",

            // Verification
            ErrorCode::DocumentNotFound => "Document not found",
            ErrorCode::DocumentAlreadyReviewed => "Document already reviewed",
            ErrorCode::RejectionReasonRequired => "A rejection reason is required",
            ErrorCode::ReviewNotFound => "Review not found",
            ErrorCode::ReviewAlreadyExists => "Review already exists",
            ErrorCode::ReviewNotAllowed => "Review not allowed",
            ErrorCode::InvalidRating => "Rating must be between 1 and 5",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),
            9 => Ok(ErrorCode::TooManyRequests),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidCredentials),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),
            1005 => Ok(ErrorCode::AccountSuspended),
            1006 => Ok(ErrorCode::AccountInactive),
            1007 => Ok(ErrorCode::EmailAlreadyRegistered),
            1008 => Ok(ErrorCode::PasswordTooShort),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::RoleRequired),
            2003 => Ok(ErrorCode::AdminRequired),
            2004 => Ok(ErrorCode::NotResourceOwner),

            // Account
            3001 => Ok(ErrorCode::UserNotFound),
            3002 => Ok(ErrorCode::VerificationRequired),
            3003 => Ok(ErrorCode::DelivererProfileMissing),
            3004 => Ok(ErrorCode::RoleNotRegistrable),

            // Delivery
            4001 => Ok(ErrorCode::AnnouncementNotFound),
            4002 => Ok(ErrorCode::AnnouncementNotOpen),
            4003 => Ok(ErrorCode::InvalidStatusTransition),
            4004 => Ok(ErrorCode::DeliveryNotFound),
            4005 => Ok(ErrorCode::DeliveryNotAssigned),
            4006 => Ok(ErrorCode::InvalidValidationCode),
            4007 => Ok(ErrorCode::ApplicationNotFound),
            4008 => Ok(ErrorCode::ApplicationAlreadyExists),
            4009 => Ok(ErrorCode::InvalidCoordinates),
            4010 => Ok(ErrorCode::RouteNotFound),
            4011 => Ok(ErrorCode::DeliveryAlreadyValidated),

            // Payment
            5001 => Ok(ErrorCode::PaymentFailed),
            5002 => Ok(ErrorCode::PaymentNotFound),
            5003 => Ok(ErrorCode::EscrowInvalidState),
            5004 => Ok(ErrorCode::EscrowHoldTooShort),
            5005 => Ok(ErrorCode::RefundExceedsAmount),
            5006 => Ok(ErrorCode::RefundWindowExpired),
            5007 => Ok(ErrorCode::PaymentDisputed),
            5008 => Ok(ErrorCode::InsufficientBalance),
            5009 => Ok(ErrorCode::WithdrawalBelowMinimum),
            5010 => Ok(ErrorCode::WithdrawalAlreadyPending),
            5011 => Ok(ErrorCode::WithdrawalNotFound),
            5012 => Ok(ErrorCode::PaymentProviderError),

            // Storage
            6001 => Ok(ErrorCode::WarehouseNotFound),
            6002 => Ok(ErrorCode::StorageBoxNotFound),
            6003 => Ok(ErrorCode::StorageBoxUnavailable),
            6004 => Ok(ErrorCode::ReservationNotFound),
            6005 => Ok(ErrorCode::InvalidAccessCode),
            6006 => Ok(ErrorCode::ReservationNotActive),
            6007 => Ok(ErrorCode::InvalidExtension),
            6008 => Ok(ErrorCode::InvalidDateRange),
            6009 => Ok(ErrorCode::ExtensionPaymentPending),

            // Booking
            7001 => Ok(ErrorCode::ServiceNotFound),
            7002 => Ok(ErrorCode::ServiceInactive),
            7003 => Ok(ErrorCode::BookingNotFound),
            7004 => Ok(ErrorCode::SlotUnavailable),
            7005 => Ok(ErrorCode::OutsideAvailability),
            7006 => Ok(ErrorCode::AvailabilityNotFound),
            7007 => Ok(ErrorCode::InvalidTimeWindow),

            // Verification
            8001 => Ok(ErrorCode::DocumentNotFound),
            8002 => Ok(ErrorCode::DocumentAlreadyReviewed),
            8003 => Ok(ErrorCode::RejectionReasonRequired),
            8101 => Ok(ErrorCode::ReviewNotFound),
            8102 => Ok(ErrorCode::ReviewAlreadyExists),
            8103 => Ok(ErrorCode::ReviewNotAllowed),
            8104 => Ok(ErrorCode::InvalidRating),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::NotFound.code(), 3);
        assert_eq!(ErrorCode::NotAuthenticated.code(), 1001);
        assert_eq!(ErrorCode::PermissionDenied.code(), 2001);
        assert_eq!(ErrorCode::VerificationRequired.code(), 3002);
        assert_eq!(ErrorCode::InvalidStatusTransition.code(), 4003);
        assert_eq!(ErrorCode::RefundExceedsAmount.code(), 5005);
        assert_eq!(ErrorCode::StorageBoxUnavailable.code(), 6003);
        assert_eq!(ErrorCode::SlotUnavailable.code(), 7004);
        assert_eq!(ErrorCode::ReviewAlreadyExists.code(), 8102);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_is_success() {
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::Unknown.is_success());
        assert!(!ErrorCode::InternalError.is_success());
    }

    #[test]
    fn test_try_from_valid() {
        assert_eq!(ErrorCode::try_from(0), Ok(ErrorCode::Success));
        assert_eq!(ErrorCode::try_from(1001), Ok(ErrorCode::NotAuthenticated));
        assert_eq!(ErrorCode::try_from(4004), Ok(ErrorCode::DeliveryNotFound));
        assert_eq!(ErrorCode::try_from(6005), Ok(ErrorCode::InvalidAccessCode));
        assert_eq!(ErrorCode::try_from(9005), Ok(ErrorCode::ConfigError));
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(999), Err(InvalidErrorCode(999)));
        assert_eq!(ErrorCode::try_from(10000), Err(InvalidErrorCode(10000)));
        assert_eq!(ErrorCode::try_from(1234), Err(InvalidErrorCode(1234)));
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&ErrorCode::NotFound).unwrap();
        assert_eq!(json, "3");

        let json = serde_json::to_string(&ErrorCode::AnnouncementNotFound).unwrap();
        assert_eq!(json, "4001");
    }

    #[test]
    fn test_deserialize_invalid() {
        let result: Result<ErrorCode, _> = serde_json::from_str("4999");
        assert!(result.is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorCode::PaymentFailed), "5001");
    }

    #[test]
    fn test_invalid_error_code_display() {
        let err = InvalidErrorCode(999);
        assert_eq!(format!("{}", err), "invalid error code: 999");
    }
}
