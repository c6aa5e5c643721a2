//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories are determined by the leading digit of the error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Authentication errors (1xxx)
    Auth,
    /// Permission errors (2xxx)
    Permission,
    /// Account and verification errors (3xxx)
    Account,
    /// Announcement and delivery errors (4xxx)
    Delivery,
    /// Payment, escrow and wallet errors (5xxx)
    Payment,
    /// Storage errors (6xxx)
    Storage,
    /// Service and booking errors (7xxx)
    Booking,
    /// Document and review errors (8xxx)
    Verification,
    /// System errors (9xxx)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Auth,
            2000..3000 => Self::Permission,
            3000..4000 => Self::Account,
            4000..5000 => Self::Delivery,
            5000..6000 => Self::Payment,
            6000..7000 => Self::Storage,
            7000..8000 => Self::Booking,
            8000..9000 => Self::Verification,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Account => "account",
            Self::Delivery => "delivery",
            Self::Payment => "payment",
            Self::Storage => "storage",
            Self::Booking => "booking",
            Self::Verification => "verification",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(1001), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::from_code(2001), ErrorCategory::Permission);
        assert_eq!(ErrorCategory::from_code(3001), ErrorCategory::Account);
        assert_eq!(ErrorCategory::from_code(4001), ErrorCategory::Delivery);
        assert_eq!(ErrorCategory::from_code(5001), ErrorCategory::Payment);
        assert_eq!(ErrorCategory::from_code(6001), ErrorCategory::Storage);
        assert_eq!(ErrorCategory::from_code(7001), ErrorCategory::Booking);
        assert_eq!(ErrorCategory::from_code(8101), ErrorCategory::Verification);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(10000), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::Success.category(), ErrorCategory::General);
        assert_eq!(ErrorCode::TokenExpired.category(), ErrorCategory::Auth);
        assert_eq!(
            ErrorCode::DeliveryNotFound.category(),
            ErrorCategory::Delivery
        );
        assert_eq!(
            ErrorCode::InsufficientBalance.category(),
            ErrorCategory::Payment
        );
        assert_eq!(ErrorCode::DatabaseError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serialize() {
        let json = serde_json::to_string(&ErrorCategory::Verification).unwrap();
        assert_eq!(json, "\"verification\"");

        let category: ErrorCategory = serde_json::from_str("\"storage\"").unwrap();
        assert_eq!(category, ErrorCategory::Storage);
    }
}
