//! Payments held in escrow between client and payee

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};
use crate::pricing::to_decimal;
use crate::util::{DAY_MS, HOUR_MS};

/// What a payment pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    Delivery,
    Booking,
    Storage,
}

db_enum!(PaymentKind {
    Delivery => "DELIVERY",
    Booking => "BOOKING",
    Storage => "STORAGE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    /// Intent created, card not yet confirmed
    Pending,
    /// Card authorized, funds not captured
    Authorized,
    /// Funds captured and held by the platform
    Held,
    /// Paid out to the payee
    Released,
    Refunded,
    PartiallyRefunded,
    Disputed,
    Cancelled,
    Expired,
}

db_enum!(EscrowStatus {
    Pending => "PENDING",
    Authorized => "AUTHORIZED",
    Held => "HELD",
    Released => "RELEASED",
    Refunded => "REFUNDED",
    PartiallyRefunded => "PARTIALLY_REFUNDED",
    Disputed => "DISPUTED",
    Cancelled => "CANCELLED",
    Expired => "EXPIRED",
});

impl EscrowStatus {
    pub fn can_transition_to(&self, next: Self) -> bool {
        use EscrowStatus::*;
        matches!(
            (self, next),
            (Pending, Authorized)
                | (Pending, Held)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Authorized, Held)
                | (Authorized, Cancelled)
                | (Authorized, Expired)
                | (Held, Released)
                | (Held, Refunded)
                | (Held, PartiallyRefunded)
                | (Held, Disputed)
                | (Disputed, Released)
                | (Disputed, Refunded)
                | (Disputed, PartiallyRefunded)
                | (Released, Refunded)
                | (Released, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
                | (PartiallyRefunded, PartiallyRefunded)
        )
    }

    /// Card not captured yet, cancelling the intent voids it
    pub fn is_uncaptured(&self) -> bool {
        matches!(self, Self::Pending | Self::Authorized)
    }
}

/// Payment row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: i64,
    pub kind: String,
    pub reference_id: i64,
    pub payer_id: i64,
    pub payee_id: Option<i64>,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub stripe_payment_intent_id: Option<String>,
    pub platform_fee: f64,
    pub payee_amount: f64,
    pub refunded_amount: f64,
    pub captured_at: Option<i64>,
    pub released_at: Option<i64>,
    pub dispute_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Payment {
    pub fn status(&self) -> Option<EscrowStatus> {
        EscrowStatus::from_db(&self.status)
    }

    pub fn kind(&self) -> Option<PaymentKind> {
        PaymentKind::from_db(&self.kind)
    }
}

/// Returned to the client to confirm the card payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentInfo {
    pub payment_id: i64,
    pub client_secret: Option<String>,
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    /// Full remaining amount when absent
    pub amount: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeResolution {
    Release,
    Refund,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveDisputeRequest {
    pub resolution: DisputeResolution,
    pub amount: Option<f64>,
    pub note: Option<String>,
}

/// Escrow timing rules
#[derive(Debug, Clone, Copy)]
pub struct EscrowPolicy {
    pub min_hold_hours: i64,
    pub auto_release_hours: i64,
    pub max_hold_hours: i64,
    pub refund_window_days: i64,
}

impl Default for EscrowPolicy {
    fn default() -> Self {
        Self {
            min_hold_hours: 1,
            auto_release_hours: 48,
            max_hold_hours: 168,
            refund_window_days: 30,
        }
    }
}

impl EscrowPolicy {
    /// Check that held funds may be paid out to the deliverer.
    pub fn check_release(
        &self,
        status: EscrowStatus,
        captured_at: Option<i64>,
        now: i64,
        delivery_validated: bool,
        has_proof: bool,
    ) -> Result<(), AppError> {
        match status {
            EscrowStatus::Held => {}
            EscrowStatus::Disputed => return Err(AppError::new(ErrorCode::PaymentDisputed)),
            other => {
                return Err(AppError::with_message(
                    ErrorCode::EscrowInvalidState,
                    format!("Cannot release a payment in status {}", other),
                ));
            }
        }
        if !delivery_validated {
            return Err(AppError::with_message(
                ErrorCode::EscrowInvalidState,
                "Delivery has not been validated",
            ));
        }
        if !has_proof {
            return Err(AppError::validation("Delivery proof is required"));
        }
        let captured_at = captured_at.ok_or_else(|| {
            AppError::with_message(ErrorCode::EscrowInvalidState, "Funds were never captured")
        })?;
        if now - captured_at < self.min_hold_hours * HOUR_MS {
            return Err(AppError::new(ErrorCode::EscrowHoldTooShort)
                .with_detail("min_hold_hours", self.min_hold_hours));
        }
        Ok(())
    }

    /// Held funds of a validated delivery are released automatically.
    pub fn auto_release_due(&self, status: EscrowStatus, validated_at: Option<i64>, now: i64) -> bool {
        status == EscrowStatus::Held
            && validated_at.is_some_and(|v| now - v >= self.auto_release_hours * HOUR_MS)
    }

    /// Funds held longer than allowed need an admin decision
    pub fn hold_expired(&self, captured_at: Option<i64>, now: i64) -> bool {
        captured_at.is_some_and(|c| now - c >= self.max_hold_hours * HOUR_MS)
    }

    /// Validate a refund request and return the resulting status.
    pub fn check_refund(
        &self,
        status: EscrowStatus,
        captured_at: Option<i64>,
        now: i64,
        requested: f64,
        amount: f64,
        already_refunded: f64,
    ) -> Result<EscrowStatus, AppError> {
        if !matches!(
            status,
            EscrowStatus::Held
                | EscrowStatus::Released
                | EscrowStatus::Disputed
                | EscrowStatus::PartiallyRefunded
        ) {
            return Err(AppError::with_message(
                ErrorCode::EscrowInvalidState,
                format!("Cannot refund a payment in status {}", status),
            ));
        }
        if captured_at.is_some_and(|c| now - c > self.refund_window_days * DAY_MS) {
            return Err(AppError::new(ErrorCode::RefundWindowExpired));
        }

        let requested = to_decimal(requested);
        if requested <= Decimal::ZERO {
            return Err(AppError::validation("Refund amount must be positive"));
        }
        let remaining = to_decimal(amount) - to_decimal(already_refunded);
        if requested > remaining {
            return Err(AppError::new(ErrorCode::RefundExceedsAmount)
                .with_detail("remaining", crate::pricing::to_f64(remaining)));
        }
        if requested == remaining {
            Ok(EscrowStatus::Refunded)
        } else {
            Ok(EscrowStatus::PartiallyRefunded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EscrowStatus::*;

    const NOW: i64 = 1_000 * HOUR_MS;

    #[test]
    fn test_transitions() {
        assert!(Pending.can_transition_to(Authorized));
        assert!(Authorized.can_transition_to(Held));
        assert!(Held.can_transition_to(Released));
        assert!(Held.can_transition_to(Disputed));
        assert!(Disputed.can_transition_to(Refunded));
        assert!(!Released.can_transition_to(Held));
        assert!(!Refunded.can_transition_to(Released));
        assert!(!Cancelled.can_transition_to(Authorized));
    }

    #[test]
    fn test_release_requires_held() {
        let policy = EscrowPolicy::default();
        let err = policy
            .check_release(Authorized, None, NOW, true, true)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EscrowInvalidState);

        let err = policy
            .check_release(Disputed, Some(0), NOW, true, true)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentDisputed);
    }

    #[test]
    fn test_release_requires_validation_and_proof() {
        let policy = EscrowPolicy::default();
        let captured = Some(NOW - 2 * HOUR_MS);
        assert_eq!(
            policy
                .check_release(Held, captured, NOW, false, true)
                .unwrap_err()
                .code,
            ErrorCode::EscrowInvalidState
        );
        assert_eq!(
            policy
                .check_release(Held, captured, NOW, true, false)
                .unwrap_err()
                .code,
            ErrorCode::ValidationFailed
        );
        assert!(policy.check_release(Held, captured, NOW, true, true).is_ok());
    }

    #[test]
    fn test_release_minimum_hold() {
        let policy = EscrowPolicy::default();
        let err = policy
            .check_release(Held, Some(NOW - HOUR_MS / 2), NOW, true, true)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EscrowHoldTooShort);
    }

    #[test]
    fn test_auto_release_due() {
        let policy = EscrowPolicy::default();
        assert!(policy.auto_release_due(Held, Some(NOW - 48 * HOUR_MS), NOW));
        assert!(!policy.auto_release_due(Held, Some(NOW - 47 * HOUR_MS), NOW));
        assert!(!policy.auto_release_due(Held, None, NOW));
        assert!(!policy.auto_release_due(Disputed, Some(0), NOW));
    }

    #[test]
    fn test_hold_expired() {
        let policy = EscrowPolicy::default();
        assert!(policy.hold_expired(Some(NOW - 168 * HOUR_MS), NOW));
        assert!(!policy.hold_expired(Some(NOW - 10 * HOUR_MS), NOW));
        assert!(!policy.hold_expired(None, NOW));
    }

    #[test]
    fn test_refund_full_and_partial() {
        let policy = EscrowPolicy::default();
        let captured = Some(NOW - DAY_MS);
        assert_eq!(
            policy
                .check_refund(Held, captured, NOW, 50.0, 50.0, 0.0)
                .unwrap(),
            Refunded
        );
        assert_eq!(
            policy
                .check_refund(Held, captured, NOW, 20.0, 50.0, 0.0)
                .unwrap(),
            PartiallyRefunded
        );
        assert_eq!(
            policy
                .check_refund(PartiallyRefunded, captured, NOW, 30.0, 50.0, 20.0)
                .unwrap(),
            Refunded
        );
    }

    #[test]
    fn test_refund_rejections() {
        let policy = EscrowPolicy::default();
        let captured = Some(NOW - DAY_MS);
        assert_eq!(
            policy
                .check_refund(Held, captured, NOW, 60.0, 50.0, 0.0)
                .unwrap_err()
                .code,
            ErrorCode::RefundExceedsAmount
        );
        assert_eq!(
            policy
                .check_refund(Pending, None, NOW, 10.0, 50.0, 0.0)
                .unwrap_err()
                .code,
            ErrorCode::EscrowInvalidState
        );
        assert_eq!(
            policy
                .check_refund(Held, Some(NOW - 31 * DAY_MS), NOW, 10.0, 50.0, 0.0)
                .unwrap_err()
                .code,
            ErrorCode::RefundWindowExpired
        );
        assert_eq!(
            policy
                .check_refund(Held, captured, NOW, 0.0, 50.0, 0.0)
                .unwrap_err()
                .code,
            ErrorCode::ValidationFailed
        );
    }
}
