//! Deliveries, tracking events and live positions

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Created,
    Assigned,
    PendingPickup,
    PickedUp,
    InTransit,
    Nearby,
    Arrived,
    AttemptDelivery,
    Delivered,
    NotDelivered,
    Rescheduled,
    Returned,
    Cancelled,
}

db_enum!(DeliveryStatus {
    Created => "CREATED",
    Assigned => "ASSIGNED",
    PendingPickup => "PENDING_PICKUP",
    PickedUp => "PICKED_UP",
    InTransit => "IN_TRANSIT",
    Nearby => "NEARBY",
    Arrived => "ARRIVED",
    AttemptDelivery => "ATTEMPT_DELIVERY",
    Delivered => "DELIVERED",
    NotDelivered => "NOT_DELIVERED",
    Rescheduled => "RESCHEDULED",
    Returned => "RETURNED",
    Cancelled => "CANCELLED",
});

impl DeliveryStatus {
    /// Statuses reachable from `self`
    pub fn next_statuses(&self) -> &'static [DeliveryStatus] {
        use DeliveryStatus::*;
        match self {
            Created => &[Assigned, Cancelled],
            Assigned => &[PendingPickup, Cancelled],
            PendingPickup => &[PickedUp, Cancelled],
            PickedUp => &[InTransit, Cancelled],
            InTransit => &[Nearby, Cancelled],
            Nearby => &[Arrived, InTransit, Cancelled],
            Arrived => &[AttemptDelivery, Cancelled],
            AttemptDelivery => &[Delivered, NotDelivered, Cancelled],
            NotDelivered => &[Rescheduled, Returned, Cancelled],
            Rescheduled => &[PendingPickup, Cancelled],
            Returned => &[Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.next_statuses().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_statuses().is_empty()
    }

    /// The parcel is with the deliverer
    pub fn is_in_progress(&self) -> bool {
        use DeliveryStatus::*;
        matches!(
            self,
            PickedUp | InTransit | Nearby | Arrived | AttemptDelivery
        )
    }
}

/// Delivery row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Delivery {
    pub id: i64,
    pub announcement_id: i64,
    pub client_id: i64,
    pub deliverer_id: i64,
    pub status: String,
    pub tracking_code: String,
    #[serde(skip_serializing)]
    pub validation_code: String,
    pub price: f64,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub delivery_latitude: f64,
    pub delivery_longitude: f64,
    pub picked_up_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub validated_at: Option<i64>,
    pub proof_photo_url: Option<String>,
    pub failed_validation_attempts: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Delivery {
    pub fn status(&self) -> Option<DeliveryStatus> {
        DeliveryStatus::from_db(&self.status)
    }

    pub fn destination(&self) -> GeoPoint {
        GeoPoint::new(self.delivery_latitude, self.delivery_longitude)
    }

    /// Whether `user_id` may close this delivery with the handover code.
    /// DELIVERED is only reachable from ATTEMPT_DELIVERY.
    pub fn ensure_can_validate(&self, user_id: i64) -> Result<(), AppError> {
        if self.deliverer_id != user_id {
            return Err(AppError::new(ErrorCode::DeliveryNotAssigned));
        }
        if self.validated_at.is_some() {
            return Err(AppError::new(ErrorCode::DeliveryAlreadyValidated));
        }
        if self.failed_validation_attempts >= MAX_VALIDATION_ATTEMPTS {
            return Err(AppError::with_message(
                ErrorCode::TooManyRequests,
                "Too many wrong codes, contact support",
            ));
        }
        match self.status() {
            Some(status) if status.can_transition_to(DeliveryStatus::Delivered) => Ok(()),
            _ => Err(AppError::invalid_transition(
                self.status.as_str(),
                DeliveryStatus::Delivered.as_db(),
            )),
        }
    }
}

/// Delivery as seen by the client who owns it (includes the code to hand over)
#[derive(Debug, Clone, Serialize)]
pub struct ClientDeliveryView {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub validation_code: String,
}

/// Status history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct TrackingEvent {
    pub id: i64,
    pub delivery_id: i64,
    pub status: String,
    pub note: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: i64,
}

/// Deliverer GPS fix
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct DeliveryPosition {
    pub delivery_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDeliveryStatusRequest {
    pub status: DeliveryStatus,
    pub note: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateDeliveryRequest {
    pub code: String,
    pub proof_photo_url: Option<String>,
}

/// Public tracking view by tracking code
#[derive(Debug, Clone, Serialize)]
pub struct TrackingInfo {
    pub tracking_code: String,
    pub status: String,
    pub events: Vec<TrackingEvent>,
    pub last_position: Option<DeliveryPosition>,
}

/// Maximum wrong validation codes before the delivery locks
pub const MAX_VALIDATION_ATTEMPTS: i32 = 5;

#[cfg(test)]
mod tests {
    use super::*;
    use DeliveryStatus::*;

    #[test]
    fn test_happy_path() {
        let path = [
            Created,
            Assigned,
            PendingPickup,
            PickedUp,
            InTransit,
            Nearby,
            Arrived,
            AttemptDelivery,
            Delivered,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_failed_delivery_path() {
        assert!(AttemptDelivery.can_transition_to(NotDelivered));
        assert!(NotDelivered.can_transition_to(Rescheduled));
        assert!(Rescheduled.can_transition_to(PendingPickup));
        assert!(NotDelivered.can_transition_to(Returned));
        assert!(Returned.can_transition_to(Cancelled));
        assert!(!Returned.can_transition_to(Delivered));
    }

    #[test]
    fn test_nearby_can_fall_back_to_in_transit() {
        assert!(Nearby.can_transition_to(InTransit));
        assert!(!InTransit.can_transition_to(Arrived));
    }

    #[test]
    fn test_terminal_states() {
        assert!(Delivered.is_terminal());
        assert!(Cancelled.is_terminal());
        for status in DeliveryStatus::ALL {
            if !status.is_terminal() {
                assert!(status.can_transition_to(Cancelled), "{status}");
            }
        }
    }

    fn delivery(status: DeliveryStatus) -> Delivery {
        Delivery {
            id: 1,
            announcement_id: 2,
            client_id: 3,
            deliverer_id: 4,
            status: status.as_db().to_string(),
            tracking_code: "ECOTEST123".into(),
            validation_code: "123456".into(),
            price: 20.0,
            pickup_latitude: 48.85,
            pickup_longitude: 2.35,
            delivery_latitude: 48.86,
            delivery_longitude: 2.36,
            picked_up_at: Some(1_000),
            delivered_at: None,
            validated_at: None,
            proof_photo_url: None,
            failed_validation_attempts: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_validation_only_from_attempt_delivery() {
        assert!(delivery(AttemptDelivery).ensure_can_validate(4).is_ok());
        for status in DeliveryStatus::ALL.iter().filter(|s| **s != AttemptDelivery) {
            let err = delivery(*status).ensure_can_validate(4).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidStatusTransition, "{status}");
        }
    }

    #[test]
    fn test_validation_gates() {
        let err = delivery(AttemptDelivery).ensure_can_validate(42).unwrap_err();
        assert_eq!(err.code, ErrorCode::DeliveryNotAssigned);

        let mut validated = delivery(AttemptDelivery);
        validated.validated_at = Some(5_000);
        let err = validated.ensure_can_validate(4).unwrap_err();
        assert_eq!(err.code, ErrorCode::DeliveryAlreadyValidated);

        let mut locked = delivery(AttemptDelivery);
        locked.failed_validation_attempts = MAX_VALIDATION_ATTEMPTS;
        let err = locked.ensure_can_validate(4).unwrap_err();
        assert_eq!(err.code, ErrorCode::TooManyRequests);
    }

    #[test]
    fn test_no_skipping() {
        assert!(!Created.can_transition_to(PickedUp));
        assert!(!PendingPickup.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Cancelled));
    }
}
