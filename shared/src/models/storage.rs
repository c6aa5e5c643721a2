//! Warehouses, storage boxes and reservations

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoxType {
    Standard,
    ClimateControlled,
    Secure,
    ExtraLarge,
    Refrigerated,
    Fragile,
}

db_enum!(BoxType {
    Standard => "STANDARD",
    ClimateControlled => "CLIMATE_CONTROLLED",
    Secure => "SECURE",
    ExtraLarge => "EXTRA_LARGE",
    Refrigerated => "REFRIGERATED",
    Fragile => "FRAGILE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Active,
    Extended,
    Completed,
    Cancelled,
    Overdue,
}

db_enum!(ReservationStatus {
    Pending => "PENDING",
    Active => "ACTIVE",
    Extended => "EXTENDED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Overdue => "OVERDUE",
});

impl ReservationStatus {
    /// Statuses that occupy the box
    pub const BLOCKING: [ReservationStatus; 3] = [Self::Pending, Self::Active, Self::Extended];

    pub fn is_blocking(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    /// The client may open the box
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Active | Self::Extended)
    }

    pub fn can_extend(&self) -> bool {
        matches!(self, Self::Active | Self::Extended)
    }
}

/// Inclusive interval overlap, touching bounds count as a conflict
pub fn periods_overlap(start: i64, end: i64, other_start: i64, other_end: i64) -> bool {
    start <= other_end && end >= other_start
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Warehouse {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct StorageBox {
    pub id: i64,
    pub warehouse_id: i64,
    pub box_number: String,
    pub size_m3: f64,
    pub box_type: String,
    pub features: Vec<String>,
    pub price_per_day: f64,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Reservation {
    pub id: i64,
    pub box_id: i64,
    pub client_id: i64,
    pub start_date: i64,
    pub end_date: i64,
    pub status: String,
    pub total_price: f64,
    pub access_code: String,
    pub extended_count: i32,
    pub payment_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Reservation {
    pub fn status(&self) -> Option<ReservationStatus> {
        ReservationStatus::from_db(&self.status)
    }

    /// A client may drop a PENDING or ACTIVE reservation until the rental starts
    pub fn ensure_cancellable(&self, now: i64) -> Result<(), AppError> {
        match self.status() {
            Some(ReservationStatus::Pending | ReservationStatus::Active) => {}
            _ => {
                return Err(AppError::invalid_transition(
                    self.status.as_str(),
                    ReservationStatus::Cancelled.as_db(),
                ));
            }
        }
        if now >= self.start_date {
            return Err(AppError::business_rule("The rental period has already started"));
        }
        Ok(())
    }

    /// What a captured storage payment does to this reservation
    pub fn effect_of_capture(&self, payment_id: i64) -> StoragePaymentEffect {
        match self.status() {
            Some(ReservationStatus::Cancelled) => StoragePaymentEffect::Refund,
            Some(ReservationStatus::Pending) if self.payment_id == Some(payment_id) => {
                StoragePaymentEffect::Activate
            }
            _ => StoragePaymentEffect::Keep,
        }
    }

    /// What a failed or cancelled storage payment undoes. `extension` is
    /// the extension the payment was opened for, if any.
    pub fn effect_of_drop(
        &self,
        payment_id: i64,
        extension: Option<&ReservationExtension>,
    ) -> StoragePaymentEffect {
        if self.payment_id == Some(payment_id) {
            return match self.status() {
                Some(ReservationStatus::Pending) => StoragePaymentEffect::Cancel,
                _ => StoragePaymentEffect::Keep,
            };
        }
        let unpaid_latest = extension.is_some_and(|e| {
            e.payment_id == payment_id
                && e.reservation_id == self.id
                && e.status() == Some(ExtensionStatus::Pending)
                && e.new_end_date == self.end_date
        });
        if unpaid_latest && self.status().is_some_and(|s| s.can_extend()) {
            StoragePaymentEffect::RevertExtension
        } else {
            StoragePaymentEffect::Keep
        }
    }
}

/// Reservation change caused by a storage payment event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePaymentEffect {
    /// First payment captured: the reservation becomes ACTIVE
    Activate,
    /// First payment dropped: the reservation is cancelled
    Cancel,
    /// Extension payment dropped: the previous end date comes back
    RevertExtension,
    /// Money arrived for a cancelled reservation and goes back
    Refund,
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionStatus {
    Pending,
    Paid,
    Reverted,
}

db_enum!(ExtensionStatus {
    Pending => "PENDING",
    Paid => "PAID",
    Reverted => "REVERTED",
});

/// End date moved by an extension. Applied at once, undone when its
/// payment fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ReservationExtension {
    pub id: i64,
    pub reservation_id: i64,
    pub payment_id: i64,
    pub previous_end_date: i64,
    pub new_end_date: i64,
    pub extra_price: f64,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ReservationExtension {
    pub fn status(&self) -> Option<ExtensionStatus> {
        ExtensionStatus::from_db(&self.status)
    }
}

/// Box access log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct BoxUsage {
    pub id: i64,
    pub reservation_id: i64,
    pub box_id: i64,
    pub action: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoxSearchQuery {
    pub warehouse_id: Option<i64>,
    pub city: Option<String>,
    pub min_size_m3: Option<f64>,
    pub max_size_m3: Option<f64>,
    pub max_price_per_day: Option<f64>,
    pub box_type: Option<BoxType>,
    /// Comma separated, all must be present
    pub features: Option<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
}

impl BoxSearchQuery {
    pub fn feature_list(&self) -> Vec<String> {
        self.features
            .as_deref()
            .map(|f| {
                f.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteQuery {
    pub box_id: i64,
    pub start_date: i64,
    pub end_date: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveRequest {
    pub box_id: i64,
    pub start_date: i64,
    pub end_date: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendRequest {
    pub new_end_date: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessRequest {
    pub access_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseCreate {
    pub name: String,
    pub address: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxCreate {
    pub box_number: String,
    pub size_m3: f64,
    pub box_type: BoxType,
    #[serde(default)]
    pub features: Vec<String>,
    pub price_per_day: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxUpdate {
    pub price_per_day: Option<f64>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_inclusive() {
        assert!(periods_overlap(10, 20, 15, 25));
        assert!(periods_overlap(10, 20, 20, 30));
        assert!(periods_overlap(10, 20, 0, 10));
        assert!(periods_overlap(10, 20, 12, 18));
        assert!(!periods_overlap(10, 20, 21, 30));
        assert!(!periods_overlap(10, 20, 0, 9));
    }

    #[test]
    fn test_blocking_statuses() {
        assert!(ReservationStatus::Pending.is_blocking());
        assert!(ReservationStatus::Extended.is_blocking());
        assert!(!ReservationStatus::Completed.is_blocking());
        assert!(!ReservationStatus::Cancelled.is_blocking());
    }

    #[test]
    fn test_access_rules() {
        assert!(ReservationStatus::Active.grants_access());
        assert!(!ReservationStatus::Pending.grants_access());
        assert!(ReservationStatus::Extended.can_extend());
        assert!(!ReservationStatus::Completed.can_extend());
    }

    fn reservation(status: ReservationStatus, end_date: i64) -> Reservation {
        Reservation {
            id: 10,
            box_id: 20,
            client_id: 30,
            start_date: 1_000,
            end_date,
            status: status.as_db().to_string(),
            total_price: 50.0,
            access_code: "AB12CD".into(),
            extended_count: 1,
            payment_id: Some(100),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn extension(payment_id: i64, new_end_date: i64, status: ExtensionStatus) -> ReservationExtension {
        ReservationExtension {
            id: 1,
            reservation_id: 10,
            payment_id,
            previous_end_date: 5_000,
            new_end_date,
            extra_price: 12.0,
            status: status.as_db().to_string(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_cancel_window() {
        use crate::error::ErrorCode;
        assert!(reservation(ReservationStatus::Pending, 5_000).ensure_cancellable(999).is_ok());
        assert!(reservation(ReservationStatus::Active, 5_000).ensure_cancellable(999).is_ok());

        let err = reservation(ReservationStatus::Active, 5_000)
            .ensure_cancellable(1_000)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);

        for status in [
            ReservationStatus::Extended,
            ReservationStatus::Completed,
            ReservationStatus::Cancelled,
        ] {
            let err = reservation(status, 5_000).ensure_cancellable(0).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidStatusTransition, "{status}");
        }
    }

    #[test]
    fn test_capture_effects() {
        use StoragePaymentEffect::*;
        assert_eq!(reservation(ReservationStatus::Pending, 5_000).effect_of_capture(100), Activate);
        assert_eq!(reservation(ReservationStatus::Active, 5_000).effect_of_capture(100), Keep);
        assert_eq!(reservation(ReservationStatus::Extended, 9_000).effect_of_capture(200), Keep);
        // paid after the reservation was dropped
        assert_eq!(reservation(ReservationStatus::Cancelled, 5_000).effect_of_capture(100), Refund);
        assert_eq!(reservation(ReservationStatus::Cancelled, 9_000).effect_of_capture(200), Refund);
    }

    #[test]
    fn test_dropped_first_payment_cancels_pending_only() {
        use StoragePaymentEffect::*;
        assert_eq!(reservation(ReservationStatus::Pending, 5_000).effect_of_drop(100, None), Cancel);
        assert_eq!(reservation(ReservationStatus::Active, 5_000).effect_of_drop(100, None), Keep);
    }

    #[test]
    fn test_dropped_extension_payment_reverts() {
        use StoragePaymentEffect::*;
        let r = reservation(ReservationStatus::Extended, 9_000);
        let pending = extension(200, 9_000, ExtensionStatus::Pending);
        assert_eq!(r.effect_of_drop(200, Some(&pending)), RevertExtension);

        let paid = extension(200, 9_000, ExtensionStatus::Paid);
        assert_eq!(r.effect_of_drop(200, Some(&paid)), Keep);

        let other_payment = extension(300, 9_000, ExtensionStatus::Pending);
        assert_eq!(r.effect_of_drop(200, Some(&other_payment)), Keep);

        let not_latest = extension(200, 7_000, ExtensionStatus::Pending);
        assert_eq!(r.effect_of_drop(200, Some(&not_latest)), Keep);

        let finished = reservation(ReservationStatus::Completed, 9_000);
        assert_eq!(finished.effect_of_drop(200, Some(&pending)), Keep);
        assert_eq!(r.effect_of_drop(200, None), Keep);
    }

    #[test]
    fn test_feature_list() {
        let q = BoxSearchQuery {
            features: Some("camera, alarm,,".into()),
            ..Default::default()
        };
        assert_eq!(q.feature_list(), vec!["camera", "alarm"]);
        assert!(BoxSearchQuery::default().feature_list().is_empty());
    }
}
