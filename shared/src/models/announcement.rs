//! Delivery announcements and deliverer applications

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::pricing::PackageTraits;

/// Delivery urgency, most urgent first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

db_enum!(Priority {
    Urgent => "URGENT",
    High => "HIGH",
    Normal => "NORMAL",
    Low => "LOW",
});

impl Priority {
    /// Sort rank, 0 is most urgent
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnouncementType {
    #[default]
    Package,
    Shopping,
    AirportTransfer,
    CartDrop,
    InternationalPurchase,
}

db_enum!(AnnouncementType {
    Package => "PACKAGE",
    Shopping => "SHOPPING",
    AirportTransfer => "AIRPORT_TRANSFER",
    CartDrop => "CART_DROP",
    InternationalPurchase => "INTERNATIONAL_PURCHASE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnouncementStatus {
    Open,
    Assigned,
    InTransit,
    Delivered,
    Cancelled,
}

db_enum!(AnnouncementStatus {
    Open => "OPEN",
    Assigned => "ASSIGNED",
    InTransit => "IN_TRANSIT",
    Delivered => "DELIVERED",
    Cancelled => "CANCELLED",
});

impl AnnouncementStatus {
    pub fn can_transition_to(&self, next: Self) -> bool {
        use AnnouncementStatus::*;
        matches!(
            (self, next),
            (Open, Assigned)
                | (Open, Cancelled)
                | (Assigned, InTransit)
                | (Assigned, Open)
                | (Assigned, Cancelled)
                | (InTransit, Delivered)
                | (InTransit, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

db_enum!(ApplicationStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
    Withdrawn => "WITHDRAWN",
});

/// Announcement row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Announcement {
    pub id: i64,
    pub client_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub announcement_type: String,
    pub status: String,
    pub priority: String,
    pub pickup_address: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub delivery_address: String,
    pub delivery_latitude: f64,
    pub delivery_longitude: f64,
    pub pickup_date: Option<i64>,
    pub delivery_date: Option<i64>,
    pub weight_kg: f64,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub fragile: bool,
    pub requires_cooling: bool,
    pub suggested_price: f64,
    pub final_price: Option<f64>,
    pub negotiable: bool,
    pub distance_km: f64,
    pub deliverer_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Announcement {
    pub fn status(&self) -> Option<AnnouncementStatus> {
        AnnouncementStatus::from_db(&self.status)
    }

    pub fn priority(&self) -> Priority {
        Priority::from_db(&self.priority).unwrap_or_default()
    }

    pub fn pickup(&self) -> GeoPoint {
        GeoPoint::new(self.pickup_latitude, self.pickup_longitude)
    }

    pub fn destination(&self) -> GeoPoint {
        GeoPoint::new(self.delivery_latitude, self.delivery_longitude)
    }

    /// Parcel volume in cubic metres, when all dimensions are known
    pub fn volume_m3(&self) -> Option<f64> {
        match (self.length_cm, self.width_cm, self.height_cm) {
            (Some(l), Some(w), Some(h)) => Some(l * w * h / 1_000_000.0),
            _ => None,
        }
    }

    pub fn package_traits(&self) -> PackageTraits {
        PackageTraits {
            weight_kg: self.weight_kg,
            fragile: self.fragile,
            requires_cooling: self.requires_cooling,
            priority: self.priority(),
        }
    }

    /// Price agreed with the deliverer, or the suggested one
    pub fn effective_price(&self) -> f64 {
        self.final_price.unwrap_or(self.suggested_price)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnnouncementRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub announcement_type: AnnouncementType,
    #[serde(default)]
    pub priority: Priority,
    pub pickup_address: String,
    pub pickup: GeoPoint,
    pub delivery_address: String,
    pub destination: GeoPoint,
    pub pickup_date: Option<i64>,
    pub delivery_date: Option<i64>,
    pub weight_kg: f64,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub fragile: bool,
    #[serde(default)]
    pub requires_cooling: bool,
    pub price: Option<f64>,
    #[serde(default)]
    pub negotiable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAnnouncementRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub pickup_date: Option<i64>,
    pub delivery_date: Option<i64>,
    pub price: Option<f64>,
    pub negotiable: Option<bool>,
}

/// List filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnouncementQuery {
    pub status: Option<AnnouncementStatus>,
    pub announcement_type: Option<AnnouncementType>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: Option<f64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Deliverer proposal on an announcement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Application {
    pub id: i64,
    pub announcement_id: i64,
    pub deliverer_id: i64,
    pub proposed_price: f64,
    pub message: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplyRequest {
    pub proposed_price: Option<f64>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let ranks: Vec<u8> = Priority::ALL.iter().map(|p| p.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_announcement_transitions() {
        use AnnouncementStatus::*;
        assert!(Open.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
        assert!(Open.can_transition_to(Cancelled));
        assert!(InTransit.can_transition_to(Cancelled));
        assert!(!Open.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Open));
    }

    #[test]
    fn test_terminal() {
        assert!(AnnouncementStatus::Delivered.is_terminal());
        assert!(AnnouncementStatus::Cancelled.is_terminal());
        assert!(!AnnouncementStatus::Assigned.is_terminal());
    }

    #[test]
    fn test_type_serde() {
        let t: AnnouncementType = serde_json::from_str("\"AIRPORT_TRANSFER\"").unwrap();
        assert_eq!(t, AnnouncementType::AirportTransfer);
        assert_eq!(t.as_db(), "AIRPORT_TRANSFER");
    }
}
