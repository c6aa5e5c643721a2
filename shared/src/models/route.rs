//! Deliverer planned routes

use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, Geofence};
use crate::routing::{PlannedTrip, RouteStop};

/// Trip a deliverer announces in advance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PlannedRoute {
    pub id: i64,
    pub deliverer_id: i64,
    pub departure_address: String,
    pub departure_latitude: f64,
    pub departure_longitude: f64,
    pub arrival_address: String,
    pub arrival_latitude: f64,
    pub arrival_longitude: f64,
    pub departure_time: i64,
    pub available_capacity_m3: f64,
    pub max_capacity_m3: f64,
    pub corridor_km: f64,
    pub is_active: bool,
    pub created_at: i64,
}

impl PlannedRoute {
    pub fn departure(&self) -> GeoPoint {
        GeoPoint::new(self.departure_latitude, self.departure_longitude)
    }

    pub fn arrival(&self) -> GeoPoint {
        GeoPoint::new(self.arrival_latitude, self.arrival_longitude)
    }

    pub fn as_trip(&self) -> PlannedTrip {
        PlannedTrip {
            departure: self.departure(),
            arrival: self.arrival(),
            departure_time: self.departure_time,
            available_capacity: self.available_capacity_m3,
            max_capacity: self.max_capacity_m3,
        }
    }

    /// Zones around both ends of the trip
    pub fn geofences(&self) -> [Geofence; 2] {
        [
            Geofence::new(self.departure(), self.corridor_km),
            Geofence::new(self.arrival(), self.corridor_km),
        ]
    }

    /// Whether a pickup lies inside one of the route's geofences
    pub fn covers(&self, point: GeoPoint) -> bool {
        self.geofences().iter().any(|g| g.contains(point))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannedRouteCreate {
    pub departure_address: String,
    pub departure: GeoPoint,
    pub arrival_address: String,
    pub arrival: GeoPoint,
    pub departure_time: i64,
    #[serde(default = "default_capacity")]
    pub available_capacity_m3: f64,
    #[serde(default = "default_capacity")]
    pub max_capacity_m3: f64,
    #[serde(default = "default_corridor")]
    pub corridor_km: f64,
}

fn default_capacity() -> f64 {
    1.0
}

fn default_corridor() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteOptimizationRequest {
    pub start: GeoPoint,
    pub stops: Vec<RouteStop>,
}

/// Search for planned trips that can carry a parcel
#[derive(Debug, Clone, Deserialize)]
pub struct RouteSearchQuery {
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub delivery_latitude: f64,
    pub delivery_longitude: f64,
    pub departure_time: i64,
    pub max_detour_km: Option<f64>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> PlannedRoute {
        PlannedRoute {
            id: 1,
            deliverer_id: 2,
            departure_address: "Paris".into(),
            departure_latitude: 48.8566,
            departure_longitude: 2.3522,
            arrival_address: "Lyon".into(),
            arrival_latitude: 45.7640,
            arrival_longitude: 4.8357,
            departure_time: 0,
            available_capacity_m3: 1.0,
            max_capacity_m3: 2.0,
            corridor_km: 5.0,
            is_active: true,
            created_at: 0,
        }
    }

    #[test]
    fn test_covers_both_ends() {
        let r = route();
        assert!(r.covers(GeoPoint::new(48.86, 2.35)));
        assert!(r.covers(GeoPoint::new(45.77, 4.84)));
        assert!(!r.covers(GeoPoint::new(47.0, 3.5)));
    }

    #[test]
    fn test_as_trip() {
        let trip = route().as_trip();
        assert_eq!(trip.max_capacity, 2.0);
        assert_eq!(trip.departure, GeoPoint::new(48.8566, 2.3522));
    }
}
