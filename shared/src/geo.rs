//! Geographic helpers: points, distances and geofences

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Reject points outside the WGS84 range
    pub fn validate(&self) -> Result<(), AppError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AppError::new(ErrorCode::InvalidCoordinates)
                .with_detail("latitude", self.latitude)
                .with_detail("longitude", self.longitude))
        }
    }
}

/// Great-circle distance in kilometres
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Euclidean distance in degree space.
///
/// Only meaningful for ranking nearby points against each other.
pub fn planar_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = b.latitude - a.latitude;
    let d_lng = b.longitude - a.longitude;
    (d_lat * d_lat + d_lng * d_lng).sqrt()
}

/// Average travel time in minutes for a road distance.
///
/// Speed bands: urban under 10 km (25 km/h), suburban under 50 km
/// (45 km/h), highway beyond (70 km/h).
pub fn estimate_travel_minutes(distance_km: f64) -> i64 {
    let speed = if distance_km < 10.0 {
        25.0
    } else if distance_km < 50.0 {
        45.0
    } else {
        70.0
    };
    (distance_km / speed * 60.0).round() as i64
}

/// Circular zone around a point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub center: GeoPoint,
    pub radius_km: f64,
}

impl Geofence {
    pub const fn new(center: GeoPoint, radius_km: f64) -> Self {
        Self { center, radius_km }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        haversine_km(self.center, point) <= self.radius_km
    }
}

/// Radius around a destination that flags a delivery as nearby
pub const NEARBY_RADIUS_KM: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);
    const LYON: GeoPoint = GeoPoint::new(45.7640, 4.8357);

    #[test]
    fn test_haversine_paris_lyon() {
        let d = haversine_km(PARIS, LYON);
        assert!((d - 392.0).abs() < 3.0, "got {d}");
    }

    #[test]
    fn test_haversine_zero_and_symmetric() {
        assert_eq!(haversine_km(PARIS, PARIS), 0.0);
        let ab = haversine_km(PARIS, LYON);
        let ba = haversine_km(LYON, PARIS);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_planar_distance() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(3.0, 4.0);
        assert!((planar_distance(a, b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate() {
        assert!(PARIS.validate().is_ok());
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -180.5).validate().is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_geofence_contains() {
        let fence = Geofence::new(PARIS, NEARBY_RADIUS_KM);
        assert!(fence.contains(GeoPoint::new(48.8570, 2.3525)));
        assert!(!fence.contains(GeoPoint::new(48.8700, 2.3522)));
    }

    #[test]
    fn test_travel_minutes_bands() {
        assert_eq!(estimate_travel_minutes(5.0), 12);
        assert_eq!(estimate_travel_minutes(45.0), 60);
        assert_eq!(estimate_travel_minutes(140.0), 120);
        assert_eq!(estimate_travel_minutes(0.0), 0);
    }
}
