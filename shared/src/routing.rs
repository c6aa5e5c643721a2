//! Deliverer route planning
//!
//! `optimize_delivery_route` orders a deliverer's stops: priority first
//! (URGENT, HIGH, NORMAL, LOW), then a greedy nearest-neighbour walk inside
//! each priority group. Distances reported to callers are haversine
//! kilometres; the neighbour search ranks with the planar approximation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, estimate_travel_minutes, haversine_km, planar_distance};
use crate::models::Priority;
use crate::pricing::{round_money, to_decimal, to_f64};
use crate::util::HOUR_MS;

/// Flat earnings credited for a stop without a known price
pub const DEFAULT_STOP_EARNINGS: f64 = 12.0;
/// Default handover time spent at each stop
pub const DEFAULT_SERVICE_MINUTES: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub delivery_id: i64,
    pub address: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub service_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStep {
    pub order: u32,
    pub delivery_id: i64,
    pub address: String,
    pub location: GeoPoint,
    pub priority: Priority,
    pub distance_from_previous_km: f64,
    pub estimated_arrival: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedRoute {
    pub steps: Vec<RouteStep>,
    pub total_distance_km: f64,
    pub total_duration_minutes: i64,
    pub estimated_earnings: f64,
    pub distance_saved_km: f64,
}

fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

fn path_length(start: GeoPoint, stops: &[&RouteStop]) -> f64 {
    let mut current = start;
    let mut total = 0.0;
    for stop in stops {
        total += haversine_km(current, stop.location);
        current = stop.location;
    }
    total
}

/// Order stops by priority then proximity and compute route totals.
pub fn optimize_delivery_route(start: GeoPoint, stops: &[RouteStop], now: i64) -> OptimizedRoute {
    let mut ordered: Vec<&RouteStop> = Vec::with_capacity(stops.len());
    let mut current = start;

    for &priority in Priority::ALL {
        let mut group: Vec<&RouteStop> = stops.iter().filter(|s| s.priority == priority).collect();
        while !group.is_empty() {
            // min_by keeps the first of equal elements, so ties keep input order
            let (idx, _) = group
                .iter()
                .enumerate()
                .map(|(i, s)| (i, planar_distance(current, s.location)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap_or((0, 0.0));
            let next = group.remove(idx);
            current = next.location;
            ordered.push(next);
        }
    }

    let mut steps = Vec::with_capacity(ordered.len());
    let mut previous = start;
    let mut total_km = 0.0;
    let mut elapsed_minutes = 0_i64;
    let mut earnings = Decimal::ZERO;

    for (i, stop) in ordered.iter().enumerate() {
        let leg = haversine_km(previous, stop.location);
        total_km += leg;
        elapsed_minutes += estimate_travel_minutes(leg);
        steps.push(RouteStep {
            order: (i + 1) as u32,
            delivery_id: stop.delivery_id,
            address: stop.address.clone(),
            location: stop.location,
            priority: stop.priority,
            distance_from_previous_km: round_km(leg),
            estimated_arrival: now + elapsed_minutes * 60_000,
        });
        elapsed_minutes += stop.service_minutes.unwrap_or(DEFAULT_SERVICE_MINUTES);
        earnings += to_decimal(stop.price.unwrap_or(DEFAULT_STOP_EARNINGS));
        previous = stop.location;
    }

    let input_order: Vec<&RouteStop> = stops.iter().collect();
    let naive_km = path_length(start, &input_order);

    OptimizedRoute {
        steps,
        total_distance_km: round_km(total_km),
        total_duration_minutes: elapsed_minutes,
        estimated_earnings: to_f64(round_money(earnings)),
        distance_saved_km: round_km((naive_km - total_km).max(0.0)),
    }
}

/// Pickup a planned route is checked against
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PickupWindow {
    pub location: GeoPoint,
    pub pickup_time: i64,
}

/// Score (0-100) how well pickups fit a route departing at `departure`.
///
/// Each pickup further than 10 km loses up to 30 points, each pickup more
/// than 2 h away from the departure time loses up to 20 points. No pickups
/// scores 0.
pub fn route_compatibility(departure: GeoPoint, departure_time: i64, pickups: &[PickupWindow]) -> u32 {
    if pickups.is_empty() {
        return 0;
    }
    let mut score = 100.0_f64;
    for pickup in pickups {
        let distance = haversine_km(departure, pickup.location);
        if distance > 10.0 {
            score -= (distance - 10.0).min(30.0);
        }
        let hours = (departure_time - pickup.pickup_time).abs() as f64 / HOUR_MS as f64;
        if hours > 2.0 {
            score -= ((hours - 2.0) * 10.0).min(20.0);
        }
    }
    score.floor().max(0.0) as u32
}

/// Deliverer reliability inputs for detour scoring
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DelivererStats {
    pub average_rating: Option<f64>,
    pub total_deliveries: i64,
    pub on_time_rate: Option<f64>,
}

/// Planned trip a deliverer already makes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlannedTrip {
    pub departure: GeoPoint,
    pub arrival: GeoPoint,
    pub departure_time: i64,
    pub available_capacity: f64,
    pub max_capacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetourEvaluation {
    pub compatible: bool,
    pub score: u32,
    pub detour_km: f64,
    pub time_compatibility: u32,
    pub estimated_price: f64,
    pub estimated_duration_minutes: i64,
    pub carbon_savings_kg: f64,
}

impl DetourEvaluation {
    fn rejected(detour_km: f64) -> Self {
        Self {
            compatible: false,
            score: 0,
            detour_km: round_km(detour_km),
            time_compatibility: 0,
            estimated_price: 0.0,
            estimated_duration_minutes: 0,
            carbon_savings_kg: 0.0,
        }
    }
}

/// Evaluate carrying a pickup → delivery leg on an existing planned trip.
///
/// The detour is the extra distance of departure → pickup → delivery →
/// arrival over the direct trip. Trips above `max_detour_km` are rejected;
/// otherwise a weighted score (geography 35 %, time 25 %, reliability 20 %,
/// carbon 10 %, spare capacity 10 %) must reach 40.
pub fn evaluate_trip_detour(
    trip: &PlannedTrip,
    pickup: GeoPoint,
    delivery: GeoPoint,
    requested_time: i64,
    max_detour_km: f64,
    stats: Option<DelivererStats>,
) -> DetourEvaluation {
    let direct = haversine_km(trip.departure, trip.arrival);
    let to_pickup = haversine_km(trip.departure, pickup);
    let carried = haversine_km(pickup, delivery);
    let to_arrival = haversine_km(delivery, trip.arrival);
    let with_detour = to_pickup + carried + to_arrival;
    let detour = with_detour - direct;

    if max_detour_km <= 0.0 || detour > max_detour_km {
        return DetourEvaluation::rejected(detour);
    }

    let geographic = ((max_detour_km - detour) / max_detour_km * 100.0).clamp(0.0, 100.0);
    let hours = (trip.departure_time - requested_time).abs() as f64 / HOUR_MS as f64;
    let time_compat = ((6.0 - hours) / 6.0 * 100.0).max(0.0);

    let price = 3.50 + carried * 1.20 + detour.max(0.0) * 0.80;
    let duration = (with_detour / 50.0 * 60.0).round() as i64;

    // A dedicated courier would drive the carried leg on top of the planned trip
    let saved_km = (direct + carried - with_detour).max(0.0);
    let carbon = saved_km * 0.12;

    let reliability = match stats {
        Some(s) => {
            s.average_rating.unwrap_or(3.0) / 5.0 * 30.0
                + (s.total_deliveries as f64 / 10.0).min(30.0)
                + s.on_time_rate.unwrap_or(0.8) * 40.0
        }
        None => 50.0,
    };
    let max_capacity = if trip.max_capacity > 0.0 {
        trip.max_capacity
    } else {
        5.0
    };
    let capacity = (trip.available_capacity / max_capacity * 100.0).clamp(0.0, 100.0);

    let score = (geographic * 0.35
        + time_compat * 0.25
        + reliability * 0.20
        + (carbon * 10.0).min(100.0) * 0.10
        + capacity * 0.10)
        .round()
        .max(0.0) as u32;

    DetourEvaluation {
        compatible: score >= 40,
        score,
        detour_km: round_km(detour),
        time_compatibility: time_compat.round() as u32,
        estimated_price: (price * 100.0).round() / 100.0,
        estimated_duration_minutes: duration,
        carbon_savings_kg: (carbon * 100.0).round() / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(id: i64, lat: f64, lng: f64, priority: Priority) -> RouteStop {
        RouteStop {
            delivery_id: id,
            address: format!("stop {id}"),
            location: GeoPoint::new(lat, lng),
            priority,
            price: None,
            service_minutes: None,
        }
    }

    const START: GeoPoint = GeoPoint::new(48.8566, 2.3522);

    #[test]
    fn test_empty_route() {
        let route = optimize_delivery_route(START, &[], 0);
        assert!(route.steps.is_empty());
        assert_eq!(route.total_distance_km, 0.0);
        assert_eq!(route.total_duration_minutes, 0);
        assert_eq!(route.estimated_earnings, 0.0);
        assert_eq!(route.distance_saved_km, 0.0);
    }

    #[test]
    fn test_priority_before_proximity() {
        let stops = vec![
            stop(1, 48.86, 2.36, Priority::Low),
            stop(2, 48.95, 2.50, Priority::Urgent),
            stop(3, 48.87, 2.35, Priority::Normal),
        ];
        let route = optimize_delivery_route(START, &stops, 0);
        let ids: Vec<i64> = route.steps.iter().map(|s| s.delivery_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(route.steps[0].order, 1);
        assert_eq!(route.steps[2].order, 3);
    }

    #[test]
    fn test_nearest_neighbour_within_group() {
        // Input order zig-zags; greedy walk should go outwards along the line
        let stops = vec![
            stop(1, 48.90, 2.3522, Priority::Normal),
            stop(2, 48.86, 2.3522, Priority::Normal),
            stop(3, 48.95, 2.3522, Priority::Normal),
            stop(4, 48.88, 2.3522, Priority::Normal),
        ];
        let route = optimize_delivery_route(START, &stops, 0);
        let ids: Vec<i64> = route.steps.iter().map(|s| s.delivery_id).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
        assert!(route.distance_saved_km > 0.0);
    }

    #[test]
    fn test_totals_and_arrivals() {
        let mut a = stop(1, 48.8666, 2.3522, Priority::Normal);
        a.price = Some(15.5);
        let b = stop(2, 48.8766, 2.3522, Priority::Normal);
        let route = optimize_delivery_route(START, &[a, b], 1_000);

        // two legs of ~1.11 km each
        assert!((route.total_distance_km - 2.22).abs() < 0.02);
        assert_eq!(route.estimated_earnings, 27.5);
        // 3 min travel, 5 min service, 3 min travel, 5 min service
        assert_eq!(route.total_duration_minutes, 16);
        assert_eq!(route.steps[0].estimated_arrival, 1_000 + 3 * 60_000);
        assert_eq!(route.steps[1].estimated_arrival, 1_000 + 11 * 60_000);
        assert_eq!(route.distance_saved_km, 0.0);
    }

    #[test]
    fn test_route_compatibility_penalties() {
        let now = 10 * HOUR_MS;
        assert_eq!(route_compatibility(START, now, &[]), 0);

        let close = PickupWindow {
            location: START,
            pickup_time: now,
        };
        assert_eq!(route_compatibility(START, now, &[close]), 100);

        let late = PickupWindow {
            location: START,
            pickup_time: now + 3 * HOUR_MS,
        };
        assert_eq!(route_compatibility(START, now, &[late]), 90);

        let very_late = PickupWindow {
            location: START,
            pickup_time: now + 8 * HOUR_MS,
        };
        assert_eq!(route_compatibility(START, now, &[very_late]), 80);

        // Lyon is ~390 km away: distance penalty caps at 30
        let far = PickupWindow {
            location: GeoPoint::new(45.7640, 4.8357),
            pickup_time: now,
        };
        assert_eq!(route_compatibility(START, now, &[far]), 70);
        assert_eq!(
            route_compatibility(START, now, &[far, far, far, far]),
            0
        );
    }

    #[test]
    fn test_detour_rejected_when_too_far() {
        let trip = PlannedTrip {
            departure: START,
            arrival: GeoPoint::new(48.9566, 2.3522),
            departure_time: 0,
            available_capacity: 2.0,
            max_capacity: 4.0,
        };
        let eval = evaluate_trip_detour(
            &trip,
            GeoPoint::new(45.7640, 4.8357),
            GeoPoint::new(45.77, 4.84),
            0,
            10.0,
            None,
        );
        assert!(!eval.compatible);
        assert_eq!(eval.score, 0);
        assert!(eval.detour_km > 10.0);
    }

    #[test]
    fn test_detour_on_route_is_compatible() {
        let trip = PlannedTrip {
            departure: START,
            arrival: GeoPoint::new(48.9566, 2.3522),
            departure_time: 0,
            available_capacity: 4.0,
            max_capacity: 4.0,
        };
        let eval = evaluate_trip_detour(
            &trip,
            GeoPoint::new(48.8766, 2.3522),
            GeoPoint::new(48.9366, 2.3522),
            0,
            10.0,
            Some(DelivererStats {
                average_rating: Some(5.0),
                total_deliveries: 300,
                on_time_rate: Some(1.0),
            }),
        );
        assert!(eval.compatible);
        assert!(eval.detour_km.abs() < 0.05);
        assert_eq!(eval.time_compatibility, 100);
        assert!(eval.score >= 90, "score {}", eval.score);
        assert!(eval.estimated_price > 3.5);
    }
}
