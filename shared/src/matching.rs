//! Announcement ↔ deliverer matching
//!
//! Each candidate is scored on six components (0–100 each) which are then
//! weighted into a total:
//!
//! | component  | weight |
//! |------------|--------|
//! | geographic | 0.25   |
//! | temporal   | 0.20   |
//! | capacity   | 0.20   |
//! | price      | 0.15   |
//! | reputation | 0.15   |
//! | preference | 0.05   |
//!
//! Candidates incompatible on geography, timing or capacity are dropped,
//! as are totals below [`MIN_TOTAL_SCORE`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, estimate_travel_minutes, haversine_km};
use crate::models::{Announcement, Priority};
use crate::pricing::estimate_delivery_price;
use crate::routing::PlannedTrip;
use crate::util::HOUR_MS;

/// Matches below this total are not proposed
pub const MIN_TOTAL_SCORE: u32 = 50;
/// Route-based geographic score needed to count as compatible
const MIN_ROUTE_SCORE: f64 = 30.0;
/// Only the most recent reviews feed the "recent reviews" bonus
const RECENT_REVIEW_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingCriteria {
    pub max_distance_km: f64,
    pub max_detour_percent: f64,
    pub time_flexibility_hours: f64,
    pub min_deliverer_rating: f64,
    pub price_flexibility_percent: f64,
    pub prioritize_experience: bool,
    pub prioritize_speed: bool,
    pub prioritize_price: bool,
}

impl Default for MatchingCriteria {
    fn default() -> Self {
        Self {
            max_distance_km: 50.0,
            max_detour_percent: 30.0,
            time_flexibility_hours: 24.0,
            min_deliverer_rating: 3.0,
            price_flexibility_percent: 20.0,
            prioritize_experience: false,
            prioritize_speed: false,
            prioritize_price: false,
        }
    }
}

/// Vehicle limits of a deliverer, `None` when unknown
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VehicleCapacity {
    pub max_weight_kg: Option<f64>,
    pub max_volume_m3: Option<f64>,
    pub careful_handling: bool,
    pub refrigerated: bool,
}

/// Everything the engine knows about one deliverer
#[derive(Debug, Clone, Default)]
pub struct DelivererCandidate {
    pub deliverer_id: i64,
    pub location: Option<GeoPoint>,
    pub average_rating: Option<f64>,
    pub completed_deliveries: i64,
    /// Newest first
    pub recent_ratings: Vec<i32>,
    pub vehicle: Option<VehicleCapacity>,
    pub routes: Vec<PlannedTrip>,
    pub accepts_negotiation: bool,
}

/// Client history: deliverers they rated well or asked never to see again
#[derive(Debug, Clone, Default)]
pub struct ClientPreferences {
    pub preferred_deliverers: Vec<i64>,
    pub blacklisted_deliverers: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationLevel {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl RecommendationLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            85.. => Self::Excellent,
            70.. => Self::Good,
            50.. => Self::Acceptable,
            _ => Self::Poor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchingScore {
    pub total: u32,
    pub geographic: f64,
    pub temporal: f64,
    pub capacity: f64,
    pub price: f64,
    pub reputation: f64,
    pub preference: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DelivererMatch {
    pub deliverer_id: i64,
    pub announcement_id: i64,
    pub score: MatchingScore,
    pub estimated_price: f64,
    pub estimated_duration_minutes: i64,
    pub distance_km: f64,
    pub detour_percent: f64,
    pub reasons: Vec<&'static str>,
    pub risks: Vec<&'static str>,
    pub recommendation: RecommendationLevel,
}

/// Result of one scoring component
#[derive(Debug, Clone, Default)]
pub struct ComponentEval {
    pub compatible: bool,
    pub score: f64,
    pub reasons: Vec<&'static str>,
    pub risks: Vec<&'static str>,
}

impl ComponentEval {
    fn base(score: f64) -> Self {
        Self {
            compatible: true,
            score,
            ..Default::default()
        }
    }

    fn clamped(mut self) -> Self {
        self.score = self.score.clamp(0.0, 100.0);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeographicEval {
    pub eval: ComponentEval,
    pub distance_km: f64,
    pub detour_percent: f64,
    pub estimated_duration_minutes: i64,
}

struct RouteFit {
    score: f64,
    distance_km: f64,
    detour_percent: f64,
    duration_minutes: i64,
}

fn route_fit(announcement: &Announcement, trip: &PlannedTrip, criteria: &MatchingCriteria) -> RouteFit {
    let pickup = announcement.pickup();
    let destination = announcement.destination();
    let direct = haversine_km(trip.departure, trip.arrival);
    let with_parcel = haversine_km(trip.departure, pickup)
        + haversine_km(pickup, destination)
        + haversine_km(destination, trip.arrival);

    let detour_percent = if direct > 0.0 {
        (with_parcel - direct) / direct * 100.0
    } else if with_parcel > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    if detour_percent > criteria.max_detour_percent {
        return RouteFit {
            score: 0.0,
            distance_km: with_parcel,
            detour_percent,
            duration_minutes: 0,
        };
    }

    RouteFit {
        score: (50.0 - detour_percent / criteria.max_detour_percent * 50.0).max(0.0),
        distance_km: haversine_km(pickup, destination),
        detour_percent,
        duration_minutes: estimate_travel_minutes(with_parcel),
    }
}

/// Planned routes first (best detour wins), home proximity otherwise
pub fn geographic_score(
    announcement: &Announcement,
    candidate: &DelivererCandidate,
    criteria: &MatchingCriteria,
) -> GeographicEval {
    let mut out = GeographicEval::default();

    if !candidate.routes.is_empty() {
        let best = candidate
            .routes
            .iter()
            .map(|trip| route_fit(announcement, trip, criteria))
            .filter(|fit| fit.score > 0.0)
            .max_by(|a, b| a.score.total_cmp(&b.score));

        if let Some(fit) = best {
            out.eval.score = fit.score;
            out.distance_km = fit.distance_km;
            out.detour_percent = fit.detour_percent;
            out.estimated_duration_minutes = fit.duration_minutes;
            out.eval.compatible = fit.score >= MIN_ROUTE_SCORE;
            if out.eval.compatible {
                out.eval.reasons.push("ROUTE_COMPATIBLE");
                if fit.detour_percent <= 10.0 {
                    out.eval.reasons.push("MINIMAL_DETOUR");
                }
                if fit.distance_km <= 20.0 {
                    out.eval.reasons.push("SHORT_DISTANCE");
                }
            } else {
                out.eval.risks.push("SIGNIFICANT_DETOUR");
            }
        }
        return out;
    }

    if let Some(home) = candidate.location {
        let distance = haversine_km(announcement.pickup(), home);
        out.distance_km = distance;
        if distance <= criteria.max_distance_km {
            out.eval.compatible = true;
            out.eval.score = (50.0 - distance / criteria.max_distance_km * 50.0).max(0.0);
            out.estimated_duration_minutes = estimate_travel_minutes(distance);
            out.eval.reasons.push("PROXIMITY_COMPATIBLE");
            if distance <= 10.0 {
                out.eval.reasons.push("VERY_CLOSE");
            }
        } else {
            out.eval.risks.push("DISTANCE_TOO_FAR");
        }
    }
    out
}

/// Pickup date against the flexibility window, plus urgency bonus
pub fn temporal_score(announcement: &Announcement, criteria: &MatchingCriteria, now: i64) -> ComponentEval {
    let mut eval = ComponentEval::base(50.0);

    match announcement.pickup_date {
        Some(pickup) => {
            let hours = (pickup - now) as f64 / HOUR_MS as f64;
            if hours < 0.0 {
                eval.compatible = false;
                eval.risks.push("PICKUP_DATE_PAST");
            } else if hours <= criteria.time_flexibility_hours {
                eval.score += 20.0;
                eval.reasons.push("TIMING_FLEXIBLE");
            } else if hours <= criteria.time_flexibility_hours * 2.0 {
                eval.score += 10.0;
                eval.reasons.push("TIMING_ACCEPTABLE");
            } else {
                eval.score -= 10.0;
                eval.risks.push("PICKUP_DATE_FAR");
            }
        }
        None => {
            eval.score += 15.0;
            eval.reasons.push("FLEXIBLE_TIMING");
        }
    }

    match announcement.priority() {
        Priority::Urgent => {
            eval.score += 10.0;
            eval.reasons.push("URGENT_PRIORITY");
        }
        Priority::High => {
            eval.score += 5.0;
            eval.reasons.push("HIGH_PRIORITY");
        }
        Priority::Normal | Priority::Low => {}
    }

    eval.clamped()
}

/// Weight, volume and special handling against the deliverer's vehicle
pub fn capacity_score(announcement: &Announcement, vehicle: Option<&VehicleCapacity>) -> ComponentEval {
    let mut eval = ComponentEval::base(50.0);

    let max_weight = vehicle
        .and_then(|v| v.max_weight_kg)
        .filter(|max| *max > 0.0 && announcement.weight_kg > 0.0);
    if let Some(max_weight) = max_weight {
        if announcement.weight_kg > max_weight {
            eval.compatible = false;
            eval.score = 0.0;
            eval.risks.push("WEIGHT_EXCEEDED");
        } else {
            let ratio = announcement.weight_kg / max_weight;
            if ratio <= 0.5 {
                eval.score += 20.0;
                eval.reasons.push("WEIGHT_COMFORTABLE");
            } else if ratio <= 0.8 {
                eval.score += 10.0;
                eval.reasons.push("WEIGHT_ACCEPTABLE");
            } else {
                eval.reasons.push("WEIGHT_LIMIT_CLOSE");
            }
        }
    }

    if let (Some(volume), Some(v)) = (announcement.volume_m3(), vehicle) {
        if v.max_volume_m3.is_some_and(|max| volume > max) {
            eval.compatible = false;
            eval.score = 0.0;
            eval.risks.push("VOLUME_EXCEEDED");
        } else {
            eval.score += 15.0;
            eval.reasons.push("VOLUME_COMPATIBLE");
        }
    }

    if announcement.fragile {
        if vehicle.is_some_and(|v| v.careful_handling) {
            eval.score += 10.0;
            eval.reasons.push("FRAGILE_HANDLING_AVAILABLE");
        } else {
            eval.score -= 15.0;
            eval.risks.push("NO_FRAGILE_HANDLING");
        }
    }

    if announcement.requires_cooling {
        if vehicle.is_some_and(|v| v.refrigerated) {
            eval.score += 15.0;
            eval.reasons.push("REFRIGERATION_AVAILABLE");
        } else {
            eval.compatible = false;
            eval.score = 0.0;
            eval.risks.push("NO_REFRIGERATION");
        }
    }

    eval.clamped()
}

/// Price this deliverer would charge for the announcement
pub fn estimate_price(announcement: &Announcement, deliverer_rating: Option<f64>) -> f64 {
    let distance = haversine_km(announcement.pickup(), announcement.destination());
    estimate_delivery_price(distance, &announcement.package_traits(), deliverer_rating)
}

/// Estimated price against the client's budget
pub fn price_score(
    announcement: &Announcement,
    candidate: &DelivererCandidate,
    criteria: &MatchingCriteria,
    estimated_price: f64,
) -> ComponentEval {
    let mut eval = ComponentEval::base(50.0);
    let budget = announcement.suggested_price;

    if budget > 0.0 {
        let diff = (estimated_price - budget).abs();
        let flexibility = budget * criteria.price_flexibility_percent / 100.0;
        if diff <= flexibility {
            if estimated_price <= budget {
                eval.score += 25.0;
                eval.reasons.push("PRICE_UNDER_BUDGET");
            } else {
                eval.score += 15.0;
                eval.reasons.push("PRICE_WITHIN_FLEXIBILITY");
            }
        } else if estimated_price > budget {
            eval.score -= 20.0;
            eval.risks.push("PRICE_OVER_BUDGET");
        }
    }

    if announcement.negotiable || candidate.accepts_negotiation {
        eval.score += 10.0;
        eval.reasons.push("PRICE_NEGOTIABLE");
    }

    eval.clamped()
}

/// Rating, experience and recent reviews
pub fn reputation_score(candidate: &DelivererCandidate) -> ComponentEval {
    let mut eval = ComponentEval::base(0.0);

    if let Some(rating) = candidate.average_rating.filter(|r| *r > 0.0) {
        eval.score = rating / 5.0 * 40.0;
        if rating >= 4.5 {
            eval.reasons.push("EXCELLENT_RATING");
        } else if rating >= 4.0 {
            eval.reasons.push("GOOD_RATING");
        } else if rating >= 3.5 {
            eval.reasons.push("AVERAGE_RATING");
        } else {
            eval.risks.push("LOW_RATING");
        }
    }

    let (bonus, tag) = match candidate.completed_deliveries {
        100.. => (30.0, "VERY_EXPERIENCED"),
        50.. => (20.0, "EXPERIENCED"),
        20.. => (10.0, "MODERATE_EXPERIENCE"),
        5.. => (5.0, "SOME_EXPERIENCE"),
        _ => (0.0, "LIMITED_EXPERIENCE"),
    };
    eval.score += bonus;
    if bonus > 0.0 {
        eval.reasons.push(tag);
    } else {
        eval.risks.push(tag);
    }

    let recent: Vec<i32> = candidate
        .recent_ratings
        .iter()
        .take(RECENT_REVIEW_COUNT)
        .copied()
        .collect();
    if !recent.is_empty() {
        let avg = recent.iter().sum::<i32>() as f64 / recent.len() as f64;
        if avg >= 4.5 {
            eval.score += 15.0;
            eval.reasons.push("EXCELLENT_RECENT_REVIEWS");
        } else if avg >= 4.0 {
            eval.score += 10.0;
            eval.reasons.push("GOOD_RECENT_REVIEWS");
        }
    }

    eval.clamped()
}

pub fn preference_score(deliverer_id: i64, prefs: &ClientPreferences) -> ComponentEval {
    let mut eval = ComponentEval::base(50.0);
    if prefs.preferred_deliverers.contains(&deliverer_id) {
        eval.score += 20.0;
        eval.reasons.push("PREFERRED_DELIVERER");
    }
    if prefs.blacklisted_deliverers.contains(&deliverer_id) {
        eval.score = 0.0;
        eval.risks.push("BLACKLISTED_DELIVERER");
    }
    eval.clamped()
}

/// Weighted total, rounded to the nearest integer
pub fn total_score(
    geographic: f64,
    temporal: f64,
    capacity: f64,
    price: f64,
    reputation: f64,
    preference: f64,
) -> u32 {
    let total = geographic * 0.25
        + temporal * 0.20
        + capacity * 0.20
        + price * 0.15
        + reputation * 0.15
        + preference * 0.05;
    total.round().clamp(0.0, 100.0) as u32
}

/// Score one deliverer, `None` when they cannot take the parcel
pub fn evaluate_candidate(
    announcement: &Announcement,
    candidate: &DelivererCandidate,
    criteria: &MatchingCriteria,
    prefs: &ClientPreferences,
    now: i64,
) -> Option<DelivererMatch> {
    // Unrated deliverers are not penalised by the rating floor
    if candidate
        .average_rating
        .is_some_and(|r| r < criteria.min_deliverer_rating)
    {
        return None;
    }

    let geo = geographic_score(announcement, candidate, criteria);
    if !geo.eval.compatible {
        return None;
    }
    let temporal = temporal_score(announcement, criteria, now);
    if !temporal.compatible {
        return None;
    }
    let capacity = capacity_score(announcement, candidate.vehicle.as_ref());
    if !capacity.compatible {
        return None;
    }

    let estimated_price = estimate_price(announcement, candidate.average_rating);
    let price = price_score(announcement, candidate, criteria, estimated_price);
    let reputation = reputation_score(candidate);
    let preference = preference_score(candidate.deliverer_id, prefs);

    let total = total_score(
        geo.eval.score,
        temporal.score,
        capacity.score,
        price.score,
        reputation.score,
        preference.score,
    );

    let mut reasons = Vec::new();
    let mut risks = Vec::new();
    for part in [&geo.eval, &temporal, &capacity, &price, &reputation, &preference] {
        reasons.extend_from_slice(&part.reasons);
        risks.extend_from_slice(&part.risks);
    }

    Some(DelivererMatch {
        deliverer_id: candidate.deliverer_id,
        announcement_id: announcement.id,
        score: MatchingScore {
            total,
            geographic: geo.eval.score,
            temporal: temporal.score,
            capacity: capacity.score,
            price: price.score,
            reputation: reputation.score,
            preference: preference.score,
        },
        estimated_price,
        estimated_duration_minutes: geo.estimated_duration_minutes,
        distance_km: geo.distance_km,
        detour_percent: geo.detour_percent,
        reasons,
        risks,
        recommendation: RecommendationLevel::from_score(total),
    })
}

fn compare_matches(a: &DelivererMatch, b: &DelivererMatch, criteria: &MatchingCriteria) -> Ordering {
    if criteria.prioritize_experience && a.score.reputation != b.score.reputation {
        return b.score.reputation.total_cmp(&a.score.reputation);
    }
    if criteria.prioritize_speed && a.estimated_duration_minutes != b.estimated_duration_minutes {
        return a.estimated_duration_minutes.cmp(&b.estimated_duration_minutes);
    }
    if criteria.prioritize_price && a.estimated_price != b.estimated_price {
        return a.estimated_price.total_cmp(&b.estimated_price);
    }
    b.score.total.cmp(&a.score.total)
}

/// Rank candidates for an announcement, best first
pub fn find_matches(
    announcement: &Announcement,
    candidates: &[DelivererCandidate],
    criteria: &MatchingCriteria,
    prefs: &ClientPreferences,
    now: i64,
    max_results: usize,
) -> Vec<DelivererMatch> {
    let mut matches: Vec<DelivererMatch> = candidates
        .iter()
        .filter_map(|c| evaluate_candidate(announcement, c, criteria, prefs, now))
        .filter(|m| m.score.total >= MIN_TOTAL_SCORE)
        .collect();

    matches.sort_by(|a, b| compare_matches(a, b, criteria));
    matches.truncate(max_results);

    tracing::debug!(
        announcement_id = announcement.id,
        candidates = candidates.len(),
        matched = matches.len(),
        "Matching completed"
    );
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn announcement() -> Announcement {
        Announcement {
            id: 10,
            client_id: 1,
            title: "Books".into(),
            description: None,
            announcement_type: "PACKAGE".into(),
            status: "OPEN".into(),
            priority: "NORMAL".into(),
            pickup_address: "Paris 11e".into(),
            pickup_latitude: 48.8590,
            pickup_longitude: 2.3800,
            delivery_address: "Paris 15e".into(),
            delivery_latitude: 48.8420,
            delivery_longitude: 2.2990,
            pickup_date: None,
            delivery_date: None,
            weight_kg: 4.0,
            length_cm: None,
            width_cm: None,
            height_cm: None,
            fragile: false,
            requires_cooling: false,
            suggested_price: 8.0,
            final_price: None,
            negotiable: false,
            distance_km: 6.3,
            deliverer_id: None,
            created_at: NOW,
            updated_at: NOW,
        }
    }

    fn candidate(id: i64) -> DelivererCandidate {
        DelivererCandidate {
            deliverer_id: id,
            location: Some(GeoPoint::new(48.8600, 2.3810)),
            average_rating: Some(4.6),
            completed_deliveries: 60,
            recent_ratings: vec![5, 5, 4, 5, 5],
            vehicle: Some(VehicleCapacity {
                max_weight_kg: Some(10.0),
                max_volume_m3: Some(1.0),
                careful_handling: true,
                refrigerated: false,
            }),
            routes: Vec::new(),
            accepts_negotiation: false,
        }
    }

    #[test]
    fn test_recommendation_levels() {
        assert_eq!(RecommendationLevel::from_score(90), RecommendationLevel::Excellent);
        assert_eq!(RecommendationLevel::from_score(85), RecommendationLevel::Excellent);
        assert_eq!(RecommendationLevel::from_score(70), RecommendationLevel::Good);
        assert_eq!(RecommendationLevel::from_score(50), RecommendationLevel::Acceptable);
        assert_eq!(RecommendationLevel::from_score(49), RecommendationLevel::Poor);
    }

    #[test]
    fn test_temporal_score() {
        let criteria = MatchingCriteria::default();
        let mut a = announcement();
        assert_eq!(temporal_score(&a, &criteria, NOW).score, 65.0);

        a.priority = "URGENT".into();
        assert_eq!(temporal_score(&a, &criteria, NOW).score, 75.0);

        a.priority = "NORMAL".into();
        a.pickup_date = Some(NOW + 10 * HOUR_MS);
        assert_eq!(temporal_score(&a, &criteria, NOW).score, 70.0);
        a.pickup_date = Some(NOW + 30 * HOUR_MS);
        assert_eq!(temporal_score(&a, &criteria, NOW).score, 60.0);
        a.pickup_date = Some(NOW + 60 * HOUR_MS);
        assert_eq!(temporal_score(&a, &criteria, NOW).score, 40.0);

        a.pickup_date = Some(NOW - HOUR_MS);
        assert!(!temporal_score(&a, &criteria, NOW).compatible);
    }

    #[test]
    fn test_capacity_score() {
        let mut a = announcement();
        let vehicle = candidate(1).vehicle;
        // 4 kg of 10 kg
        assert_eq!(capacity_score(&a, vehicle.as_ref()).score, 70.0);

        a.length_cm = Some(50.0);
        a.width_cm = Some(40.0);
        a.height_cm = Some(30.0);
        a.fragile = true;
        assert_eq!(capacity_score(&a, vehicle.as_ref()).score, 95.0);

        a.weight_kg = 12.0;
        let eval = capacity_score(&a, vehicle.as_ref());
        assert!(!eval.compatible);
        assert!(eval.risks.contains(&"WEIGHT_EXCEEDED"));

        let mut cold = announcement();
        cold.requires_cooling = true;
        assert!(!capacity_score(&cold, vehicle.as_ref()).compatible);
        // no vehicle info: fragile parcels lose points but stay compatible
        let mut fragile = announcement();
        fragile.fragile = true;
        let eval = capacity_score(&fragile, None);
        assert!(eval.compatible);
        assert_eq!(eval.score, 35.0);
    }

    #[test]
    fn test_reputation_score() {
        let c = candidate(1);
        // 4.6/5*40 = 36.8, +20 experience, +15 recent
        let eval = reputation_score(&c);
        assert!((eval.score - 71.8).abs() < 1e-9);

        let rookie = DelivererCandidate {
            average_rating: None,
            completed_deliveries: 2,
            recent_ratings: Vec::new(),
            ..candidate(2)
        };
        let eval = reputation_score(&rookie);
        assert_eq!(eval.score, 0.0);
        assert!(eval.risks.contains(&"LIMITED_EXPERIENCE"));
    }

    #[test]
    fn test_price_score() {
        let criteria = MatchingCriteria::default();
        let mut a = announcement();
        let c = candidate(1);
        assert_eq!(price_score(&a, &c, &criteria, 7.5).score, 75.0);
        assert_eq!(price_score(&a, &c, &criteria, 9.0).score, 65.0);
        assert_eq!(price_score(&a, &c, &criteria, 12.0).score, 30.0);
        a.negotiable = true;
        assert_eq!(price_score(&a, &c, &criteria, 12.0).score, 40.0);
    }

    #[test]
    fn test_preference_score() {
        let prefs = ClientPreferences {
            preferred_deliverers: vec![1],
            blacklisted_deliverers: vec![2],
        };
        assert_eq!(preference_score(1, &prefs).score, 70.0);
        assert_eq!(preference_score(2, &prefs).score, 0.0);
        assert_eq!(preference_score(3, &prefs).score, 50.0);
    }

    #[test]
    fn test_geographic_route_and_proximity() {
        let criteria = MatchingCriteria::default();
        let a = announcement();

        let near = geographic_score(&a, &candidate(1), &criteria);
        assert!(near.eval.compatible);
        assert!(near.eval.score > 49.0);

        let far = DelivererCandidate {
            location: Some(GeoPoint::new(45.7640, 4.8357)),
            ..candidate(2)
        };
        assert!(!geographic_score(&a, &far, &criteria).eval.compatible);

        // A route running exactly pickup → destination has no detour
        let on_route = DelivererCandidate {
            location: None,
            routes: vec![PlannedTrip {
                departure: a.pickup(),
                arrival: a.destination(),
                departure_time: NOW,
                available_capacity: 1.0,
                max_capacity: 1.0,
            }],
            ..candidate(3)
        };
        let geo = geographic_score(&a, &on_route, &criteria);
        assert!(geo.eval.compatible);
        assert!((geo.eval.score - 50.0).abs() < 1e-6);
        assert!(geo.eval.reasons.contains(&"MINIMAL_DETOUR"));

        let no_location = DelivererCandidate {
            location: None,
            ..candidate(4)
        };
        assert!(!geographic_score(&a, &no_location, &criteria).eval.compatible);
    }

    #[test]
    fn test_total_score_weights() {
        assert_eq!(total_score(100.0, 100.0, 100.0, 100.0, 100.0, 100.0), 100);
        assert_eq!(total_score(50.0, 65.0, 70.0, 75.0, 71.8, 50.0), 64);
        assert_eq!(total_score(0.0, 0.0, 0.0, 0.0, 0.0, 0.0), 0);
    }

    #[test]
    fn test_find_matches_filters_and_sorts() {
        let criteria = MatchingCriteria::default();
        let a = announcement();
        let low_rated = DelivererCandidate {
            average_rating: Some(2.5),
            ..candidate(2)
        };
        let weaker = DelivererCandidate {
            completed_deliveries: 0,
            recent_ratings: Vec::new(),
            ..candidate(3)
        };
        let overloaded = DelivererCandidate {
            vehicle: Some(VehicleCapacity {
                max_weight_kg: Some(2.0),
                ..Default::default()
            }),
            ..candidate(4)
        };
        let matches = find_matches(
            &a,
            &[weaker, candidate(1), low_rated, overloaded],
            &criteria,
            &ClientPreferences::default(),
            NOW,
            10,
        );
        let ids: Vec<i64> = matches.iter().map(|m| m.deliverer_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(matches[0].score.total >= matches[1].score.total);
        assert!(matches.iter().all(|m| m.score.total >= MIN_TOTAL_SCORE));
    }

    #[test]
    fn test_prioritize_price() {
        let criteria = MatchingCriteria {
            prioritize_price: true,
            ..Default::default()
        };
        let a = announcement();
        let cheap = DelivererCandidate {
            average_rating: Some(3.2),
            ..candidate(5)
        };
        let matches = find_matches(
            &a,
            &[candidate(1), cheap],
            &criteria,
            &ClientPreferences::default(),
            NOW,
            10,
        );
        assert_eq!(matches.first().map(|m| m.deliverer_id), Some(5));
    }
}
