//! Money calculations
//!
//! All calculations are done using `Decimal` internally, then converted to
//! `f64` for storage/serialization (2 decimal places, half away from zero).

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};
use crate::models::Priority;
use crate::util::DAY_MS;

const DECIMAL_PLACES: u32 = 2;

/// French standard VAT rate (20 %)
pub const VAT_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

/// Convert f64 to Decimal, non-finite values become zero
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_else(|| {
        tracing::error!(value = ?value, "Non-finite f64 in monetary calculation, defaulting to zero");
        Decimal::ZERO
    })
}

/// Round to cents
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places
pub fn to_f64(value: Decimal) -> f64 {
    round_money(value).to_f64().unwrap_or_default()
}

fn percent(value: f64) -> Decimal {
    to_decimal(value) / Decimal::ONE_HUNDRED
}

/// Amount in minor units (cents) for the payment provider
pub fn to_minor_units(amount: f64) -> i64 {
    (round_money(to_decimal(amount)) * Decimal::ONE_HUNDRED)
        .to_i64()
        .unwrap_or_default()
}

pub fn from_minor_units(cents: i64) -> f64 {
    to_f64(Decimal::new(cents, 2))
}

// ==================== Delivery ====================

/// Package attributes that influence price
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PackageTraits {
    pub weight_kg: f64,
    pub fragile: bool,
    pub requires_cooling: bool,
    pub priority: Priority,
}

const PRICE_PER_KM: Decimal = Decimal::from_parts(120, 0, 0, false, 2);
const MIN_DELIVERY_PRICE: Decimal = Decimal::from_parts(500, 0, 0, false, 2);
const NEUTRAL_RATING: f64 = 3.0;

/// Price a deliverer would charge for a distance.
///
/// 1.20 €/km, then weight (> 10 kg ×1.2), fragile ×1.15, cooling ×1.25,
/// URGENT ×1.5, HIGH ×1.2, then ×(0.8 + 0.4 × rating / 5).
pub fn estimate_delivery_price(
    distance_km: f64,
    package: &PackageTraits,
    deliverer_rating: Option<f64>,
) -> f64 {
    let mut price = to_decimal(distance_km.max(0.0)) * PRICE_PER_KM;

    if package.weight_kg > 10.0 {
        price *= Decimal::new(12, 1);
    }
    if package.fragile {
        price *= Decimal::new(115, 2);
    }
    if package.requires_cooling {
        price *= Decimal::new(125, 2);
    }
    match package.priority {
        Priority::Urgent => price *= Decimal::new(15, 1),
        Priority::High => price *= Decimal::new(12, 1),
        Priority::Normal | Priority::Low => {}
    }

    let rating = to_decimal(deliverer_rating.unwrap_or(NEUTRAL_RATING).clamp(0.0, 5.0));
    let rating_factor = Decimal::new(8, 1) + Decimal::new(4, 1) * rating / Decimal::from(5);
    to_f64(price * rating_factor)
}

/// Price suggested to a client publishing an announcement
pub fn suggest_delivery_price(distance_km: f64, package: &PackageTraits) -> f64 {
    let estimate = to_decimal(estimate_delivery_price(distance_km, package, None));
    to_f64(estimate.max(MIN_DELIVERY_PRICE))
}

// ==================== Storage ====================

/// Whole rental days, any started day counts
pub fn rental_days(start: i64, end: i64) -> i64 {
    if end <= start {
        return 0;
    }
    (end - start + DAY_MS - 1) / DAY_MS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    Loyalty,
    LongTerm,
    MediumTerm,
    EarlyBird,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub kind: DiscountKind,
    pub percent: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageQuote {
    pub days: i64,
    pub price_per_day: f64,
    pub base_price: f64,
    pub discounts: Vec<Discount>,
    pub discounted_price: f64,
    pub vat: f64,
    pub total: f64,
}

/// Quote a box rental.
///
/// Discounts are computed on the base price and stacked: loyalty
/// (2 % per completed rental from 5 rentals, capped at 15 %), long term
/// (10 % from 30 days) or medium term (5 % from 14 days), early bird (5 %
/// when booked 14 days ahead). VAT applies to the discounted price.
pub fn storage_quote(
    price_per_day: f64,
    start: i64,
    end: i64,
    now: i64,
    completed_reservations: i64,
) -> Result<StorageQuote, AppError> {
    if end <= start {
        return Err(AppError::new(ErrorCode::InvalidDateRange));
    }
    if !price_per_day.is_finite() || price_per_day < 0.0 {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            "price per day must be a non-negative number",
        ));
    }

    let days = rental_days(start, end);
    let base = to_decimal(price_per_day) * Decimal::from(days);

    let mut rates: Vec<(DiscountKind, f64)> = Vec::new();
    if completed_reservations >= 5 {
        rates.push((
            DiscountKind::Loyalty,
            (completed_reservations as f64 * 2.0).min(15.0),
        ));
    }
    if days >= 30 {
        rates.push((DiscountKind::LongTerm, 10.0));
    } else if days >= 14 {
        rates.push((DiscountKind::MediumTerm, 5.0));
    }
    if start - now >= 14 * DAY_MS {
        rates.push((DiscountKind::EarlyBird, 5.0));
    }

    let mut discounts = Vec::with_capacity(rates.len());
    let mut discounted = base;
    for (kind, rate) in rates {
        let amount = round_money(base * percent(rate));
        discounted -= amount;
        discounts.push(Discount {
            kind,
            percent: rate,
            amount: to_f64(amount),
        });
    }
    let discounted = round_money(discounted.max(Decimal::ZERO));
    let vat = round_money(discounted * VAT_RATE);

    Ok(StorageQuote {
        days,
        price_per_day: to_f64(to_decimal(price_per_day)),
        base_price: to_f64(base),
        discounts,
        discounted_price: to_f64(discounted),
        vat: to_f64(vat),
        total: to_f64(discounted + vat),
    })
}

/// Additional days and price when moving a reservation end date
pub fn extension_price(price_per_day: f64, current_end: i64, new_end: i64) -> (i64, f64) {
    let days = rental_days(current_end, new_end);
    (
        days,
        to_f64(to_decimal(price_per_day) * Decimal::from(days)),
    )
}

// ==================== Escrow ====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscrowBreakdown {
    pub total_amount: f64,
    pub platform_fee: f64,
    pub vat: f64,
    pub service_amount: f64,
    pub delivery_fee: f64,
    pub insurance_fee: f64,
}

/// Split a captured amount between platform, tax and the deliverer.
pub fn escrow_breakdown(amount: f64, platform_fee_percent: f64) -> EscrowBreakdown {
    let total = to_decimal(amount);
    let fee = round_money(total * percent(platform_fee_percent));
    let vat = round_money(total * VAT_RATE);
    let service = total - fee - vat;
    let delivery_fee = round_money(service * Decimal::new(8, 1));
    let insurance = if total > Decimal::ONE_HUNDRED {
        Decimal::new(250, 2)
    } else {
        Decimal::ZERO
    };

    EscrowBreakdown {
        total_amount: to_f64(total),
        platform_fee: to_f64(fee),
        vat: to_f64(vat),
        service_amount: to_f64(service),
        delivery_fee: to_f64(delivery_fee),
        insurance_fee: to_f64(insurance),
    }
}

/// Reward or penalize the delivery fee according to the client's rating
pub fn adjust_for_client_rating(breakdown: EscrowBreakdown, rating: Option<f64>) -> EscrowBreakdown {
    let factor = match rating {
        Some(r) if r >= 4.5 => Decimal::new(105, 2),
        Some(r) if r < 3.0 => Decimal::new(95, 2),
        _ => return breakdown,
    };
    EscrowBreakdown {
        delivery_fee: to_f64(to_decimal(breakdown.delivery_fee) * factor),
        ..breakdown
    }
}

/// Split a payout into (payee earnings, platform commission)
pub fn commission_split(amount: f64, rate_percent: f64) -> (f64, f64) {
    let total = to_decimal(amount);
    let commission = round_money(total * percent(rate_percent));
    (to_f64(total - commission), to_f64(commission))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(weight_kg: f64, priority: Priority) -> PackageTraits {
        PackageTraits {
            weight_kg,
            fragile: false,
            requires_cooling: false,
            priority,
        }
    }

    #[test]
    fn test_to_f64_rounds_half_away_from_zero() {
        assert_eq!(to_f64(Decimal::new(12345, 3)), 12.35);
        assert_eq!(to_f64(Decimal::new(12344, 3)), 12.34);
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(12.34), 1234);
        assert_eq!(to_minor_units(0.1 + 0.2), 30);
        assert_eq!(from_minor_units(1999), 19.99);
    }

    #[test]
    fn test_estimate_delivery_price_neutral() {
        // 10 km * 1.2 = 12, rating 3 -> factor 1.04
        let price = estimate_delivery_price(10.0, &package(2.0, Priority::Normal), None);
        assert_eq!(price, 12.48);
    }

    #[test]
    fn test_estimate_delivery_price_multipliers() {
        let traits = PackageTraits {
            weight_kg: 15.0,
            fragile: true,
            requires_cooling: true,
            priority: Priority::Urgent,
        };
        // 10 * 1.2 * 1.2 * 1.15 * 1.25 * 1.5 = 31.05, rating 5 -> x1.2 = 37.26
        assert_eq!(estimate_delivery_price(10.0, &traits, Some(5.0)), 37.26);

        let high = estimate_delivery_price(10.0, &package(1.0, Priority::High), Some(0.0));
        // 12 * 1.2 * 0.8
        assert_eq!(high, 11.52);
    }

    #[test]
    fn test_suggest_delivery_price_minimum() {
        assert_eq!(
            suggest_delivery_price(1.0, &package(1.0, Priority::Normal)),
            5.0
        );
        assert_eq!(
            suggest_delivery_price(10.0, &package(1.0, Priority::Normal)),
            12.48
        );
    }

    #[test]
    fn test_rental_days() {
        assert_eq!(rental_days(0, DAY_MS), 1);
        assert_eq!(rental_days(0, DAY_MS + 1), 2);
        assert_eq!(rental_days(0, 1), 1);
        assert_eq!(rental_days(5, 5), 0);
    }

    #[test]
    fn test_storage_quote_without_discounts() {
        let quote = storage_quote(10.0, DAY_MS, 4 * DAY_MS, DAY_MS, 0).unwrap();
        assert_eq!(quote.days, 3);
        assert_eq!(quote.base_price, 30.0);
        assert!(quote.discounts.is_empty());
        assert_eq!(quote.vat, 6.0);
        assert_eq!(quote.total, 36.0);
    }

    #[test]
    fn test_storage_quote_stacks_discounts() {
        let now = 0;
        let start = 20 * DAY_MS;
        let end = start + 30 * DAY_MS;
        let quote = storage_quote(2.0, start, end, now, 10).unwrap();
        // base 60, loyalty 15 % = 9, long term 10 % = 6, early bird 5 % = 3
        assert_eq!(quote.base_price, 60.0);
        let kinds: Vec<DiscountKind> = quote.discounts.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiscountKind::Loyalty,
                DiscountKind::LongTerm,
                DiscountKind::EarlyBird
            ]
        );
        assert_eq!(quote.discounts[0].percent, 15.0);
        assert_eq!(quote.discounted_price, 42.0);
        assert_eq!(quote.vat, 8.4);
        assert_eq!(quote.total, 50.4);
    }

    #[test]
    fn test_storage_quote_medium_term_and_small_loyalty() {
        let quote = storage_quote(1.0, 0, 14 * DAY_MS, 0, 5).unwrap();
        // loyalty 10 %, medium term 5 %
        assert_eq!(quote.discounts.len(), 2);
        assert_eq!(quote.discounts[0].percent, 10.0);
        assert_eq!(quote.discounts[1].kind, DiscountKind::MediumTerm);
        assert_eq!(quote.discounted_price, 11.9);
    }

    #[test]
    fn test_storage_quote_rejects_bad_range() {
        let err = storage_quote(5.0, 10, 10, 0, 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDateRange);
    }

    #[test]
    fn test_extension_price() {
        assert_eq!(extension_price(4.5, DAY_MS, 3 * DAY_MS), (2, 9.0));
        assert_eq!(extension_price(4.5, DAY_MS, DAY_MS), (0, 0.0));
    }

    #[test]
    fn test_escrow_breakdown() {
        let b = escrow_breakdown(50.0, 15.0);
        assert_eq!(b.platform_fee, 7.5);
        assert_eq!(b.vat, 10.0);
        assert_eq!(b.service_amount, 32.5);
        assert_eq!(b.delivery_fee, 26.0);
        assert_eq!(b.insurance_fee, 0.0);

        let big = escrow_breakdown(200.0, 15.0);
        assert_eq!(big.insurance_fee, 2.5);
    }

    #[test]
    fn test_adjust_for_client_rating() {
        let b = escrow_breakdown(50.0, 15.0);
        assert_eq!(adjust_for_client_rating(b, Some(4.8)).delivery_fee, 27.3);
        assert_eq!(adjust_for_client_rating(b, Some(2.0)).delivery_fee, 24.7);
        assert_eq!(adjust_for_client_rating(b, Some(4.0)).delivery_fee, 26.0);
        assert_eq!(adjust_for_client_rating(b, None), b);
    }

    #[test]
    fn test_commission_split() {
        assert_eq!(commission_split(100.0, 15.0), (85.0, 15.0));
        assert_eq!(commission_split(33.33, 20.0), (26.66, 6.67));
    }
}
