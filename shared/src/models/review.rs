//! Client reviews of providers and deliverers

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};
use crate::pricing::to_f64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Review {
    pub id: i64,
    pub author_id: i64,
    /// Provider or deliverer being rated
    pub target_id: i64,
    pub booking_id: Option<i64>,
    pub delivery_id: Option<i64>,
    pub rating: i32,
    pub punctuality: Option<i32>,
    pub quality: Option<i32>,
    pub communication: Option<i32>,
    pub value_for_money: Option<i32>,
    pub comment: Option<String>,
    pub would_recommend: bool,
    pub created_at: i64,
}

/// What the review is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewSubject {
    Booking(i64),
    Delivery(i64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewCreate {
    pub subject: ReviewSubject,
    pub rating: i32,
    pub punctuality: Option<i32>,
    pub quality: Option<i32>,
    pub communication: Option<i32>,
    pub value_for_money: Option<i32>,
    pub comment: Option<String>,
    #[serde(default = "default_recommend")]
    pub would_recommend: bool,
}

fn default_recommend() -> bool {
    true
}

impl ReviewCreate {
    /// Every rating, main or detailed, must be within 1..=5
    pub fn validate(&self) -> Result<(), AppError> {
        let ratings = [
            ("rating", Some(self.rating)),
            ("punctuality", self.punctuality),
            ("quality", self.quality),
            ("communication", self.communication),
            ("value_for_money", self.value_for_money),
        ];
        for (field, value) in ratings {
            if value.is_some_and(|v| !(1..=5).contains(&v)) {
                return Err(AppError::new(ErrorCode::InvalidRating).with_detail("field", field));
            }
        }
        if self.comment.as_ref().is_some_and(|c| c.chars().count() > 2000) {
            return Err(AppError::validation("comment exceeds 2000 characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingBucket {
    pub rating: i32,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewBadge {
    TopRated,
    Reliable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewStats {
    pub target_id: i64,
    pub average_rating: f64,
    pub total_reviews: usize,
    /// From 5 stars down to 1
    pub distribution: Vec<RatingBucket>,
    pub recommendation_rate: f64,
    pub badges: Vec<ReviewBadge>,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let value = Decimal::from(part * 100) / Decimal::from(total);
    to_f64(value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

/// Aggregate the reviews of one provider or deliverer
pub fn review_stats(target_id: i64, reviews: &[Review]) -> ReviewStats {
    let total = reviews.len();
    let average_rating = if total == 0 {
        0.0
    } else {
        let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
        let avg = Decimal::from(sum) / Decimal::from(total);
        to_f64(avg.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
    };

    let distribution = (1..=5)
        .rev()
        .map(|rating| {
            let count = reviews.iter().filter(|r| r.rating == rating).count();
            RatingBucket {
                rating,
                count,
                percentage: percent(count, total),
            }
        })
        .collect();

    let recommended = reviews.iter().filter(|r| r.would_recommend).count();
    let recommendation_rate = percent(recommended, total);

    let mut badges = Vec::new();
    if average_rating >= 4.8 && total >= 10 {
        badges.push(ReviewBadge::TopRated);
    }
    if recommendation_rate >= 90.0 && total >= 5 {
        badges.push(ReviewBadge::Reliable);
    }

    ReviewStats {
        target_id,
        average_rating,
        total_reviews: total,
        distribution,
        recommendation_rate,
        badges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: i32, recommend: bool) -> Review {
        Review {
            id: 0,
            author_id: 1,
            target_id: 2,
            booking_id: Some(3),
            delivery_id: None,
            rating,
            punctuality: None,
            quality: None,
            communication: None,
            value_for_money: None,
            comment: None,
            would_recommend: recommend,
            created_at: 0,
        }
    }

    fn create(rating: i32) -> ReviewCreate {
        ReviewCreate {
            subject: ReviewSubject::Booking(1),
            rating,
            punctuality: None,
            quality: None,
            communication: None,
            value_for_money: None,
            comment: None,
            would_recommend: true,
        }
    }

    #[test]
    fn test_validate_ratings() {
        assert!(create(5).validate().is_ok());
        assert_eq!(create(0).validate().unwrap_err().code, ErrorCode::InvalidRating);
        let mut c = create(4);
        c.quality = Some(6);
        assert_eq!(c.validate().unwrap_err().code, ErrorCode::InvalidRating);
    }

    #[test]
    fn test_subject_deserialize() {
        let s: ReviewSubject = serde_json::from_str(r#"{"kind":"DELIVERY","id":9}"#).unwrap();
        assert_eq!(s, ReviewSubject::Delivery(9));
    }

    #[test]
    fn test_stats_empty() {
        let stats = review_stats(2, &[]);
        assert_eq!(stats.average_rating, 0.0);
        assert_eq!(stats.recommendation_rate, 0.0);
        assert!(stats.badges.is_empty());
        assert_eq!(stats.distribution.len(), 5);
    }

    #[test]
    fn test_stats_distribution() {
        let reviews = vec![review(5, true), review(4, true), review(4, false)];
        let stats = review_stats(2, &reviews);
        assert_eq!(stats.average_rating, 4.3);
        assert_eq!(stats.distribution[0].count, 1);
        assert_eq!(stats.distribution[1].count, 2);
        assert_eq!(stats.distribution[1].percentage, 66.7);
        assert_eq!(stats.recommendation_rate, 66.7);
    }

    #[test]
    fn test_badges() {
        let top: Vec<Review> = (0..10).map(|_| review(5, true)).collect();
        let stats = review_stats(2, &top);
        assert_eq!(stats.badges, vec![ReviewBadge::TopRated, ReviewBadge::Reliable]);

        let few: Vec<Review> = (0..5).map(|_| review(4, true)).collect();
        assert_eq!(review_stats(2, &few).badges, vec![ReviewBadge::Reliable]);
    }
}
