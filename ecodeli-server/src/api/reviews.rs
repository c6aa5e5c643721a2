//! Reviews of completed bookings and deliveries

use axum::Json;
use axum::extract::{Path, State};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    BookingStatus, DeliveryStatus, Review, ReviewCreate, ReviewStats, ReviewSubject, review_stats,
};
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::db;
use crate::error::internal;
use crate::state::AppState;

use super::ApiResult;

/// The reviewed user when `author_id` may review the subject
async fn review_target(state: &AppState, subject: ReviewSubject, author_id: i64) -> Result<i64, AppError> {
    match subject {
        ReviewSubject::Booking(id) => {
            let booking = db::services::find_booking(&state.pool, id)
                .await
                .map_err(internal)?
                .ok_or_else(|| AppError::new(ErrorCode::BookingNotFound))?;
            if booking.client_id != author_id || booking.status() != Some(BookingStatus::Completed) {
                return Err(AppError::new(ErrorCode::ReviewNotAllowed));
            }
            Ok(booking.provider_id)
        }
        ReviewSubject::Delivery(id) => {
            let delivery = db::deliveries::find(&state.pool, id)
                .await
                .map_err(internal)?
                .ok_or_else(|| AppError::new(ErrorCode::DeliveryNotFound))?;
            if delivery.client_id != author_id || delivery.status() != Some(DeliveryStatus::Delivered) {
                return Err(AppError::new(ErrorCode::ReviewNotAllowed));
            }
            Ok(delivery.deliverer_id)
        }
    }
}

/// POST /api/reviews
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ReviewCreate>,
) -> ApiResult<Review> {
    req.validate()?;
    let target_id = review_target(&state, req.subject, user.id).await?;

    let (booking_id, delivery_id) = match req.subject {
        ReviewSubject::Booking(id) => (Some(id), None),
        ReviewSubject::Delivery(id) => (None, Some(id)),
    };
    let review = Review {
        id: snowflake_id(),
        author_id: user.id,
        target_id,
        booking_id,
        delivery_id,
        rating: req.rating,
        punctuality: req.punctuality,
        quality: req.quality,
        communication: req.communication,
        value_for_money: req.value_for_money,
        comment: req.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        would_recommend: req.would_recommend,
        created_at: now_millis(),
    };
    match db::reviews::insert(&state.pool, &review).await {
        Ok(()) => {
            tracing::info!(review_id = review.id, target_id, rating = review.rating, "Review created");
            Ok(Json(review))
        }
        Err(e) if db::is_unique_violation(&e) => Err(AppError::new(ErrorCode::ReviewAlreadyExists)),
        Err(e) => Err(internal(e)),
    }
}

/// GET /api/users/{id}/reviews
pub async fn list_for_user(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Vec<Review>> {
    let rows = db::reviews::list_for_target(&state.pool, id)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

/// GET /api/users/{id}/reviews/stats
pub async fn stats(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<ReviewStats> {
    let rows = db::reviews::list_for_target(&state.pool, id)
        .await
        .map_err(internal)?;
    Ok(Json(review_stats(id, &rows)))
}
