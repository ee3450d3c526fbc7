//! Review API endpoints
//!
//! - GET /api/therapies/{id}/reviews - public
//! - POST /api/therapies/{id}/reviews - authenticated
//! - DELETE /api/admin/reviews/{id} - admin

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::extract::{ApiJson, ApiPath};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateReviewInput, Review, ReviewSummary};
use crate::services::TherapyReviews;

pub fn public_router() -> Router<AppState> {
    Router::new().route("/therapies/{id}/reviews", get(list_reviews))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/therapies/{id}/reviews", post(create_review))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/admin/reviews/{id}", delete(delete_review))
}

/// GET /api/therapies/{id}/reviews
///
/// Without a database there are no reviews to show.
async fn list_reviews(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<TherapyReviews>, ApiError> {
    match &state.store {
        Some(store) => Ok(Json(store.review_service.list_for_therapy(id).await?)),
        None => Ok(Json(TherapyReviews {
            reviews: Vec::new(),
            summary: ReviewSummary::new(0, None),
        })),
    }
}

/// POST /api/therapies/{id}/reviews
async fn create_review(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<CreateReviewInput>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let review = state
        .store()?
        .review_service
        .create(&user, id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// DELETE /api/admin/reviews/{id}
async fn delete_review(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.store()?.review_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
