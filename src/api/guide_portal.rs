//! Guide self-service API (guide, admin or master)
//!
//! - GET/POST/PUT /api/guide/profile
//! - GET/POST /api/guide/therapies
//! - PUT/DELETE /api/guide/therapies/{id}
//! - POST /api/guide/therapies/{id}/publish

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::extract::{ApiJson, ApiPath};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Guide, GuideInput, Therapy, TherapyInput};

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}

#[derive(Debug, Serialize)]
pub struct OwnTherapiesResponse {
    pub therapies: Vec<Therapy>,
    pub count: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/guide/profile",
            get(get_profile).post(create_profile).put(update_profile),
        )
        .route("/guide/therapies", get(list_own).post(create_therapy))
        .route(
            "/guide/therapies/{id}",
            put(update_therapy).delete(delete_therapy),
        )
        .route("/guide/therapies/{id}/publish", post(set_published))
}

/// GET /api/guide/profile
async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Guide>, ApiError> {
    Ok(Json(state.guide_service.profile(&user).await?))
}

/// POST /api/guide/profile
async fn create_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<GuideInput>,
) -> Result<(StatusCode, Json<Guide>), ApiError> {
    let guide = state.guide_service.create_profile(&user, body).await?;
    Ok((StatusCode::CREATED, Json(guide)))
}

/// PUT /api/guide/profile
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<GuideInput>,
) -> Result<Json<Guide>, ApiError> {
    Ok(Json(state.guide_service.update_profile(&user, body).await?))
}

/// GET /api/guide/therapies
///
/// Every state, including pending and rejected listings.
async fn list_own(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<OwnTherapiesResponse>, ApiError> {
    let therapies = state.therapy_service.list_own(&user).await?;
    Ok(Json(OwnTherapiesResponse {
        count: therapies.len(),
        therapies,
    }))
}

/// POST /api/guide/therapies
async fn create_therapy(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<TherapyInput>,
) -> Result<(StatusCode, Json<Therapy>), ApiError> {
    let auto_approve = state
        .store()?
        .settings_service
        .auto_approve_listings()
        .await?;
    let therapy = state
        .therapy_service
        .create(&user, body, auto_approve)
        .await?;
    Ok((StatusCode::CREATED, Json(therapy)))
}

/// PUT /api/guide/therapies/{id}
async fn update_therapy(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<TherapyInput>,
) -> Result<Json<Therapy>, ApiError> {
    Ok(Json(state.therapy_service.update(&user, id, body).await?))
}

/// DELETE /api/guide/therapies/{id}
async fn delete_therapy(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.therapy_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/guide/therapies/{id}/publish
async fn set_published(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<PublishRequest>,
) -> Result<Json<Therapy>, ApiError> {
    let therapy = state
        .therapy_service
        .set_published(&user, id, body.published)
        .await?;
    Ok(Json(therapy))
}
