//! Guide directory API
//!
//! - GET /api/guides?country= - public
//! - GET /api/guides/{id_or_slug} - public
//! - POST /api/admin/guides/{id}/verify - admin

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::CountryQuery;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::models::Guide;
use crate::services::CatalogSource;

#[derive(Debug, Serialize)]
pub struct GuideListResponse {
    pub guides: Vec<Guide>,
    pub count: usize,
    pub source: CatalogSource,
}

#[derive(Debug, Serialize)]
pub struct GuideResponse {
    pub guide: Guide,
    pub source: CatalogSource,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default = "default_verified")]
    pub verified: bool,
}

fn default_verified() -> bool {
    true
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/guides", get(list_guides))
        .route("/guides/{id}", get(get_guide))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/admin/guides/{id}/verify", post(verify_guide))
}

/// GET /api/guides
async fn list_guides(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CountryQuery>,
) -> Json<GuideListResponse> {
    let result = state.guide_service.list(query.country.as_deref()).await;
    Json(GuideListResponse {
        count: result.data.len(),
        guides: result.data,
        source: result.source,
    })
}

/// GET /api/guides/{id_or_slug}
async fn get_guide(
    State(state): State<AppState>,
    ApiPath(id_or_slug): ApiPath<String>,
) -> Result<Json<GuideResponse>, ApiError> {
    let result = state.guide_service.get(&id_or_slug).await?;
    Ok(Json(GuideResponse {
        guide: result.data,
        source: result.source,
    }))
}

/// POST /api/admin/guides/{id}/verify
///
/// Body `{"verified": false}` removes the badge; an empty object sets it.
async fn verify_guide(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<VerifyRequest>,
) -> Result<Json<Guide>, ApiError> {
    let guide = state.guide_service.set_verified(id, body.verified).await?;
    Ok(Json(guide))
}
