//! Public catalog API
//!
//! - GET /api/therapies/published?country=&type=&search=
//! - GET /api/therapies/{id_or_slug}
//!
//! Responses carry the fee-inclusive price and the data `source`
//! (`database` or `demo`).

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::extract::{ApiPath, ApiQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::models::TherapyListing;
use crate::services::{CatalogSource, PriceCalculator, PriceQuote, TherapyFilter};

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub country: Option<String>,
    #[serde(rename = "type")]
    pub therapy_type: Option<String>,
    pub search: Option<String>,
}

/// A listing with its displayed price
#[derive(Debug, Serialize)]
pub struct PricedListing {
    #[serde(flatten)]
    pub listing: TherapyListing,
    pub price: Option<PriceQuote>,
}

impl PricedListing {
    pub fn new(listing: TherapyListing, pricing: &PriceCalculator) -> Self {
        let price = pricing
            .quote(listing.therapy.base_price, &listing.therapy.currency)
            .ok();
        Self { listing, price }
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub therapies: Vec<PricedListing>,
    pub count: usize,
    pub source: CatalogSource,
}

#[derive(Debug, Serialize)]
pub struct TherapyResponse {
    pub therapy: PricedListing,
    pub source: CatalogSource,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/therapies/published", get(list_published))
        .route("/therapies/{id}", get(get_therapy))
}

/// GET /api/therapies/published
async fn list_published(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> Result<Json<CatalogResponse>, ApiError> {
    let filter = TherapyFilter::from_query(
        query.country.as_deref(),
        query.therapy_type.as_deref(),
        query.search.as_deref(),
    )
    .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let result = state.therapy_service.list_published(&filter).await;
    let therapies: Vec<PricedListing> = result
        .data
        .into_iter()
        .map(|l| PricedListing::new(l, &state.pricing))
        .collect();

    Ok(Json(CatalogResponse {
        count: therapies.len(),
        therapies,
        source: result.source,
    }))
}

/// GET /api/therapies/{id_or_slug}
async fn get_therapy(
    State(state): State<AppState>,
    ApiPath(id_or_slug): ApiPath<String>,
) -> Result<Json<TherapyResponse>, ApiError> {
    let result = state.therapy_service.get_published(&id_or_slug).await?;
    Ok(Json(TherapyResponse {
        therapy: PricedListing::new(result.data, &state.pricing),
        source: result.source,
    }))
}
