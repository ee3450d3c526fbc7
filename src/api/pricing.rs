//! Price quote API
//!
//! GET /api/pricing/quote?base_price=&currency=

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::extract::ApiQuery;
use crate::api::middleware::{ApiError, AppState};
use crate::services::PriceQuote;

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub base_price: f64,
    /// Defaults to the marketplace currency
    pub currency: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/pricing/quote", get(quote))
}

async fn quote(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<QuoteQuery>,
) -> Result<Json<PriceQuote>, ApiError> {
    let currency = query
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(&state.marketplace.default_currency);

    Ok(Json(state.pricing.quote(query.base_price, currency)?))
}
