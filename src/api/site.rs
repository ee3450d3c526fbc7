//! Public site information API
//!
//! GET /api/site - site name and contacts, supported countries, the
//! marketplace fee and the featured listings. No authentication required.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::AppState;
use crate::api::therapies::PricedListing;
use crate::services::{AdminSettings, CatalogSource};

#[derive(Debug, Serialize)]
pub struct SiteInfoResponse {
    pub version: String,
    pub site_name: String,
    pub contact_email: String,
    pub contact_whatsapp: String,
    pub countries: Vec<String>,
    pub fee_percent: f64,
    pub default_currency: String,
    pub featured: Vec<PricedListing>,
    pub source: CatalogSource,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/site", get(get_site_info))
}

/// GET /api/site
///
/// Falls back to default settings when they cannot be read.
async fn get_site_info(State(state): State<AppState>) -> Json<SiteInfoResponse> {
    let settings = match &state.store {
        Some(store) => store
            .settings_service
            .get_admin_settings()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load site settings, using defaults: {}", e);
                AdminSettings::default()
            }),
        None => AdminSettings::default(),
    };

    let featured = state
        .therapy_service
        .featured(&settings.featured_therapy_ids)
        .await;

    Json(SiteInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        site_name: settings.site_name,
        contact_email: settings.contact_email,
        contact_whatsapp: settings.contact_whatsapp,
        countries: state.marketplace.countries.clone(),
        fee_percent: state.pricing.fee_percent(),
        default_currency: state.marketplace.default_currency.clone(),
        featured: featured
            .data
            .into_iter()
            .map(|l| PricedListing::new(l, &state.pricing))
            .collect(),
        source: featured.source,
    })
}
