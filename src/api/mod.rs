//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api`:
//! - public catalog, guide directory, reviews, pricing and site info
//! - authentication
//! - guide self-service (`/api/guide/...`)
//! - moderation console (`/api/admin/...`)

pub mod admin;
pub mod auth;
pub mod common;
pub mod extract;
pub mod guide_portal;
pub mod guides;
pub mod middleware;
pub mod pricing;
pub mod reviews;
pub mod site;
pub mod therapies;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, ClientIp, RequestStats};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// `false` when running on demo data
    pub database: bool,
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database: state.store.is_some(),
    })
}

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Master only
    let master_routes = Router::new()
        .merge(admin::master_router())
        .route_layer(axum_middleware::from_fn(middleware::require_master))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Admin or master
    let admin_routes = Router::new()
        .merge(admin::router())
        .merge(guides::admin_router())
        .merge(reviews::admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Guide, admin or master
    let guide_routes = Router::new()
        .merge(guide_portal::router())
        .route_layer(axum_middleware::from_fn(middleware::require_guide))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Any signed-in account
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .merge(reviews::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::public_router())
        .merge(therapies::router())
        .merge(reviews::public_router())
        .merge(guides::public_router())
        .merge(pricing::router())
        .merge(site::router())
        .merge(master_routes)
        .merge(admin_routes)
        .merge(guide_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => tracing::warn!("Ignoring invalid CORS origin '{}'", cors_origin),
    }

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // Outermost, so every request is counted
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_without_database() {
        let app = build_router(AppState::build(&Config::default(), None), "http://localhost:5173");

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_cors_origin_does_not_panic() {
        let app = build_router(AppState::build(&Config::default(), None), "bad\norigin");

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
