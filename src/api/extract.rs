//! Request extractors that reject with the `ApiError` envelope
//!
//! Drop-in replacements for `Json`, `Query` and `Path`. A malformed body,
//! query string or path segment answers `400 VALIDATION_ERROR` in the same
//! JSON shape as every other API error.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;

use crate::api::middleware::ApiError;

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Client mistakes become validation errors; anything axum reports as a
/// server error stays a 500.
fn rejection_error(status: StatusCode, message: String) -> ApiError {
    if status.is_server_error() {
        tracing::error!("Extractor failed: {}", message);
        ApiError::internal_error("Internal server error")
    } else {
        ApiError::validation_error(message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::Request,
        routing::{get, post},
        Router,
    };
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize)]
    struct Amount {
        #[allow(dead_code)]
        value: f64,
    }

    async fn by_query(ApiQuery(_): ApiQuery<Amount>) -> &'static str {
        "ok"
    }

    async fn by_path(ApiPath(_): ApiPath<i64>) -> &'static str {
        "ok"
    }

    async fn by_body(ApiJson(_): ApiJson<Amount>) -> &'static str {
        "ok"
    }

    fn app() -> Router {
        Router::new()
            .route("/q", get(by_query))
            .route("/p/{id}", get(by_path))
            .route("/b", post(by_body))
    }

    async fn error_of(request: Request<Body>) -> (StatusCode, ApiError) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_bad_query_is_validation_error() {
        let (status, err) = error_of(Request::get("/q?value=abc").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_bad_path_is_validation_error() {
        let (status, err) = error_of(Request::get("/p/abc").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_bad_body_is_validation_error() {
        let request = Request::post("/b")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"value":"lots"}"#))
            .unwrap();
        let (status, err) = error_of(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error.code, "VALIDATION_ERROR");

        let no_content_type = Request::post("/b").body(Body::from("{}")).unwrap();
        let (status, _) = error_of(no_content_type).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_server_side_rejection_stays_internal() {
        let err = rejection_error(StatusCode::INTERNAL_SERVER_ERROR, "missing params".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
