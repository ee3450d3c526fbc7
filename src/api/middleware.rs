//! API middleware and shared HTTP types
//!
//! Contains:
//! - `AppState`, the shared handler state
//! - `ApiError`, the JSON error envelope, and conversions from service errors
//! - authentication (session token) and role guards
//! - client IP resolution
//! - request statistics

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::create_cache;
use crate::config::{Config, MarketplaceConfig};
use crate::db::repositories::{
    LoginLogRepository, SqlxGuideRepository, SqlxLoginLogRepository, SqlxReviewRepository,
    SqlxSessionRepository, SqlxSettingsRepository, SqlxTherapyRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    GuideService, GuideServiceError, LoginRateLimiter, PriceCalculator, PricingError,
    ReviewService, ReviewServiceError, SettingsService, SettingsServiceError, TherapyService,
    TherapyServiceError, UserService, UserServiceError,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lock-free request counters
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Sum of response times in microseconds
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.total_response_time_us.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Services that need a database
#[derive(Clone)]
pub struct StoreServices {
    pub user_service: Arc<UserService>,
    pub review_service: Arc<ReviewService>,
    pub settings_service: Arc<SettingsService>,
    pub login_logs: Arc<dyn LoginLogRepository>,
}

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// `None` when running without a database (demo catalog only)
    pub store: Option<StoreServices>,
    pub therapy_service: Arc<TherapyService>,
    pub guide_service: Arc<GuideService>,
    pub pricing: PriceCalculator,
    pub marketplace: Arc<MarketplaceConfig>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub request_stats: Arc<RequestStats>,
    /// Read the client IP from forwarding headers
    pub trust_proxy: bool,
}

impl AppState {
    /// Wire repositories and services. Without a pool the catalog serves
    /// demo data and every write answers `SERVICE_UNAVAILABLE`.
    pub fn build(config: &Config, pool: Option<DynDatabasePool>) -> Self {
        let cache = create_cache(&config.cache);
        let marketplace = config.marketplace.clone();

        let (store, therapy_service, guide_service) = match pool {
            Some(pool) => {
                let therapy_repo = SqlxTherapyRepository::boxed(pool.clone());
                let guide_repo = SqlxGuideRepository::boxed(pool.clone());

                let store = StoreServices {
                    user_service: Arc::new(UserService::with_session_days(
                        SqlxUserRepository::boxed(pool.clone()),
                        SqlxSessionRepository::boxed(pool.clone()),
                        config.auth.session_days,
                    )),
                    review_service: Arc::new(ReviewService::new(
                        SqlxReviewRepository::boxed(pool.clone()),
                        therapy_repo.clone(),
                    )),
                    settings_service: Arc::new(SettingsService::new(
                        SqlxSettingsRepository::boxed(pool.clone()),
                    )),
                    login_logs: SqlxLoginLogRepository::boxed(pool),
                };
                let therapies = TherapyService::new(
                    therapy_repo,
                    guide_repo.clone(),
                    cache.clone(),
                    marketplace.clone(),
                );
                let guides = GuideService::new(guide_repo, cache, marketplace.clone());
                (Some(store), therapies, guides)
            }
            None => (
                None,
                TherapyService::demo_only(cache.clone(), marketplace.clone()),
                GuideService::demo_only(cache, marketplace.clone()),
            ),
        };

        Self {
            store,
            therapy_service: Arc::new(therapy_service),
            guide_service: Arc::new(guide_service),
            pricing: PriceCalculator::new(marketplace.fee_percent),
            marketplace: Arc::new(marketplace),
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            request_stats: Arc::new(RequestStats::new()),
            trust_proxy: config.server.trust_proxy,
        }
    }

    /// Database-backed services, or `SERVICE_UNAVAILABLE`
    pub fn store(&self) -> Result<&StoreServices, ApiError> {
        self.store.as_ref().ok_or_else(|| {
            ApiError::service_unavailable("This operation requires a configured database")
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// JSON error envelope: `{"error": {"code", "message", "details"?}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("SERVICE_UNAVAILABLE", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and return a generic 500
    fn internal(err: &anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "USER_BANNED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::UserBanned => ApiError::new(
                "USER_BANNED",
                "Your account has been banned. Please contact support.",
            ),
            UserServiceError::NotFound(id) => ApiError::not_found(format!("User {} not found", id)),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<TherapyServiceError> for ApiError {
    fn from(err: TherapyServiceError) -> Self {
        match err {
            TherapyServiceError::NotFound(what) => {
                ApiError::not_found(format!("Therapy not found: {}", what))
            }
            TherapyServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            TherapyServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            TherapyServiceError::ProfileRequired => ApiError::with_details(
                "FORBIDDEN",
                "Create your guide profile before managing listings",
                serde_json::json!({ "profile_required": true }),
            ),
            TherapyServiceError::Unavailable => ApiError::service_unavailable(err.to_string()),
            TherapyServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<GuideServiceError> for ApiError {
    fn from(err: GuideServiceError) -> Self {
        match err {
            GuideServiceError::NotFound(what) => {
                ApiError::not_found(format!("Guide not found: {}", what))
            }
            GuideServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            GuideServiceError::AlreadyExists => ApiError::conflict(err.to_string()),
            GuideServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            GuideServiceError::Unavailable => ApiError::service_unavailable(err.to_string()),
            GuideServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<ReviewServiceError> for ApiError {
    fn from(err: ReviewServiceError) -> Self {
        match err {
            ReviewServiceError::NotFound(what) => ApiError::not_found(format!("Not found: {}", what)),
            ReviewServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ReviewServiceError::AlreadyReviewed => ApiError::conflict(err.to_string()),
            ReviewServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(err: SettingsServiceError) -> Self {
        match err {
            SettingsServiceError::InvalidValue(msg) => ApiError::validation_error(msg),
            other => {
                tracing::error!("Settings error: {}", other);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self {
        ApiError::validation_error(err.to_string())
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated user, inserted by `require_auth`
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Token of the current session, inserted by `require_auth`
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Session token from `Authorization: Bearer` or the `session` cookie.
/// The header wins when both are present.
fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let store = state.store()?;
    let token = extract_session_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = store
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    if user.is_banned() {
        return Err(UserServiceError::UserBanned.into());
    }

    request.extensions_mut().insert(AuthenticatedUser(user));
    request.extensions_mut().insert(SessionToken(token));
    Ok(next.run(request).await)
}

fn current_user(request: &Request) -> Result<&User, ApiError> {
    request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| &u.0)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

/// Guide (or admin/master) authorization middleware
pub async fn require_guide(request: Request, next: Next) -> Result<Response, ApiError> {
    if !current_user(&request)?.is_guide() {
        return Err(ApiError::forbidden("Guide account required"));
    }
    Ok(next.run(request).await)
}

/// Admin (or master) authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    if !current_user(&request)?.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }
    Ok(next.run(request).await)
}

/// Master authorization middleware
pub async fn require_master(request: Request, next: Next) -> Result<Response, ApiError> {
    if !current_user(&request)?.is_master() {
        return Err(ApiError::forbidden("Master privileges required"));
    }
    Ok(next.run(request).await)
}

// ============================================================================
// Client IP
// ============================================================================

/// Address the request came from.
///
/// The TCP peer by default. With `server.trust_proxy` the forwarding
/// headers win, and the peer is used when they are missing or unparsable.
/// `None` only when the server was started without connect info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.trust_proxy {
            if let Some(ip) = forwarded_ip(&parts.headers) {
                return Ok(ClientIp(Some(ip)));
            }
        }

        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(peer))
    }
}

/// Client IP as reported by the proxy: the last `X-Forwarded-For` hop
/// (the one the proxy appended), then `X-Real-IP`
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.rsplit(',').map(str::trim).find(|s| !s.is_empty()))
        .and_then(|s| s.parse().ok());

    from_forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    })
}

/// Records request count and response time
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state
        .request_stats
        .record(start.elapsed().as_micros() as u64);
    response
}
