//! Admin API endpoints
//!
//! Moderation console for admins and the master account:
//! - dashboard counters and request statistics
//! - listing moderation queue, approve and reject
//! - admin settings (update is master only)
//! - account management and the login audit log (master only)

use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::auth::UserResponse;
use crate::api::common::{default_page, default_per_page, PaginationQuery};
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    ListParams, LoginLog, PagedResult, Therapy, TherapyListing, TherapyStatus, UserRole,
    UserStatus,
};
use crate::services::{AdminSettings, StatusCounts};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub version: String,
    pub total_users: i64,
    pub total_guides: i64,
    pub therapies: StatusCounts,
    pub total_reviews: i64,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
}

#[derive(Debug, Deserialize)]
pub struct ModerationQuery {
    /// Defaults to `pending`
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Deserialize)]
pub struct LoginLogQuery {
    #[serde(default = "default_log_limit")]
    pub limit: i64,
}

fn default_log_limit() -> i64 {
    50
}

/// Upper bound for `limit`
const MAX_LOG_LIMIT: i64 = 500;

#[derive(Debug, Serialize)]
pub struct LoginLogResponse {
    pub logs: Vec<LoginLog>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// Routes for admin or master
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(get_dashboard))
        .route("/admin/therapies", get(list_therapies))
        .route("/admin/therapies/{id}/approve", post(approve_therapy))
        .route("/admin/therapies/{id}/reject", post(reject_therapy))
        .route("/admin/settings", get(get_settings))
}

/// Routes for the master account only
pub fn master_router() -> Router<AppState> {
    Router::new()
        .route("/admin/settings", put(update_settings))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}/role", put(set_user_role))
        .route("/admin/users/{id}/status", put(set_user_status))
        .route("/admin/login-logs", get(list_login_logs))
}

/// GET /api/admin/dashboard
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let store = state.store()?;

    let total_users = store.user_service.count().await?;
    let total_guides = state.guide_service.count().await?;
    let therapies = state.therapy_service.counts().await?;
    let total_reviews = store.review_service.count().await?;

    let stats = &state.request_stats;
    let uptime_seconds = stats.uptime_seconds();

    Ok(Json(DashboardResponse {
        version: APP_VERSION.to_string(),
        total_users,
        total_guides,
        therapies,
        total_reviews,
        total_requests: stats.total_requests(),
        avg_response_time_ms: stats.avg_response_time_us() / 1000.0,
        uptime_seconds,
        uptime_formatted: format_uptime(uptime_seconds),
    }))
}

/// Human readable uptime, e.g. `2d 3h 4m`
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// GET /api/admin/therapies?status=&page=&per_page=
async fn list_therapies(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ModerationQuery>,
) -> Result<Json<PagedResult<TherapyListing>>, ApiError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => TherapyStatus::Pending,
        Some(raw) => raw
            .parse()
            .map_err(|e: anyhow::Error| ApiError::validation_error(e.to_string()))?,
    };
    let params = ListParams::new(query.page, query.per_page);

    Ok(Json(
        state.therapy_service.list_by_status(status, &params).await?,
    ))
}

/// POST /api/admin/therapies/{id}/approve
async fn approve_therapy(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Therapy>, ApiError> {
    Ok(Json(state.therapy_service.approve(id).await?))
}

/// POST /api/admin/therapies/{id}/reject
async fn reject_therapy(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<RejectRequest>,
) -> Result<Json<Therapy>, ApiError> {
    Ok(Json(state.therapy_service.reject(id, &body.reason).await?))
}

/// GET /api/admin/settings
async fn get_settings(State(state): State<AppState>) -> Result<Json<AdminSettings>, ApiError> {
    Ok(Json(state.store()?.settings_service.get_admin_settings().await?))
}

/// PUT /api/admin/settings
async fn update_settings(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<AdminSettings>,
) -> Result<Json<AdminSettings>, ApiError> {
    let settings = state
        .store()?
        .settings_service
        .update_admin_settings(&body)
        .await?;
    tracing::info!(user_id = user.id, "Admin settings updated");
    Ok(Json(settings))
}

/// GET /api/admin/users?page=&per_page=
async fn list_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PaginationQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let result = state
        .store()?
        .user_service
        .list(&query.params())
        .await?;
    let total_pages = result.total_pages();

    Ok(Json(UserListResponse {
        total: result.total,
        page: result.page,
        per_page: result.per_page,
        total_pages,
        users: result.items.into_iter().map(UserResponse::from).collect(),
    }))
}

/// PUT /api/admin/users/{id}/role
async fn set_user_role(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<RoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store()?
        .user_service
        .set_role(&actor, id, body.role)
        .await?;
    Ok(Json(user.into()))
}

/// PUT /api/admin/users/{id}/status
async fn set_user_status(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store()?
        .user_service
        .set_status(&actor, id, body.status)
        .await?;
    Ok(Json(user.into()))
}

/// GET /api/admin/login-logs?limit=
///
/// Most recent login attempts first
async fn list_login_logs(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LoginLogQuery>,
) -> Result<Json<LoginLogResponse>, ApiError> {
    let limit = query.limit.clamp(1, MAX_LOG_LIMIT);
    let logs = state
        .store()?
        .login_logs
        .recent(limit)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list login logs: {:#}", e);
            ApiError::internal_error("Internal server error")
        })?;

    Ok(Json(LoginLogResponse {
        count: logs.len(),
        logs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m");
        assert_eq!(format_uptime(3 * 3600 + 60), "3h 1m");
        assert_eq!(format_uptime(2 * 86400 + 3 * 3600 + 4 * 60), "2d 3h 4m");
    }

    #[test]
    fn test_role_request_parses_lowercase() {
        let body: RoleRequest = serde_json::from_str(r#"{"role":"guide"}"#).unwrap();
        assert_eq!(body.role, UserRole::Guide);
        assert!(serde_json::from_str::<RoleRequest>(r#"{"role":"root"}"#).is_err());
    }
}
