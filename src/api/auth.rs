//! Authentication API endpoints
//!
//! - POST /api/auth/register - create an account and sign in
//! - POST /api/auth/login - sign in (rate limited, audited)
//! - POST /api/auth/logout - end the current session
//! - GET /api/auth/me - current user
//! - PUT /api/auth/password - change password

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::extract::ApiJson;
use crate::api::middleware::{
    ApiError, AppState, AuthenticatedUser, ClientIp, SessionToken, StoreServices,
};
use crate::models::limits::{self, clip};
use crate::models::{NewLoginLog, Session, User};
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub status: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role.to_string(),
            status: user.status.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Routes reachable without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/password", put(change_password))
}

/// POST /api/auth/register
///
/// The very first account becomes `master`.
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store()?;
    let login = LoginInput {
        email: body.email.clone(),
        password: body.password.clone(),
    };

    store.user_service.register(body).await?;
    let (user, session) = store.user_service.login(login).await?;

    Ok((StatusCode::CREATED, session_response(user, session)?))
}

/// POST /api/auth/login
///
/// Limited to 10 requests per minute per client IP and 5 failures per 15
/// minutes per email. Every attempt lands in `login_logs`.
async fn login(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store()?;
    let attempt = NewLoginLog {
        email: clip(&body.email.trim().to_lowercase(), limits::EMAIL),
        ip_address: client_ip.map(|ip| ip.to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(String::from),
        ..Default::default()
    };

    if let Some(ip) = client_ip {
        if state.rate_limiter.is_ip_limited(ip).await {
            log_login_attempt(store, &attempt, Some("ip_rate_limited")).await;
            return Err(ApiError::rate_limited(
                "Too many login requests, please try again shortly",
                60,
            ));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    if state.rate_limiter.is_email_limited(&attempt.email).await {
        log_login_attempt(store, &attempt, Some("email_rate_limited")).await;
        return Err(ApiError::rate_limited(
            "Too many failed attempts, please try again in 15 minutes",
            900,
        ));
    }

    match store.user_service.login(body).await {
        Ok((user, session)) => {
            state.rate_limiter.clear_email_attempts(&attempt.email).await;
            log_login_attempt(store, &attempt, None).await;
            tracing::info!(user_id = user.id, "User logged in");
            session_response(user, session)
        }
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                state.rate_limiter.record_failed_attempt(&attempt.email).await;
            }
            log_login_attempt(store, &attempt, Some(e.failure_reason())).await;
            Err(e.into())
        }
    }
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<impl IntoResponse, ApiError> {
    state.store()?.user_service.logout(&token).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/auth/me
async fn get_current_user(AuthenticatedUser(user): AuthenticatedUser) -> Json<UserResponse> {
    Json(user.into())
}

/// PUT /api/auth/password
///
/// Other sessions of the account are signed out; this one stays valid.
async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    SessionToken(token): SessionToken,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .store()?
        .user_service
        .change_password(user.id, &body.current_password, &body.new_password, Some(&token))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// JSON body plus the HttpOnly `session` cookie
fn session_response(
    user: User,
    session: Session,
) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id, max_age
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|_| ApiError::internal_error("Invalid session cookie"))?,
    );

    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
            expires_at: session.expires_at.to_rfc3339(),
        }),
    ))
}

/// Audit a login attempt; a failed write is logged, never surfaced
async fn log_login_attempt(store: &StoreServices, attempt: &NewLoginLog, failure: Option<&str>) {
    let entry = NewLoginLog {
        success: failure.is_none(),
        failure_reason: failure.map(String::from),
        ..attempt.clone()
    };
    if let Err(e) = store.login_logs.record(&entry).await {
        tracing::warn!("Failed to record login attempt: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_is_http_only() {
        let user = User::new("a@b.c".into(), "A".into(), "h".into(), Default::default());
        let session = Session::new(1, 7);
        let (headers, body) = session_response(user, session.clone()).unwrap();

        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("session={};", session.id)));
        assert!(cookie.contains("HttpOnly"));
        assert_eq!(body.token, session.id);
    }
}
