//! User service
//!
//! Accounts and sessions:
//! - registration (the very first account becomes `master`)
//! - login/logout with UUID session tokens
//! - session validation; expired sessions are deleted when seen
//! - password changes
//! - role and status management for the master console

use crate::db::is_unique_violation;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::limits::{self, check_len};
use crate::models::{ListParams, PagedResult, Session, User, UserRole, UserStatus};
use crate::services::password::{hash_password, validate_password, verify_password};
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

/// Default session lifetime in days
const DEFAULT_SESSION_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Account is banned")]
    UserBanned,

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl UserServiceError {
    /// Short machine-readable reason, written to the login audit log
    pub fn failure_reason(&self) -> &'static str {
        match self {
            UserServiceError::AuthenticationError(_) => "invalid_credentials",
            UserServiceError::UserBanned => "user_banned",
            UserServiceError::ValidationError(_) => "invalid_input",
            _ => "internal_error",
        }
    }
}

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub name: String,
    pub password: String,
    /// `user` (default) or `guide`
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Input for login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_days(user_repo, session_repo, DEFAULT_SESSION_DAYS)
    }

    pub fn with_session_days(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_days,
        }
    }

    /// Register a new account.
    ///
    /// Self-registration may only pick `user` or `guide`. The first account
    /// in an empty database becomes `master` regardless.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let email = input.email.trim().to_lowercase();
        let name = input.name.trim().to_string();

        if name.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Name cannot be empty".to_string(),
            ));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(UserServiceError::ValidationError(
                "Invalid email format".to_string(),
            ));
        }
        check_len("Email", &email, limits::EMAIL).map_err(UserServiceError::ValidationError)?;
        check_len("Name", &name, limits::USER_NAME).map_err(UserServiceError::ValidationError)?;
        validate_password(&input.password).map_err(UserServiceError::ValidationError)?;

        let requested = input.role.unwrap_or_default();
        if !matches!(requested, UserRole::User | UserRole::Guide) {
            return Err(UserServiceError::ValidationError(format!(
                "Cannot self-register with role '{}'",
                requested
            )));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let role = if self.is_first_user().await? {
            UserRole::Master
        } else {
            requested
        };

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = match self
            .user_repo
            .create(&User::new(email.clone(), name, password_hash, role))
            .await
        {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(format!(
                    "Email '{}' is already registered",
                    email
                )))
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let email = input.email.trim().to_lowercase();
        let invalid = || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let user = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?
        {
            return Err(invalid());
        }

        if user.is_banned() {
            return Err(UserServiceError::UserBanned);
        }

        let session = self
            .session_repo
            .create(&Session::new(user.id, self.session_days))
            .await
            .context("Failed to create session")?;

        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a session token, or `None` for unknown or expired tokens
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Change a password after checking the current one; other sessions are
    /// signed out.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
        keep_session: Option<&str>,
    ) -> Result<(), UserServiceError> {
        let mut user = self.require_user(user_id).await?;

        if !verify_password(current_password, &user.password_hash)
            .context("Failed to verify password")?
        {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_password(new_password).map_err(UserServiceError::ValidationError)?;

        user.password_hash = hash_password(new_password).context("Failed to hash password")?;
        user.updated_at = Utc::now();
        self.user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;

        self.session_repo
            .delete_by_user(user_id)
            .await
            .context("Failed to revoke sessions")?;

        // Re-issue the caller's own session under the same token
        if let Some(token) = keep_session {
            let mut session = Session::new(user_id, self.session_days);
            session.id = token.to_string();
            self.session_repo
                .create(&session)
                .await
                .context("Failed to restore session")?;
        }

        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    /// Change another user's role. A master cannot demote themselves.
    pub async fn set_role(
        &self,
        actor: &User,
        target_id: i64,
        role: UserRole,
    ) -> Result<User, UserServiceError> {
        if !actor.is_master() {
            return Err(UserServiceError::Forbidden(
                "Only the master can change roles".to_string(),
            ));
        }
        if actor.id == target_id && role != UserRole::Master {
            return Err(UserServiceError::Forbidden(
                "The master cannot demote themselves".to_string(),
            ));
        }

        let mut user = self.require_user(target_id).await?;
        user.role = role;
        user.updated_at = Utc::now();
        let user = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;

        tracing::info!(actor = actor.id, target = target_id, role = %role, "User role changed");
        Ok(user)
    }

    /// Ban or unban a user. Banning revokes their sessions.
    pub async fn set_status(
        &self,
        actor: &User,
        target_id: i64,
        status: UserStatus,
    ) -> Result<User, UserServiceError> {
        if !actor.is_master() {
            return Err(UserServiceError::Forbidden(
                "Only the master can change account status".to_string(),
            ));
        }
        if actor.id == target_id && status == UserStatus::Banned {
            return Err(UserServiceError::Forbidden(
                "The master cannot ban themselves".to_string(),
            ));
        }

        let mut user = self.require_user(target_id).await?;
        user.status = status;
        user.updated_at = Utc::now();
        let user = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;

        if status == UserStatus::Banned {
            self.session_repo
                .delete_by_user(target_id)
                .await
                .context("Failed to revoke sessions")?;
        }

        tracing::info!(actor = actor.id, target = target_id, status = %status, "User status changed");
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self
            .user_repo
            .list(params)
            .await
            .context("Failed to list users")?;
        Ok(PagedResult::new(users, total, params))
    }

    pub async fn count(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await.context("Failed to count users")?)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        Ok(self.count().await? == 0)
    }

    /// Periodic maintenance; returns how many sessions were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn require_user(&self, id: i64) -> Result<User, UserServiceError> {
        self.get_by_id(id).await?.ok_or(UserServiceError::NotFound(id))
    }
}
