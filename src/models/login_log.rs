//! Login audit log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One login attempt, successful or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginLog {
    pub id: i64,
    pub email: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A login attempt about to be recorded
#[derive(Debug, Clone, Default)]
pub struct NewLoginLog {
    pub email: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
}
