//! Login audit log repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{LoginLog, NewLoginLog};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait LoginLogRepository: Send + Sync {
    async fn record(&self, entry: &NewLoginLog) -> Result<()>;

    /// Most recent attempts first
    async fn recent(&self, limit: i64) -> Result<Vec<LoginLog>>;
}

pub struct SqlxLoginLogRepository {
    pool: DynDatabasePool,
}

impl SqlxLoginLogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LoginLogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LoginLogRepository for SqlxLoginLogRepository {
    async fn record(&self, entry: &NewLoginLog) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(
                    "INSERT INTO login_logs (email, ip_address, user_agent, success, failure_reason, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&entry.email)
                .bind(&entry.ip_address)
                .bind(&entry.user_agent)
                .bind(entry.success)
                .bind(&entry.failure_reason)
                .bind(Utc::now())
                .execute(pool)
                .await
                .context("Failed to record login attempt")?;
            }
            Backend::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO login_logs (email, ip_address, user_agent, success, failure_reason, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(&entry.email)
                .bind(&entry.ip_address)
                .bind(&entry.user_agent)
                .bind(entry.success)
                .bind(&entry.failure_reason)
                .bind(Utc::now())
                .execute(pool)
                .await
                .context("Failed to record login attempt")?;
            }
        }
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<LoginLog>> {
        const SELECT: &str =
            "SELECT id, email, ip_address, user_agent, success, failure_reason, created_at FROM login_logs";

        macro_rules! map_rows {
            ($rows:expr) => {
                $rows
                    .into_iter()
                    .map(|row| LoginLog {
                        id: row.get("id"),
                        email: row.get("email"),
                        ip_address: row.get("ip_address"),
                        user_agent: row.get("user_agent"),
                        success: row.get("success"),
                        failure_reason: row.get("failure_reason"),
                        created_at: row.get("created_at"),
                    })
                    .collect()
            };
        }

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&format!("{} ORDER BY id DESC LIMIT ?", SELECT))
                    .bind(limit)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list login logs")?;
                Ok(map_rows!(rows))
            }
            Backend::Postgres(pool) => {
                let rows = sqlx::query(&format!("{} ORDER BY id DESC LIMIT $1", SELECT))
                    .bind(limit)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list login logs")?;
                Ok(map_rows!(rows))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    #[tokio::test]
    async fn test_record_and_list() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxLoginLogRepository::new(pool);

        repo.record(&NewLoginLog {
            email: "a@example.com".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            success: false,
            failure_reason: Some("Invalid credentials".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
        repo.record(&NewLoginLog {
            email: "a@example.com".to_string(),
            success: true,
            ..Default::default()
        })
        .await
        .unwrap();

        let logs = repo.recent(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].success);
        assert!(!logs[1].success);
        assert_eq!(logs[1].failure_reason.as_deref(), Some("Invalid credentials"));
        assert_eq!(logs[1].ip_address.as_deref(), Some("10.0.0.1"));
    }
}
