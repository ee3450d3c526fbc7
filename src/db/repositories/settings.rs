//! Settings repository
//!
//! Key/value storage behind the typed admin settings.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{Backend, DynDatabasePool};

/// A setting key-value pair
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Repository trait for settings operations
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Get a single setting by key
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    /// Get all settings
    async fn get_all(&self) -> Result<Vec<Setting>>;

    /// Get multiple settings by keys; missing keys are absent from the map
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let mut result = HashMap::new();
        for key in keys {
            if let Some(setting) = self.get(key).await? {
                result.insert(setting.key, setting.value);
            }
        }
        Ok(result)
    }

    /// Insert or replace a single setting
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Set multiple settings at once
    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()> {
        for (key, value) in settings {
            self.set(key, value).await?;
        }
        Ok(())
    }
}

/// SQLx-based settings repository
pub struct SqlxSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_sqlite(pool, key).await,
            Backend::Postgres(pool) => get_postgres(pool, key).await,
        }
    }

    async fn get_all(&self) -> Result<Vec<Setting>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query("SELECT key, value, updated_at FROM settings ORDER BY key")
                    .fetch_all(pool)
                    .await
                    .context("Failed to list settings")?;
                Ok(rows
                    .into_iter()
                    .map(|r| Setting {
                        key: r.get("key"),
                        value: r.get("value"),
                        updated_at: r.get("updated_at"),
                    })
                    .collect())
            }
            Backend::Postgres(pool) => {
                let rows = sqlx::query("SELECT key, value, updated_at FROM settings ORDER BY key")
                    .fetch_all(pool)
                    .await
                    .context("Failed to list settings")?;
                Ok(rows
                    .into_iter()
                    .map(|r| Setting {
                        key: r.get("key"),
                        value: r.get("value"),
                        updated_at: r.get("updated_at"),
                    })
                    .collect())
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(
                    "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                )
                .bind(key)
                .bind(value)
                .bind(Utc::now())
                .execute(pool)
                .await
                .with_context(|| format!("Failed to save setting {}", key))?;
            }
            Backend::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, $3)
                     ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
                )
                .bind(key)
                .bind(value)
                .bind(Utc::now())
                .execute(pool)
                .await
                .with_context(|| format!("Failed to save setting {}", key))?;
            }
        }
        Ok(())
    }
}

async fn get_sqlite(pool: &SqlitePool, key: &str) -> Result<Option<Setting>> {
    let row = sqlx::query("SELECT key, value, updated_at FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get setting")?;

    Ok(row.map(|r| Setting {
        key: r.get("key"),
        value: r.get("value"),
        updated_at: r.get("updated_at"),
    }))
}

async fn get_postgres(pool: &PgPool, key: &str) -> Result<Option<Setting>> {
    let row = sqlx::query("SELECT key, value, updated_at FROM settings WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get setting")?;

    Ok(row.map(|r| Setting {
        key: r.get("key"),
        value: r.get("value"),
        updated_at: r.get("updated_at"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> SqlxSettingsRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxSettingsRepository::new(pool)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let repo = setup().await;
        assert!(repo.get("site_name").await.unwrap().is_none());

        repo.set("site_name", "PsycheConecta").await.unwrap();
        assert_eq!(repo.get("site_name").await.unwrap().unwrap().value, "PsycheConecta");

        repo.set("site_name", "Renamed").await.unwrap();
        assert_eq!(repo.get("site_name").await.unwrap().unwrap().value, "Renamed");
        assert_eq!(repo.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_many_and_set_many() {
        let repo = setup().await;
        let mut values = HashMap::new();
        values.insert("a".to_string(), "1".to_string());
        values.insert("b".to_string(), "2".to_string());
        repo.set_many(&values).await.unwrap();

        let found = repo.get_many(&["a", "b", "missing"]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"], "1");
        assert!(!found.contains_key("missing"));
    }
}
