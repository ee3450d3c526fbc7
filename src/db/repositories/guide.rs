//! Guide repository
//!
//! - `GuideRepository` trait defining the interface for guide profiles
//! - `SqlxGuideRepository` implementing the trait for SQLite and Postgres

use crate::db::{Backend, DynDatabasePool};
use crate::models::{join_specialties, split_specialties, Guide};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait GuideRepository: Send + Sync {
    async fn create(&self, guide: &Guide) -> Result<Guide>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Guide>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Guide>>;

    /// The profile owned by a user account
    async fn get_by_user(&self, user_id: i64) -> Result<Option<Guide>>;

    async fn update(&self, guide: &Guide) -> Result<Guide>;

    /// Guides ordered verified first, then by name; optionally one country
    async fn list(&self, country: Option<&str>) -> Result<Vec<Guide>>;

    async fn set_verified(&self, id: i64, verified: bool) -> Result<Option<Guide>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxGuideRepository {
    pool: DynDatabasePool,
}

impl SqlxGuideRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn GuideRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl GuideRepository for SqlxGuideRepository {
    async fn create(&self, guide: &Guide) -> Result<Guide> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_guide_sqlite(pool, guide).await,
            Backend::Postgres(pool) => create_guide_postgres(pool, guide).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Guide>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&format!("SELECT {} FROM guides WHERE id = ?", GUIDE_COLUMNS))
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get guide by ID")?;
                Ok(row.as_ref().map(row_to_guide_sqlite))
            }
            Backend::Postgres(pool) => {
                let row = sqlx::query(&format!("SELECT {} FROM guides WHERE id = $1", GUIDE_COLUMNS))
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get guide by ID")?;
                Ok(row.as_ref().map(row_to_guide_postgres))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Guide>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row =
                    sqlx::query(&format!("SELECT {} FROM guides WHERE slug = ?", GUIDE_COLUMNS))
                        .bind(slug)
                        .fetch_optional(pool)
                        .await
                        .context("Failed to get guide by slug")?;
                Ok(row.as_ref().map(row_to_guide_sqlite))
            }
            Backend::Postgres(pool) => {
                let row =
                    sqlx::query(&format!("SELECT {} FROM guides WHERE slug = $1", GUIDE_COLUMNS))
                        .bind(slug)
                        .fetch_optional(pool)
                        .await
                        .context("Failed to get guide by slug")?;
                Ok(row.as_ref().map(row_to_guide_postgres))
            }
        }
    }

    async fn get_by_user(&self, user_id: i64) -> Result<Option<Guide>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&format!(
                    "SELECT {} FROM guides WHERE user_id = ?",
                    GUIDE_COLUMNS
                ))
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .context("Failed to get guide by user")?;
                Ok(row.as_ref().map(row_to_guide_sqlite))
            }
            Backend::Postgres(pool) => {
                let row = sqlx::query(&format!(
                    "SELECT {} FROM guides WHERE user_id = $1",
                    GUIDE_COLUMNS
                ))
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .context("Failed to get guide by user")?;
                Ok(row.as_ref().map(row_to_guide_postgres))
            }
        }
    }

    async fn update(&self, guide: &Guide) -> Result<Guide> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(
                    r#"
                    UPDATE guides
                    SET name = ?, bio = ?, country = ?, city = ?, photo_url = ?,
                        specialties = ?, whatsapp = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&guide.name)
                .bind(&guide.bio)
                .bind(&guide.country)
                .bind(&guide.city)
                .bind(&guide.photo_url)
                .bind(join_specialties(&guide.specialties))
                .bind(&guide.whatsapp)
                .bind(Utc::now())
                .bind(guide.id)
                .execute(pool)
                .await
                .context("Failed to update guide")?;
            }
            Backend::Postgres(pool) => {
                sqlx::query(
                    r#"
                    UPDATE guides
                    SET name = $1, bio = $2, country = $3, city = $4, photo_url = $5,
                        specialties = $6, whatsapp = $7, updated_at = $8
                    WHERE id = $9
                    "#,
                )
                .bind(&guide.name)
                .bind(&guide.bio)
                .bind(&guide.country)
                .bind(&guide.city)
                .bind(&guide.photo_url)
                .bind(join_specialties(&guide.specialties))
                .bind(&guide.whatsapp)
                .bind(Utc::now())
                .bind(guide.id)
                .execute(pool)
                .await
                .context("Failed to update guide")?;
            }
        }

        self.get_by_id(guide.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Guide not found after update"))
    }

    async fn list(&self, country: Option<&str>) -> Result<Vec<Guide>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_guides_sqlite(pool, country).await,
            Backend::Postgres(pool) => list_guides_postgres(pool, country).await,
        }
    }

    async fn set_verified(&self, id: i64, verified: bool) -> Result<Option<Guide>> {
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query("UPDATE guides SET verified = ?, updated_at = ? WHERE id = ?")
                    .bind(verified)
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to verify guide")?
                    .rows_affected()
            }
            Backend::Postgres(pool) => {
                sqlx::query("UPDATE guides SET verified = $1, updated_at = $2 WHERE id = $3")
                    .bind(verified)
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to verify guide")?
                    .rows_affected()
            }
        };

        if affected == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query_scalar("SELECT COUNT(*) FROM guides WHERE slug = ?")
                .bind(slug)
                .fetch_one(pool)
                .await
                .context("Failed to check guide slug")?,
            Backend::Postgres(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM guides WHERE slug = $1")
                    .bind(slug)
                    .fetch_one(pool)
                    .await
                    .context("Failed to check guide slug")?
            }
        };
        Ok(count > 0)
    }

    async fn count(&self) -> Result<i64> {
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query_scalar("SELECT COUNT(*) FROM guides")
                .fetch_one(pool)
                .await
                .context("Failed to count guides")?,
            Backend::Postgres(pool) => sqlx::query_scalar("SELECT COUNT(*) FROM guides")
                .fetch_one(pool)
                .await
                .context("Failed to count guides")?,
        };
        Ok(count)
    }
}

const GUIDE_COLUMNS: &str = "id, user_id, slug, name, bio, country, city, photo_url, specialties, \
                             whatsapp, verified, created_at, updated_at";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_guide_sqlite(pool: &SqlitePool, guide: &Guide) -> Result<Guide> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO guides (user_id, slug, name, bio, country, city, photo_url, specialties,
                            whatsapp, verified, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guide.user_id)
    .bind(&guide.slug)
    .bind(&guide.name)
    .bind(&guide.bio)
    .bind(&guide.country)
    .bind(&guide.city)
    .bind(&guide.photo_url)
    .bind(join_specialties(&guide.specialties))
    .bind(&guide.whatsapp)
    .bind(guide.verified)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create guide")?;

    Ok(Guide {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..guide.clone()
    })
}

async fn list_guides_sqlite(pool: &SqlitePool, country: Option<&str>) -> Result<Vec<Guide>> {
    let rows = match country {
        Some(country) => {
            sqlx::query(&format!(
                "SELECT {} FROM guides WHERE country = ? ORDER BY verified DESC, name",
                GUIDE_COLUMNS
            ))
            .bind(country)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM guides ORDER BY verified DESC, name",
                GUIDE_COLUMNS
            ))
            .fetch_all(pool)
            .await
        }
    }
    .context("Failed to list guides")?;

    Ok(rows.iter().map(row_to_guide_sqlite).collect())
}

fn row_to_guide_sqlite(row: &sqlx::sqlite::SqliteRow) -> Guide {
    let specialties: String = row.get("specialties");
    Guide {
        id: row.get("id"),
        user_id: row.get("user_id"),
        slug: row.get("slug"),
        name: row.get("name"),
        bio: row.get("bio"),
        country: row.get("country"),
        city: row.get("city"),
        photo_url: row.get("photo_url"),
        specialties: split_specialties(&specialties),
        whatsapp: row.get("whatsapp"),
        verified: row.get("verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// Postgres implementations
// ============================================================================

async fn create_guide_postgres(pool: &PgPool, guide: &Guide) -> Result<Guide> {
    let now = Utc::now();

    let row = sqlx::query(
        r#"
        INSERT INTO guides (user_id, slug, name, bio, country, city, photo_url, specialties,
                            whatsapp, verified, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING id
        "#,
    )
    .bind(guide.user_id)
    .bind(&guide.slug)
    .bind(&guide.name)
    .bind(&guide.bio)
    .bind(&guide.country)
    .bind(&guide.city)
    .bind(&guide.photo_url)
    .bind(join_specialties(&guide.specialties))
    .bind(&guide.whatsapp)
    .bind(guide.verified)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create guide")?;

    Ok(Guide {
        id: row.get("id"),
        created_at: now,
        updated_at: now,
        ..guide.clone()
    })
}

async fn list_guides_postgres(pool: &PgPool, country: Option<&str>) -> Result<Vec<Guide>> {
    let rows = match country {
        Some(country) => {
            sqlx::query(&format!(
                "SELECT {} FROM guides WHERE country = $1 ORDER BY verified DESC, name",
                GUIDE_COLUMNS
            ))
            .bind(country)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM guides ORDER BY verified DESC, name",
                GUIDE_COLUMNS
            ))
            .fetch_all(pool)
            .await
        }
    }
    .context("Failed to list guides")?;

    Ok(rows.iter().map(row_to_guide_postgres).collect())
}

fn row_to_guide_postgres(row: &sqlx::postgres::PgRow) -> Guide {
    let specialties: String = row.get("specialties");
    Guide {
        id: row.get("id"),
        user_id: row.get("user_id"),
        slug: row.get("slug"),
        name: row.get("name"),
        bio: row.get("bio"),
        country: row.get("country"),
        city: row.get("city"),
        photo_url: row.get("photo_url"),
        specialties: split_specialties(&specialties),
        whatsapp: row.get("whatsapp"),
        verified: row.get("verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::GuideInput;

    async fn setup() -> SqlxGuideRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxGuideRepository::new(pool)
    }

    fn guide(slug: &str, name: &str, country: &str) -> Guide {
        Guide::new(
            None,
            slug.to_string(),
            GuideInput {
                name: name.to_string(),
                country: country.to_string(),
                specialties: vec!["breathwork".to_string(), "sound healing".to_string()],
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = setup().await;
        let created = repo.create(&guide("luz", "Luz", "mexico")).await.unwrap();
        assert!(created.id > 0);

        let by_slug = repo.get_by_slug("luz").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
        assert_eq!(by_slug.specialties, vec!["breathwork", "sound healing"]);
        assert!(!by_slug.verified);

        assert!(repo.slug_exists("luz").await.unwrap());
        assert!(!repo.slug_exists("sol").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_country_verified_first() {
        let repo = setup().await;
        repo.create(&guide("alba", "Alba", "spain")).await.unwrap();
        let bruno = repo.create(&guide("bruno", "Bruno", "spain")).await.unwrap();
        repo.create(&guide("carmen", "Carmen", "mexico")).await.unwrap();
        repo.set_verified(bruno.id, true).await.unwrap();

        let spain = repo.list(Some("spain")).await.unwrap();
        let names: Vec<_> = spain.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Bruno", "Alba"]);

        assert_eq!(repo.list(None).await.unwrap().len(), 3);
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_set_verified_missing_guide() {
        let repo = setup().await;
        assert!(repo.set_verified(404, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let repo = setup().await;
        let mut created = repo.create(&guide("luz", "Luz", "mexico")).await.unwrap();
        created.bio = "Temazcal keeper".to_string();
        created.whatsapp = Some("+52 1 555 000".to_string());

        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.bio, "Temazcal keeper");
        assert_eq!(updated.whatsapp.as_deref(), Some("+52 1 555 000"));
    }
}
