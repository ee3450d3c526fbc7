//! Therapy repository
//!
//! Listings, their moderation state, and the catalog join with guides.
//!
//! Catalog queries push the country and type predicates down into SQL; free
//! text search is applied by the catalog service so the database path and the
//! demo path share one matcher.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, Therapy, TherapyListing, TherapyStatus, TherapyType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait TherapyRepository: Send + Sync {
    async fn create(&self, therapy: &Therapy) -> Result<Therapy>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Therapy>>;

    /// Persist every editable field plus moderation state
    async fn update(&self, therapy: &Therapy) -> Result<Therapy>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// All listings of one guide regardless of state, newest first
    async fn list_by_guide(&self, guide_id: i64) -> Result<Vec<Therapy>>;

    /// Approved and published listings, newest first
    async fn list_published(
        &self,
        country: Option<&str>,
        therapy_type: Option<TherapyType>,
    ) -> Result<Vec<TherapyListing>>;

    /// Catalog view of a single listing, any state
    async fn get_listing(&self, id: i64) -> Result<Option<TherapyListing>>;

    async fn get_listing_by_slug(&self, slug: &str) -> Result<Option<TherapyListing>>;

    /// Moderation queue, oldest first so nothing starves
    async fn list_by_status(
        &self,
        status: TherapyStatus,
        params: &ListParams,
    ) -> Result<(Vec<TherapyListing>, i64)>;

    async fn set_status(
        &self,
        id: i64,
        status: TherapyStatus,
        rejection_reason: Option<&str>,
    ) -> Result<Option<Therapy>>;

    async fn set_published(&self, id: i64, published: bool) -> Result<Option<Therapy>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    async fn count_by_status(&self, status: TherapyStatus) -> Result<i64>;
}

pub struct SqlxTherapyRepository {
    pool: DynDatabasePool,
}

impl SqlxTherapyRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TherapyRepository> {
        Arc::new(Self::new(pool))
    }
}

const THERAPY_COLUMNS: &str = "t.id, t.guide_id, t.slug, t.title, t.description, t.therapy_type, \
     t.country, t.location, t.base_price, t.currency, t.duration, t.capacity, t.image_url, \
     t.is_published, t.status, t.rejection_reason, t.created_at, t.updated_at";

fn listing_select() -> String {
    format!(
        "SELECT {}, g.name AS guide_name, g.slug AS guide_slug, g.verified AS guide_verified \
         FROM therapies t JOIN guides g ON g.id = t.guide_id",
        THERAPY_COLUMNS
    )
}

#[async_trait]
impl TherapyRepository for SqlxTherapyRepository {
    async fn create(&self, therapy: &Therapy) -> Result<Therapy> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_therapy_sqlite(pool, therapy).await,
            Backend::Postgres(pool) => create_therapy_postgres(pool, therapy).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Therapy>> {
        let sql = format!("SELECT {} FROM therapies t WHERE t.id = ", THERAPY_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&format!("{}?", sql))
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get therapy")?;
                row.as_ref().map(row_to_therapy_sqlite).transpose()
            }
            Backend::Postgres(pool) => {
                let row = sqlx::query(&format!("{}$1", sql))
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get therapy")?;
                row.as_ref().map(row_to_therapy_postgres).transpose()
            }
        }
    }

    async fn update(&self, therapy: &Therapy) -> Result<Therapy> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_therapy_sqlite(pool, therapy).await?,
            Backend::Postgres(pool) => update_therapy_postgres(pool, therapy).await?,
        }

        self.get_by_id(therapy.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Therapy not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query("DELETE FROM therapies WHERE id = ?")
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete therapy")?;
            }
            Backend::Postgres(pool) => {
                sqlx::query("DELETE FROM therapies WHERE id = $1")
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete therapy")?;
            }
        }
        Ok(())
    }

    async fn list_by_guide(&self, guide_id: i64) -> Result<Vec<Therapy>> {
        let sql = format!("SELECT {} FROM therapies t WHERE t.guide_id = ", THERAPY_COLUMNS);
        let order = " ORDER BY t.created_at DESC, t.id DESC";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&format!("{}?{}", sql, order))
                    .bind(guide_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list guide therapies")?;
                rows.iter().map(row_to_therapy_sqlite).collect()
            }
            Backend::Postgres(pool) => {
                let rows = sqlx::query(&format!("{}$1{}", sql, order))
                    .bind(guide_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list guide therapies")?;
                rows.iter().map(row_to_therapy_postgres).collect()
            }
        }
    }

    async fn list_published(
        &self,
        country: Option<&str>,
        therapy_type: Option<TherapyType>,
    ) -> Result<Vec<TherapyListing>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_published_sqlite(pool, country, therapy_type).await,
            Backend::Postgres(pool) => list_published_postgres(pool, country, therapy_type).await,
        }
    }

    async fn get_listing(&self, id: i64) -> Result<Option<TherapyListing>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&format!("{} WHERE t.id = ?", listing_select()))
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get therapy listing")?;
                row.as_ref().map(row_to_listing_sqlite).transpose()
            }
            Backend::Postgres(pool) => {
                let row = sqlx::query(&format!("{} WHERE t.id = $1", listing_select()))
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get therapy listing")?;
                row.as_ref().map(row_to_listing_postgres).transpose()
            }
        }
    }

    async fn get_listing_by_slug(&self, slug: &str) -> Result<Option<TherapyListing>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&format!("{} WHERE t.slug = ?", listing_select()))
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get therapy listing")?;
                row.as_ref().map(row_to_listing_sqlite).transpose()
            }
            Backend::Postgres(pool) => {
                let row = sqlx::query(&format!("{} WHERE t.slug = $1", listing_select()))
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get therapy listing")?;
                row.as_ref().map(row_to_listing_postgres).transpose()
            }
        }
    }

    async fn list_by_status(
        &self,
        status: TherapyStatus,
        params: &ListParams,
    ) -> Result<(Vec<TherapyListing>, i64)> {
        let total = self.count_by_status(status).await?;
        let items = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&format!(
                    "{} WHERE t.status = ? ORDER BY t.created_at ASC, t.id ASC LIMIT ? OFFSET ?",
                    listing_select()
                ))
                .bind(status.to_string())
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
                .context("Failed to list therapies by status")?;
                rows.iter()
                    .map(row_to_listing_sqlite)
                    .collect::<Result<Vec<_>>>()?
            }
            Backend::Postgres(pool) => {
                let rows = sqlx::query(&format!(
                    "{} WHERE t.status = $1 ORDER BY t.created_at ASC, t.id ASC LIMIT $2 OFFSET $3",
                    listing_select()
                ))
                .bind(status.to_string())
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
                .context("Failed to list therapies by status")?;
                rows.iter()
                    .map(row_to_listing_postgres)
                    .collect::<Result<Vec<_>>>()?
            }
        };
        Ok((items, total))
    }

    async fn set_status(
        &self,
        id: i64,
        status: TherapyStatus,
        rejection_reason: Option<&str>,
    ) -> Result<Option<Therapy>> {
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(
                "UPDATE therapies SET status = ?, rejection_reason = ?, updated_at = ? WHERE id = ?",
            )
            .bind(status.to_string())
            .bind(rejection_reason)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to update therapy status")?
            .rows_affected(),
            Backend::Postgres(pool) => sqlx::query(
                "UPDATE therapies SET status = $1, rejection_reason = $2, updated_at = $3 WHERE id = $4",
            )
            .bind(status.to_string())
            .bind(rejection_reason)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to update therapy status")?
            .rows_affected(),
        };

        if affected == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn set_published(&self, id: i64, published: bool) -> Result<Option<Therapy>> {
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query("UPDATE therapies SET is_published = ?, updated_at = ? WHERE id = ?")
                    .bind(published)
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to toggle publish")?
                    .rows_affected()
            }
            Backend::Postgres(pool) => {
                sqlx::query("UPDATE therapies SET is_published = $1, updated_at = $2 WHERE id = $3")
                    .bind(published)
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to toggle publish")?
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
            Backend::Sqlite(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM therapies WHERE slug = ?")
                    .bind(slug)
                    .fetch_one(pool)
                    .await
                    .context("Failed to check therapy slug")?
            }
            Backend::Postgres(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM therapies WHERE slug = $1")
                    .bind(slug)
                    .fetch_one(pool)
                    .await
                    .context("Failed to check therapy slug")?
            }
        };
        Ok(count > 0)
    }

    async fn count_by_status(&self, status: TherapyStatus) -> Result<i64> {
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM therapies WHERE status = ?")
                    .bind(status.to_string())
                    .fetch_one(pool)
                    .await
                    .context("Failed to count therapies")?
            }
            Backend::Postgres(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM therapies WHERE status = $1")
                    .bind(status.to_string())
                    .fetch_one(pool)
                    .await
                    .context("Failed to count therapies")?
            }
        };
        Ok(count)
    }
}

fn parse_type_and_status(therapy_type: &str, status: &str) -> Result<(TherapyType, TherapyStatus)> {
    let therapy_type = TherapyType::from_str(therapy_type)
        .with_context(|| format!("Invalid therapy type in database: {}", therapy_type))?;
    let status = TherapyStatus::from_str(status)
        .with_context(|| format!("Invalid therapy status in database: {}", status))?;
    Ok((therapy_type, status))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_therapy_sqlite(pool: &SqlitePool, therapy: &Therapy) -> Result<Therapy> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO therapies (guide_id, slug, title, description, therapy_type, country, location,
                               base_price, currency, duration, capacity, image_url, is_published,
                               status, rejection_reason, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(therapy.guide_id)
    .bind(&therapy.slug)
    .bind(&therapy.title)
    .bind(&therapy.description)
    .bind(therapy.therapy_type.to_string())
    .bind(&therapy.country)
    .bind(&therapy.location)
    .bind(therapy.base_price)
    .bind(&therapy.currency)
    .bind(&therapy.duration)
    .bind(therapy.capacity)
    .bind(&therapy.image_url)
    .bind(therapy.is_published)
    .bind(therapy.status.to_string())
    .bind(&therapy.rejection_reason)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create therapy")?;

    Ok(Therapy {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..therapy.clone()
    })
}

async fn update_therapy_sqlite(pool: &SqlitePool, therapy: &Therapy) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE therapies
        SET title = ?, description = ?, therapy_type = ?, country = ?, location = ?,
            base_price = ?, currency = ?, duration = ?, capacity = ?, image_url = ?,
            is_published = ?, status = ?, rejection_reason = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&therapy.title)
    .bind(&therapy.description)
    .bind(therapy.therapy_type.to_string())
    .bind(&therapy.country)
    .bind(&therapy.location)
    .bind(therapy.base_price)
    .bind(&therapy.currency)
    .bind(&therapy.duration)
    .bind(therapy.capacity)
    .bind(&therapy.image_url)
    .bind(therapy.is_published)
    .bind(therapy.status.to_string())
    .bind(&therapy.rejection_reason)
    .bind(Utc::now())
    .bind(therapy.id)
    .execute(pool)
    .await
    .context("Failed to update therapy")?;
    Ok(())
}

async fn list_published_sqlite(
    pool: &SqlitePool,
    country: Option<&str>,
    therapy_type: Option<TherapyType>,
) -> Result<Vec<TherapyListing>> {
    let mut sql = format!(
        "{} WHERE t.status = 'approved' AND t.is_published = 1",
        listing_select()
    );
    if country.is_some() {
        sql.push_str(" AND t.country = ?");
    }
    if therapy_type.is_some() {
        sql.push_str(" AND t.therapy_type = ?");
    }
    sql.push_str(" ORDER BY t.created_at DESC, t.id DESC");

    let mut query = sqlx::query(&sql);
    if let Some(country) = country {
        query = query.bind(country);
    }
    if let Some(therapy_type) = therapy_type {
        query = query.bind(therapy_type.to_string());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list published therapies")?;
    rows.iter().map(row_to_listing_sqlite).collect()
}

fn row_to_therapy_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Therapy> {
    let (therapy_type, status) = parse_type_and_status(row.get("therapy_type"), row.get("status"))?;

    Ok(Therapy {
        id: row.get("id"),
        guide_id: row.get("guide_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        therapy_type,
        country: row.get("country"),
        location: row.get("location"),
        base_price: row.get("base_price"),
        currency: row.get("currency"),
        duration: row.get("duration"),
        capacity: row.get("capacity"),
        image_url: row.get("image_url"),
        is_published: row.get("is_published"),
        status,
        rejection_reason: row.get("rejection_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_listing_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<TherapyListing> {
    Ok(TherapyListing {
        therapy: row_to_therapy_sqlite(row)?,
        guide_name: row.get("guide_name"),
        guide_slug: row.get("guide_slug"),
        guide_verified: row.get("guide_verified"),
    })
}

// ============================================================================
// Postgres implementations
// ============================================================================

async fn create_therapy_postgres(pool: &PgPool, therapy: &Therapy) -> Result<Therapy> {
    let now = Utc::now();

    let row = sqlx::query(
        r#"
        INSERT INTO therapies (guide_id, slug, title, description, therapy_type, country, location,
                               base_price, currency, duration, capacity, image_url, is_published,
                               status, rejection_reason, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING id
        "#,
    )
    .bind(therapy.guide_id)
    .bind(&therapy.slug)
    .bind(&therapy.title)
    .bind(&therapy.description)
    .bind(therapy.therapy_type.to_string())
    .bind(&therapy.country)
    .bind(&therapy.location)
    .bind(therapy.base_price)
    .bind(&therapy.currency)
    .bind(&therapy.duration)
    .bind(therapy.capacity)
    .bind(&therapy.image_url)
    .bind(therapy.is_published)
    .bind(therapy.status.to_string())
    .bind(&therapy.rejection_reason)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create therapy")?;

    Ok(Therapy {
        id: row.get("id"),
        created_at: now,
        updated_at: now,
        ..therapy.clone()
    })
}

async fn update_therapy_postgres(pool: &PgPool, therapy: &Therapy) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE therapies
        SET title = $1, description = $2, therapy_type = $3, country = $4, location = $5,
            base_price = $6, currency = $7, duration = $8, capacity = $9, image_url = $10,
            is_published = $11, status = $12, rejection_reason = $13, updated_at = $14
        WHERE id = $15
        "#,
    )
    .bind(&therapy.title)
    .bind(&therapy.description)
    .bind(therapy.therapy_type.to_string())
    .bind(&therapy.country)
    .bind(&therapy.location)
    .bind(therapy.base_price)
    .bind(&therapy.currency)
    .bind(&therapy.duration)
    .bind(therapy.capacity)
    .bind(&therapy.image_url)
    .bind(therapy.is_published)
    .bind(therapy.status.to_string())
    .bind(&therapy.rejection_reason)
    .bind(Utc::now())
    .bind(therapy.id)
    .execute(pool)
    .await
    .context("Failed to update therapy")?;
    Ok(())
}

async fn list_published_postgres(
    pool: &PgPool,
    country: Option<&str>,
    therapy_type: Option<TherapyType>,
) -> Result<Vec<TherapyListing>> {
    let mut sql = format!(
        "{} WHERE t.status = 'approved' AND t.is_published = TRUE",
        listing_select()
    );
    let mut placeholder = 0;
    if country.is_some() {
        placeholder += 1;
        sql.push_str(&format!(" AND t.country = ${}", placeholder));
    }
    if therapy_type.is_some() {
        placeholder += 1;
        sql.push_str(&format!(" AND t.therapy_type = ${}", placeholder));
    }
    sql.push_str(" ORDER BY t.created_at DESC, t.id DESC");

    let mut query = sqlx::query(&sql);
    if let Some(country) = country {
        query = query.bind(country);
    }
    if let Some(therapy_type) = therapy_type {
        query = query.bind(therapy_type.to_string());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list published therapies")?;
    rows.iter().map(row_to_listing_postgres).collect()
}

fn row_to_therapy_postgres(row: &sqlx::postgres::PgRow) -> Result<Therapy> {
    let (therapy_type, status) = parse_type_and_status(row.get("therapy_type"), row.get("status"))?;

    Ok(Therapy {
        id: row.get("id"),
        guide_id: row.get("guide_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        therapy_type,
        country: row.get("country"),
        location: row.get("location"),
        base_price: row.get("base_price"),
        currency: row.get("currency"),
        duration: row.get("duration"),
        capacity: row.get("capacity"),
        image_url: row.get("image_url"),
        is_published: row.get("is_published"),
        status,
        rejection_reason: row.get("rejection_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_listing_postgres(row: &sqlx::postgres::PgRow) -> Result<TherapyListing> {
    Ok(TherapyListing {
        therapy: row_to_therapy_postgres(row)?,
        guide_name: row.get("guide_name"),
        guide_slug: row.get("guide_slug"),
        guide_verified: row.get("guide_verified"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{GuideRepository, SqlxGuideRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Guide, GuideInput, TherapyInput};

    async fn setup() -> (SqlxTherapyRepository, i64) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let guide = SqlxGuideRepository::new(pool.clone())
            .create(&Guide::new(
                None,
                "luz".to_string(),
                GuideInput {
                    name: "Luz Maria".to_string(),
                    country: "mexico".to_string(),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();

        (SqlxTherapyRepository::new(pool), guide.id)
    }

    fn therapy(guide_id: i64, slug: &str, kind: TherapyType, country: &str, status: TherapyStatus) -> Therapy {
        Therapy::new(
            guide_id,
            slug.to_string(),
            TherapyInput {
                title: format!("Listing {}", slug),
                description: "A gentle session".to_string(),
                therapy_type: kind,
                country: country.to_string(),
                location: "Oaxaca".to_string(),
                base_price: 100.0,
                currency: "EUR".to_string(),
                duration: "2h".to_string(),
                capacity: Some(8),
                image_url: None,
                is_published: true,
            },
            status,
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (repo, guide_id) = setup().await;
        let created = repo
            .create(&therapy(guide_id, "a", TherapyType::Ceremony, "mexico", TherapyStatus::Pending))
            .await
            .unwrap();

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.slug, "a");
        assert_eq!(found.therapy_type, TherapyType::Ceremony);
        assert_eq!(found.status, TherapyStatus::Pending);
        assert_eq!(found.capacity, Some(8));
        assert!(found.is_published);
        assert!(repo.slug_exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_published_only_visible() {
        let (repo, guide_id) = setup().await;
        repo.create(&therapy(guide_id, "approved", TherapyType::Ceremony, "mexico", TherapyStatus::Approved))
            .await
            .unwrap();
        repo.create(&therapy(guide_id, "pending", TherapyType::Ceremony, "mexico", TherapyStatus::Pending))
            .await
            .unwrap();
        let hidden = repo
            .create(&therapy(guide_id, "hidden", TherapyType::Event, "spain", TherapyStatus::Approved))
            .await
            .unwrap();
        repo.set_published(hidden.id, false).await.unwrap();

        let listings = repo.list_published(None, None).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].therapy.slug, "approved");
        assert_eq!(listings[0].guide_name, "Luz Maria");
    }

    #[tokio::test]
    async fn test_list_published_filters_pushed_down() {
        let (repo, guide_id) = setup().await;
        repo.create(&therapy(guide_id, "c-mx", TherapyType::Ceremony, "mexico", TherapyStatus::Approved))
            .await
            .unwrap();
        repo.create(&therapy(guide_id, "e-mx", TherapyType::Event, "mexico", TherapyStatus::Approved))
            .await
            .unwrap();
        repo.create(&therapy(guide_id, "c-es", TherapyType::Ceremony, "spain", TherapyStatus::Approved))
            .await
            .unwrap();

        assert_eq!(repo.list_published(Some("mexico"), None).await.unwrap().len(), 2);
        assert_eq!(
            repo.list_published(None, Some(TherapyType::Ceremony)).await.unwrap().len(),
            2
        );
        let both = repo
            .list_published(Some("spain"), Some(TherapyType::Ceremony))
            .await
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].therapy.slug, "c-es");
    }

    #[tokio::test]
    async fn test_moderation_queue_and_status() {
        let (repo, guide_id) = setup().await;
        let first = repo
            .create(&therapy(guide_id, "first", TherapyType::Therapy, "spain", TherapyStatus::Pending))
            .await
            .unwrap();
        repo.create(&therapy(guide_id, "second", TherapyType::Therapy, "spain", TherapyStatus::Pending))
            .await
            .unwrap();

        let (queue, total) = repo
            .list_by_status(TherapyStatus::Pending, &ListParams::new(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(queue[0].therapy.slug, "first");

        let rejected = repo
            .set_status(first.id, TherapyStatus::Rejected, Some("Missing details"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rejected.status, TherapyStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Missing details"));

        assert_eq!(repo.count_by_status(TherapyStatus::Pending).await.unwrap(), 1);
        assert_eq!(repo.count_by_status(TherapyStatus::Rejected).await.unwrap(), 1);
        assert!(repo.set_status(999, TherapyStatus::Approved, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_lookup_by_slug_and_id() {
        let (repo, guide_id) = setup().await;
        let created = repo
            .create(&therapy(guide_id, "kambo", TherapyType::Ceremony, "spain", TherapyStatus::Approved))
            .await
            .unwrap();

        let by_slug = repo.get_listing_by_slug("kambo").await.unwrap().unwrap();
        let by_id = repo.get_listing(created.id).await.unwrap().unwrap();
        assert_eq!(by_slug, by_id);
        assert_eq!(by_id.guide_slug, "luz");
        assert!(!by_id.guide_verified);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (repo, guide_id) = setup().await;
        let mut created = repo
            .create(&therapy(guide_id, "x", TherapyType::Product, "spain", TherapyStatus::Approved))
            .await
            .unwrap();

        created.title = "Renamed".to_string();
        created.base_price = 55.5;
        created.status = TherapyStatus::Pending;
        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.base_price, 55.5);
        assert_eq!(updated.status, TherapyStatus::Pending);

        assert_eq!(repo.list_by_guide(guide_id).await.unwrap().len(), 1);
        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
