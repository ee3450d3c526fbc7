//! Review repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Review, ReviewSummary, ReviewWithAuthor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn create(&self, review: &Review) -> Result<Review>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Review>>;

    /// Whether the user already reviewed the therapy
    async fn exists_for(&self, therapy_id: i64, user_id: i64) -> Result<bool>;

    /// Reviews of a therapy with author names, newest first
    async fn list_for_therapy(&self, therapy_id: i64) -> Result<Vec<ReviewWithAuthor>>;

    async fn summary(&self, therapy_id: i64) -> Result<ReviewSummary>;

    /// Returns false when nothing was deleted
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxReviewRepository {
    pool: DynDatabasePool,
}

impl SqlxReviewRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReviewRepository> {
        Arc::new(Self::new(pool))
    }
}

macro_rules! review_from_row {
    ($row:expr) => {
        Review {
            id: $row.get("id"),
            therapy_id: $row.get("therapy_id"),
            user_id: $row.get("user_id"),
            rating: $row.get("rating"),
            comment: $row.get("comment"),
            created_at: $row.get("created_at"),
        }
    };
}

#[async_trait]
impl ReviewRepository for SqlxReviewRepository {
    async fn create(&self, review: &Review) -> Result<Review> {
        let now = Utc::now();
        let id: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(
                "INSERT INTO reviews (therapy_id, user_id, rating, comment, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(review.therapy_id)
            .bind(review.user_id)
            .bind(review.rating)
            .bind(&review.comment)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to create review")?
            .last_insert_rowid(),
            Backend::Postgres(pool) => sqlx::query(
                "INSERT INTO reviews (therapy_id, user_id, rating, comment, created_at) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(review.therapy_id)
            .bind(review.user_id)
            .bind(review.rating)
            .bind(&review.comment)
            .bind(now)
            .fetch_one(pool)
            .await
            .context("Failed to create review")?
            .get("id"),
        };

        Ok(Review {
            id,
            created_at: now,
            ..review.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Review>> {
        const SELECT: &str =
            "SELECT id, therapy_id, user_id, rating, comment, created_at FROM reviews WHERE id = ";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&format!("{}?", SELECT))
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get review")?;
                Ok(row.map(|row| review_from_row!(row)))
            }
            Backend::Postgres(pool) => {
                let row = sqlx::query(&format!("{}$1", SELECT))
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get review")?;
                Ok(row.map(|row| review_from_row!(row)))
            }
        }
    }

    async fn exists_for(&self, therapy_id: i64, user_id: i64) -> Result<bool> {
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE therapy_id = ? AND user_id = ?")
                    .bind(therapy_id)
                    .bind(user_id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to check existing review")?
            }
            Backend::Postgres(pool) => sqlx::query_scalar(
                "SELECT COUNT(*) FROM reviews WHERE therapy_id = $1 AND user_id = $2",
            )
            .bind(therapy_id)
            .bind(user_id)
            .fetch_one(pool)
            .await
            .context("Failed to check existing review")?,
        };
        Ok(count > 0)
    }

    async fn list_for_therapy(&self, therapy_id: i64) -> Result<Vec<ReviewWithAuthor>> {
        const SELECT: &str = "SELECT r.id, r.therapy_id, r.user_id, r.rating, r.comment, r.created_at, \
                              u.name AS author_name \
                              FROM reviews r JOIN users u ON u.id = r.user_id \
                              WHERE r.therapy_id = ";
        const ORDER: &str = " ORDER BY r.created_at DESC, r.id DESC";

        macro_rules! with_author {
            ($rows:expr) => {
                $rows
                    .into_iter()
                    .map(|row| ReviewWithAuthor {
                        author_name: row.get("author_name"),
                        review: review_from_row!(row),
                    })
                    .collect()
            };
        }

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&format!("{}?{}", SELECT, ORDER))
                    .bind(therapy_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list reviews")?;
                Ok(with_author!(rows))
            }
            Backend::Postgres(pool) => {
                let rows = sqlx::query(&format!("{}$1{}", SELECT, ORDER))
                    .bind(therapy_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list reviews")?;
                Ok(with_author!(rows))
            }
        }
    }

    async fn summary(&self, therapy_id: i64) -> Result<ReviewSummary> {
        let (count, average): (i64, Option<f64>) = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(
                    "SELECT COUNT(*) AS count, AVG(rating) AS average FROM reviews WHERE therapy_id = ?",
                )
                .bind(therapy_id)
                .fetch_one(pool)
                .await
                .context("Failed to summarize reviews")?;
                (row.get("count"), row.get("average"))
            }
            Backend::Postgres(pool) => {
                let row = sqlx::query(
                    "SELECT COUNT(*) AS count, AVG(rating)::DOUBLE PRECISION AS average \
                     FROM reviews WHERE therapy_id = $1",
                )
                .bind(therapy_id)
                .fetch_one(pool)
                .await
                .context("Failed to summarize reviews")?;
                (row.get("count"), row.get("average"))
            }
        };
        Ok(ReviewSummary::new(count, average))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query("DELETE FROM reviews WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete review")?
                .rows_affected(),
            Backend::Postgres(pool) => sqlx::query("DELETE FROM reviews WHERE id = $1")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete review")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query_scalar("SELECT COUNT(*) FROM reviews")
                .fetch_one(pool)
                .await
                .context("Failed to count reviews")?,
            Backend::Postgres(pool) => sqlx::query_scalar("SELECT COUNT(*) FROM reviews")
                .fetch_one(pool)
                .await
                .context("Failed to count reviews")?,
        };
        Ok(count)
    }
}
