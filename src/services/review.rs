//! Review service
//!
//! Users rate published therapies once each, 1 to 5 stars with an optional
//! comment. Admins can delete reviews.

use crate::db::is_unique_violation;
use crate::db::repositories::{ReviewRepository, TherapyRepository};
use crate::models::{
    CreateReviewInput, Review, ReviewSummary, ReviewWithAuthor, User, MAX_COMMENT_CHARS,
};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ReviewServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("You have already reviewed this therapy")]
    AlreadyReviewed,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Reviews of one therapy plus their aggregate
#[derive(Debug, Clone, Serialize)]
pub struct TherapyReviews {
    pub reviews: Vec<ReviewWithAuthor>,
    pub summary: ReviewSummary,
}

pub struct ReviewService {
    repo: Arc<dyn ReviewRepository>,
    therapy_repo: Arc<dyn TherapyRepository>,
}

impl ReviewService {
    pub fn new(repo: Arc<dyn ReviewRepository>, therapy_repo: Arc<dyn TherapyRepository>) -> Self {
        Self { repo, therapy_repo }
    }

    /// Reviews of a publicly visible therapy, newest first
    pub async fn list_for_therapy(
        &self,
        therapy_id: i64,
    ) -> Result<TherapyReviews, ReviewServiceError> {
        self.require_visible(therapy_id).await?;

        let reviews = self
            .repo
            .list_for_therapy(therapy_id)
            .await
            .context("Failed to list reviews")?;
        let summary = self
            .repo
            .summary(therapy_id)
            .await
            .context("Failed to summarize reviews")?;

        Ok(TherapyReviews { reviews, summary })
    }

    pub async fn create(
        &self,
        user: &User,
        therapy_id: i64,
        input: CreateReviewInput,
    ) -> Result<Review, ReviewServiceError> {
        if !(1..=5).contains(&input.rating) {
            return Err(ReviewServiceError::ValidationError(
                "Rating must be between 1 and 5".to_string(),
            ));
        }
        let comment = input.comment.trim().to_string();
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(ReviewServiceError::ValidationError(format!(
                "Comment must be at most {} characters",
                MAX_COMMENT_CHARS
            )));
        }

        self.require_visible(therapy_id).await?;

        if self
            .repo
            .exists_for(therapy_id, user.id)
            .await
            .context("Failed to check existing review")?
        {
            return Err(ReviewServiceError::AlreadyReviewed);
        }

        // A concurrent request may have inserted between the check and here
        let review = match self
            .repo
            .create(&Review::new(therapy_id, user.id, input.rating, comment))
            .await
        {
            Ok(review) => review,
            Err(e) if is_unique_violation(&e) => return Err(ReviewServiceError::AlreadyReviewed),
            Err(e) => return Err(e.context("Failed to create review").into()),
        };

        tracing::info!(review_id = review.id, therapy_id, user_id = user.id, "Review created");
        Ok(review)
    }

    /// Moderator removal
    pub async fn delete(&self, id: i64) -> Result<(), ReviewServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete review")? {
            return Err(ReviewServiceError::NotFound(format!("review {}", id)));
        }
        tracing::info!(review_id = id, "Review deleted");
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, ReviewServiceError> {
        Ok(self.repo.count().await.context("Failed to count reviews")?)
    }

    async fn require_visible(&self, therapy_id: i64) -> Result<(), ReviewServiceError> {
        let visible = self
            .therapy_repo
            .get_by_id(therapy_id)
            .await
            .context("Failed to load therapy")?
            .is_some_and(|t| t.is_visible());

        if visible {
            Ok(())
        } else {
            Err(ReviewServiceError::NotFound(format!("therapy {}", therapy_id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        GuideRepository, SqlxGuideRepository, SqlxReviewRepository, SqlxTherapyRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{Guide, GuideInput, Therapy, TherapyInput, TherapyStatus, TherapyType, UserRole};
    use async_trait::async_trait;

    struct Fixture {
        service: ReviewService,
        pool: DynDatabasePool,
        users: Arc<dyn UserRepository>,
        visible_id: i64,
        pending_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let guide = SqlxGuideRepository::new(pool.clone())
            .create(&Guide::new(
                None,
                "luz".to_string(),
                GuideInput {
                    name: "Luz".to_string(),
                    country: "mexico".to_string(),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();

        let therapies = SqlxTherapyRepository::boxed(pool.clone());
        let mut ids = Vec::new();
        for (slug, status) in [("visible", TherapyStatus::Approved), ("pending", TherapyStatus::Pending)] {
            let therapy = therapies
                .create(&Therapy::new(
                    guide.id,
                    slug.to_string(),
                    TherapyInput {
                        title: slug.to_string(),
                        description: String::new(),
                        therapy_type: TherapyType::Therapy,
                        country: "mexico".to_string(),
                        location: "CDMX".to_string(),
                        base_price: 500.0,
                        currency: "MXN".to_string(),
                        duration: "1h".to_string(),
                        capacity: None,
                        image_url: None,
                        is_published: true,
                    },
                    status,
                ))
                .await
                .unwrap();
            ids.push(therapy.id);
        }

        Fixture {
            service: ReviewService::new(SqlxReviewRepository::boxed(pool.clone()), therapies),
            users: SqlxUserRepository::boxed(pool.clone()),
            pool,
            visible_id: ids[0],
            pending_id: ids[1],
        }
    }

    async fn reviewer(users: &Arc<dyn UserRepository>, n: u32) -> User {
        users
            .create(&User::new(
                format!("r{}@example.com", n),
                format!("Reviewer {}", n),
                "hash".to_string(),
                UserRole::User,
            ))
            .await
            .unwrap()
    }

    fn review(rating: i32, comment: &str) -> CreateReviewInput {
        CreateReviewInput {
            rating,
            comment: comment.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_with_summary() {
        let f = setup().await;
        let a = reviewer(&f.users, 1).await;
        let b = reviewer(&f.users, 2).await;

        f.service.create(&a, f.visible_id, review(5, "Beautiful")).await.unwrap();
        f.service.create(&b, f.visible_id, review(4, "  ")).await.unwrap();

        let listed = f.service.list_for_therapy(f.visible_id).await.unwrap();
        assert_eq!(listed.reviews.len(), 2);
        assert_eq!(listed.reviews[0].author_name, "Reviewer 2");
        assert_eq!(listed.reviews[0].review.comment, "");
        assert_eq!(listed.summary.count, 2);
        assert_eq!(listed.summary.average, 4.5);
        assert_eq!(f.service.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_one_review_per_user() {
        let f = setup().await;
        let a = reviewer(&f.users, 1).await;
        f.service.create(&a, f.visible_id, review(3, "ok")).await.unwrap();

        assert!(matches!(
            f.service.create(&a, f.visible_id, review(5, "changed my mind")).await,
            Err(ReviewServiceError::AlreadyReviewed)
        ));
    }

    /// Never sees existing reviews, like a request racing another one
    struct StaleCheck(Arc<dyn ReviewRepository>);

    #[async_trait]
    impl ReviewRepository for StaleCheck {
        async fn create(&self, review: &Review) -> anyhow::Result<Review> {
            self.0.create(review).await
        }
        async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<Review>> {
            self.0.get_by_id(id).await
        }
        async fn exists_for(&self, _therapy_id: i64, _user_id: i64) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn list_for_therapy(&self, therapy_id: i64) -> anyhow::Result<Vec<ReviewWithAuthor>> {
            self.0.list_for_therapy(therapy_id).await
        }
        async fn summary(&self, therapy_id: i64) -> anyhow::Result<ReviewSummary> {
            self.0.summary(therapy_id).await
        }
        async fn delete(&self, id: i64) -> anyhow::Result<bool> {
            self.0.delete(id).await
        }
        async fn count(&self) -> anyhow::Result<i64> {
            self.0.count().await
        }
    }

    #[tokio::test]
    async fn test_duplicate_insert_after_stale_check_is_conflict() {
        let f = setup().await;
        let a = reviewer(&f.users, 1).await;
        let racing = ReviewService::new(
            Arc::new(StaleCheck(SqlxReviewRepository::boxed(f.pool.clone()))),
            SqlxTherapyRepository::boxed(f.pool.clone()),
        );

        racing.create(&a, f.visible_id, review(5, "first")).await.unwrap();
        assert!(matches!(
            racing.create(&a, f.visible_id, review(1, "second")).await,
            Err(ReviewServiceError::AlreadyReviewed)
        ));
        assert_eq!(f.service.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reviews_by_same_user() {
        let f = setup().await;
        let a = reviewer(&f.users, 1).await;

        let (first, second) = tokio::join!(
            f.service.create(&a, f.visible_id, review(5, "one")),
            f.service.create(&a, f.visible_id, review(4, "two")),
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(ReviewServiceError::AlreadyReviewed))));
    }

    #[tokio::test]
    async fn test_rating_and_comment_bounds() {
        let f = setup().await;
        let a = reviewer(&f.users, 1).await;

        for rating in [0, 6, -1] {
            assert!(matches!(
                f.service.create(&a, f.visible_id, review(rating, "")).await,
                Err(ReviewServiceError::ValidationError(_))
            ));
        }

        let long = "ñ".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(
            f.service.create(&a, f.visible_id, review(5, &long)).await,
            Err(ReviewServiceError::ValidationError(_))
        ));

        let max = "ñ".repeat(MAX_COMMENT_CHARS);
        assert!(f.service.create(&a, f.visible_id, review(5, &max)).await.is_ok());
    }

    #[tokio::test]
    async fn test_hidden_therapies_not_reviewable() {
        let f = setup().await;
        let a = reviewer(&f.users, 1).await;

        assert!(matches!(
            f.service.create(&a, f.pending_id, review(5, "")).await,
            Err(ReviewServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.list_for_therapy(f.pending_id).await,
            Err(ReviewServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.list_for_therapy(9999).await,
            Err(ReviewServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let f = setup().await;
        let a = reviewer(&f.users, 1).await;
        let created = f.service.create(&a, f.visible_id, review(2, "meh")).await.unwrap();

        f.service.delete(created.id).await.unwrap();
        assert!(matches!(
            f.service.delete(created.id).await,
            Err(ReviewServiceError::NotFound(_))
        ));
        assert_eq!(f.service.list_for_therapy(f.visible_id).await.unwrap().summary.count, 0);
    }
}
