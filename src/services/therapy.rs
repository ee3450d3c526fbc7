//! Therapy service
//!
//! Public catalog reads with demo fallback, guide self-service listing
//! management and the moderation queue.
//!
//! Catalog reads never fail because of the database: with no repository
//! configured, or when a query errors, they answer from the demo catalog.
//! Writes need a repository and report `Unavailable` without one.

use crate::cache::{Cache, CacheLayer};
use crate::config::MarketplaceConfig;
use crate::db::is_unique_violation;
use crate::db::repositories::{GuideRepository, TherapyRepository};
use crate::models::limits::{self, check_len};
use crate::models::{
    Guide, ListParams, PagedResult, Therapy, TherapyInput, TherapyListing, TherapyStatus, User,
};
use crate::services::catalog::{Sourced, TherapyFilter};
use crate::services::demo;
use crate::services::slug::{generate_slug, unique_slug};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

const CACHE_PATTERN_THERAPIES: &str = "therapies:*";
const CACHE_KEY_THERAPY: &str = "therapies:item:";

/// Longest accepted rejection reason, in characters
const MAX_REASON_CHARS: usize = 500;
/// Inserts retried after losing a race on the slug
const SLUG_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum TherapyServiceError {
    #[error("Therapy not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The caller has no guide profile yet
    #[error("A guide profile is required")]
    ProfileRequired,

    /// No database configured
    #[error("Listing management is unavailable without a database")]
    Unavailable,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Moderation dashboard counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

pub struct TherapyService {
    repo: Option<Arc<dyn TherapyRepository>>,
    guide_repo: Option<Arc<dyn GuideRepository>>,
    cache: Arc<Cache>,
    marketplace: MarketplaceConfig,
}

impl TherapyService {
    pub fn new(
        repo: Arc<dyn TherapyRepository>,
        guide_repo: Arc<dyn GuideRepository>,
        cache: Arc<Cache>,
        marketplace: MarketplaceConfig,
    ) -> Self {
        Self {
            repo: Some(repo),
            guide_repo: Some(guide_repo),
            cache,
            marketplace,
        }
    }

    /// Catalog served entirely from demo data
    pub fn demo_only(cache: Arc<Cache>, marketplace: MarketplaceConfig) -> Self {
        Self {
            repo: None,
            guide_repo: None,
            cache,
            marketplace,
        }
    }

    // ------------------------------------------------------------------
    // Public catalog
    // ------------------------------------------------------------------

    /// Approved and published listings matching `filter`
    pub async fn list_published(&self, filter: &TherapyFilter) -> Sourced<Vec<TherapyListing>> {
        let Some(repo) = &self.repo else {
            return Sourced::demo(filter.apply(demo::therapies()));
        };

        let cache_key = filter.cache_key();
        if let Ok(Some(cached)) = self.cache.get::<Vec<TherapyListing>>(&cache_key).await {
            return Sourced::database(cached);
        }

        match repo
            .list_published(filter.country.as_deref(), filter.therapy_type)
            .await
        {
            Ok(rows) => {
                let listings = filter.apply(rows);
                if let Err(e) = self.cache.set(&cache_key, &listings).await {
                    tracing::debug!("Failed to cache catalog query: {:#}", e);
                }
                Sourced::database(listings)
            }
            Err(e) => {
                tracing::warn!("Catalog query failed, serving demo data: {:#}", e);
                Sourced::demo(filter.apply(demo::therapies()))
            }
        }
    }

    /// A single publicly visible listing by numeric id or slug
    pub async fn get_published(
        &self,
        id_or_slug: &str,
    ) -> Result<Sourced<TherapyListing>, TherapyServiceError> {
        let demo_lookup = || {
            demo::find_therapy(id_or_slug)
                .map(Sourced::demo)
                .ok_or_else(|| TherapyServiceError::NotFound(id_or_slug.to_string()))
        };

        let Some(repo) = &self.repo else {
            return demo_lookup();
        };

        let cache_key = format!("{}{}", CACHE_KEY_THERAPY, id_or_slug);
        if let Ok(Some(cached)) = self.cache.get::<TherapyListing>(&cache_key).await {
            return Ok(Sourced::database(cached));
        }

        let found = match id_or_slug.parse::<i64>() {
            Ok(id) => repo.get_listing(id).await,
            Err(_) => repo.get_listing_by_slug(id_or_slug).await,
        };

        match found {
            Ok(Some(listing)) if listing.therapy.is_visible() => {
                if let Err(e) = self.cache.set(&cache_key, &listing).await {
                    tracing::debug!("Failed to cache therapy listing: {:#}", e);
                }
                Ok(Sourced::database(listing))
            }
            Ok(_) => Err(TherapyServiceError::NotFound(id_or_slug.to_string())),
            Err(e) => {
                tracing::warn!(id_or_slug, "Therapy lookup failed, serving demo data: {:#}", e);
                demo_lookup()
            }
        }
    }

    /// Published listings with the given ids, in that order
    pub async fn featured(&self, ids: &[i64]) -> Sourced<Vec<TherapyListing>> {
        self.list_published(&TherapyFilter::default())
            .await
            .map(|listings| {
                ids.iter()
                    .filter_map(|id| listings.iter().find(|l| l.therapy.id == *id).cloned())
                    .collect()
            })
    }

    // ------------------------------------------------------------------
    // Guide self-service
    // ------------------------------------------------------------------

    /// All of the caller's listings regardless of state
    pub async fn list_own(&self, user: &User) -> Result<Vec<Therapy>, TherapyServiceError> {
        let guide = self.guide_for(user).await?;
        Ok(self
            .repo()?
            .list_by_guide(guide.id)
            .await
            .context("Failed to list guide therapies")?)
    }

    /// Create a listing under the caller's guide profile.
    ///
    /// New listings wait for moderation unless `auto_approve` is set.
    pub async fn create(
        &self,
        user: &User,
        input: TherapyInput,
        auto_approve: bool,
    ) -> Result<Therapy, TherapyServiceError> {
        let repo = self.repo()?;
        let guide = self.guide_for(user).await?;
        let input = self.validate_input(input)?;

        let status = if auto_approve {
            TherapyStatus::Approved
        } else {
            TherapyStatus::Pending
        };
        let base = generate_slug(&input.title);

        for _ in 0..SLUG_ATTEMPTS {
            let slug = unique_slug(&base, "therapy", limits::THERAPY_SLUG, |candidate| {
                let repo = repo.clone();
                async move { repo.slug_exists(&candidate).await }
            })
            .await?;

            match repo.create(&Therapy::new(guide.id, slug, input.clone(), status)).await {
                Ok(therapy) => {
                    tracing::info!(therapy_id = therapy.id, guide_id = guide.id, status = %therapy.status, "Therapy created");
                    self.invalidate_cache().await;
                    return Ok(therapy);
                }
                // Another listing took the slug between the check and the insert
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(e.context("Failed to create therapy").into()),
            }
        }

        Err(anyhow::anyhow!("No free slug for therapy '{}' after {} attempts", input.title, SLUG_ATTEMPTS).into())
    }

    /// Edit a listing; it goes back to the moderation queue
    pub async fn update(
        &self,
        user: &User,
        id: i64,
        input: TherapyInput,
    ) -> Result<Therapy, TherapyServiceError> {
        let repo = self.repo()?;
        let mut therapy = self.owned(user, id).await?;
        let input = self.validate_input(input)?;

        therapy.apply(input);
        let therapy = repo.update(&therapy).await.context("Failed to update therapy")?;

        tracing::info!(therapy_id = id, "Therapy updated, pending review");
        self.invalidate_cache().await;
        Ok(therapy)
    }

    /// Guide-side visibility toggle; does not touch moderation state
    pub async fn set_published(
        &self,
        user: &User,
        id: i64,
        published: bool,
    ) -> Result<Therapy, TherapyServiceError> {
        let repo = self.repo()?;
        self.owned(user, id).await?;

        let therapy = repo
            .set_published(id, published)
            .await
            .context("Failed to update publish flag")?
            .ok_or_else(|| TherapyServiceError::NotFound(id.to_string()))?;

        self.invalidate_cache().await;
        Ok(therapy)
    }

    pub async fn delete(&self, user: &User, id: i64) -> Result<(), TherapyServiceError> {
        let repo = self.repo()?;
        self.owned(user, id).await?;

        repo.delete(id).await.context("Failed to delete therapy")?;

        tracing::info!(therapy_id = id, user_id = user.id, "Therapy deleted");
        self.invalidate_cache().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    pub async fn list_by_status(
        &self,
        status: TherapyStatus,
        params: &ListParams,
    ) -> Result<PagedResult<TherapyListing>, TherapyServiceError> {
        let (items, total) = self
            .repo()?
            .list_by_status(status, params)
            .await
            .context("Failed to list therapies by status")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn approve(&self, id: i64) -> Result<Therapy, TherapyServiceError> {
        self.moderate(id, TherapyStatus::Approved, None).await
    }

    /// Reject with a reason the guide will see
    pub async fn reject(&self, id: i64, reason: &str) -> Result<Therapy, TherapyServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TherapyServiceError::ValidationError(
                "A rejection reason is required".to_string(),
            ));
        }
        if reason.chars().count() > MAX_REASON_CHARS {
            return Err(TherapyServiceError::ValidationError(format!(
                "Rejection reason must be at most {} characters",
                MAX_REASON_CHARS
            )));
        }
        self.moderate(id, TherapyStatus::Rejected, Some(reason)).await
    }

    pub async fn counts(&self) -> Result<StatusCounts, TherapyServiceError> {
        let repo = self.repo()?;
        Ok(StatusCounts {
            pending: repo.count_by_status(TherapyStatus::Pending).await?,
            approved: repo.count_by_status(TherapyStatus::Approved).await?,
            rejected: repo.count_by_status(TherapyStatus::Rejected).await?,
        })
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn repo(&self) -> Result<&Arc<dyn TherapyRepository>, TherapyServiceError> {
        self.repo.as_ref().ok_or(TherapyServiceError::Unavailable)
    }

    async fn moderate(
        &self,
        id: i64,
        status: TherapyStatus,
        reason: Option<&str>,
    ) -> Result<Therapy, TherapyServiceError> {
        let therapy = self
            .repo()?
            .set_status(id, status, reason)
            .await
            .context("Failed to update therapy status")?
            .ok_or_else(|| TherapyServiceError::NotFound(id.to_string()))?;

        tracing::info!(therapy_id = id, status = %status, "Therapy moderated");
        self.invalidate_cache().await;
        Ok(therapy)
    }

    async fn guide_for(&self, user: &User) -> Result<Guide, TherapyServiceError> {
        if !user.is_guide() {
            return Err(TherapyServiceError::Forbidden(
                "Only guides can manage listings".to_string(),
            ));
        }
        let guide_repo = self
            .guide_repo
            .as_ref()
            .ok_or(TherapyServiceError::Unavailable)?;

        guide_repo
            .get_by_user(user.id)
            .await
            .context("Failed to load guide profile")?
            .ok_or(TherapyServiceError::ProfileRequired)
    }

    /// Load a therapy the caller may modify. Admins may modify any listing.
    async fn owned(&self, user: &User, id: i64) -> Result<Therapy, TherapyServiceError> {
        let therapy = self
            .repo()?
            .get_by_id(id)
            .await
            .context("Failed to load therapy")?
            .ok_or_else(|| TherapyServiceError::NotFound(id.to_string()))?;

        if user.is_admin() {
            return Ok(therapy);
        }

        let guide = self.guide_for(user).await?;
        if therapy.guide_id != guide.id {
            return Err(TherapyServiceError::Forbidden(
                "This listing belongs to another guide".to_string(),
            ));
        }
        Ok(therapy)
    }

    fn validate_input(&self, mut input: TherapyInput) -> Result<TherapyInput, TherapyServiceError> {
        let invalid = TherapyServiceError::ValidationError;

        input.title = input.title.trim().to_string();
        input.country = input.country.trim().to_lowercase();
        input.location = input.location.trim().to_string();
        input.duration = input.duration.trim().to_string();
        input.currency = input.currency.trim().to_uppercase();

        if input.title.is_empty() {
            return Err(TherapyServiceError::ValidationError(
                "Title cannot be empty".to_string(),
            ));
        }
        if !self.marketplace.is_country_supported(&input.country) {
            return Err(TherapyServiceError::ValidationError(format!(
                "Unsupported country '{}'; expected one of: {}",
                input.country,
                self.marketplace.countries.join(", ")
            )));
        }
        if !input.base_price.is_finite() || input.base_price < 0.0 {
            return Err(TherapyServiceError::ValidationError(
                "base_price must be a non-negative number".to_string(),
            ));
        }
        if input.currency.is_empty() {
            input.currency = self.marketplace.default_currency.to_uppercase();
        }
        if input.currency.len() != 3 || !input.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(TherapyServiceError::ValidationError(format!(
                "Invalid currency code '{}'",
                input.currency
            )));
        }
        if matches!(input.capacity, Some(c) if c < 1) {
            return Err(TherapyServiceError::ValidationError(
                "capacity must be at least 1".to_string(),
            ));
        }

        check_len("Title", &input.title, limits::TITLE).map_err(invalid)?;
        check_len("Location", &input.location, limits::LOCATION).map_err(invalid)?;
        check_len("Duration", &input.duration, limits::DURATION).map_err(invalid)?;
        if let Some(url) = &input.image_url {
            check_len("Image URL", url, limits::URL).map_err(invalid)?;
        }
        Ok(input)
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_THERAPIES).await {
            tracing::warn!("Failed to invalidate therapy cache: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{SqlxGuideRepository, SqlxTherapyRepository};
    use crate::db::{create_test_pool, migrations, Backend, DynDatabasePool};
    use crate::models::{GuideInput, TherapyType, UserRole};
    use crate::services::catalog::CatalogSource;

    struct Fixture {
        service: TherapyService,
        pool: DynDatabasePool,
        guide_user: User,
        other_user: User,
        admin: User,
    }

    fn user(id: i64, role: UserRole) -> User {
        let mut user = User::new(
            format!("u{}@example.com", id),
            format!("User {}", id),
            "hash".to_string(),
            role,
        );
        user.id = id;
        user
    }

    async fn insert_user(pool: &DynDatabasePool, user: &User) {
        if let Backend::Sqlite(p) = pool.backend() {
            sqlx::query(
                "INSERT INTO users (id, email, name, password_hash, role, status, created_at, updated_at) \
                 VALUES (?, ?, ?, 'hash', ?, 'active', ?, ?)",
            )
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.role.to_string())
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(p)
            .await
            .unwrap();
        }
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let guide_user = user(1, UserRole::Guide);
        let other_user = user(2, UserRole::Guide);
        let admin = user(3, UserRole::Admin);
        for u in [&guide_user, &other_user, &admin] {
            insert_user(&pool, u).await;
        }

        let guides = SqlxGuideRepository::boxed(pool.clone());
        for (u, slug) in [(&guide_user, "luz"), (&other_user, "sol")] {
            guides
                .create(&Guide::new(
                    Some(u.id),
                    slug.to_string(),
                    GuideInput {
                        name: format!("Guide {}", slug),
                        country: "spain".to_string(),
                        ..Default::default()
                    },
                ))
                .await
                .unwrap();
        }

        let service = TherapyService::new(
            SqlxTherapyRepository::boxed(pool.clone()),
            guides,
            Arc::new(Cache::Memory(MemoryCache::new())),
            MarketplaceConfig::default(),
        );

        Fixture {
            service,
            pool,
            guide_user,
            other_user,
            admin,
        }
    }

    fn input(title: &str) -> TherapyInput {
        TherapyInput {
            title: title.to_string(),
            description: "Circle with live music".to_string(),
            therapy_type: TherapyType::Ceremony,
            country: "Spain".to_string(),
            location: "Barcelona".to_string(),
            base_price: 40.0,
            currency: "eur".to_string(),
            duration: "3h".to_string(),
            capacity: Some(12),
            image_url: None,
            is_published: true,
        }
    }

    #[tokio::test]
    async fn test_demo_only_service_filters_demo_catalog() {
        let service = TherapyService::demo_only(
            Arc::new(Cache::Disabled),
            MarketplaceConfig::default(),
        );
        let filter = TherapyFilter::from_query(Some("mexico"), Some("product"), None).unwrap();

        let result = service.list_published(&filter).await;
        assert_eq!(result.source, CatalogSource::Demo);
        assert!(!result.data.is_empty());
        assert!(result.data.iter().all(|l| filter.matches(l)));

        let single = service.get_published("temazcal-tradicional").await.unwrap();
        assert_eq!(single.source, CatalogSource::Demo);
    }

    #[tokio::test]
    async fn test_writes_unavailable_without_database() {
        let service = TherapyService::demo_only(
            Arc::new(Cache::Disabled),
            MarketplaceConfig::default(),
        );
        let result = service.create(&user(1, UserRole::Guide), input("Cacao"), false).await;
        assert!(matches!(result, Err(TherapyServiceError::Unavailable)));
    }

    #[tokio::test]
    async fn test_database_error_falls_back_to_demo() {
        let f = setup().await;
        if let Backend::Sqlite(p) = f.pool.backend() {
            sqlx::query("DROP TABLE reviews").execute(p).await.unwrap();
            sqlx::query("DROP TABLE therapies").execute(p).await.unwrap();
        }

        let result = f.service.list_published(&TherapyFilter::default()).await;
        assert_eq!(result.source, CatalogSource::Demo);
        assert_eq!(result.data.len(), demo::therapies().len());
    }

    #[tokio::test]
    async fn test_create_is_pending_until_approved() {
        let f = setup().await;
        let therapy = f.service.create(&f.guide_user, input("Ceremonia de Cacao"), false).await.unwrap();

        assert_eq!(therapy.status, TherapyStatus::Pending);
        assert_eq!(therapy.slug, "ceremonia-de-cacao");
        assert_eq!(therapy.country, "spain");
        assert_eq!(therapy.currency, "EUR");

        let listed = f.service.list_published(&TherapyFilter::default()).await;
        assert_eq!(listed.source, CatalogSource::Database);
        assert!(listed.data.is_empty());
        assert!(f.service.get_published(&therapy.id.to_string()).await.is_err());

        f.service.approve(therapy.id).await.unwrap();

        let listed = f.service.list_published(&TherapyFilter::default()).await;
        assert_eq!(listed.data.len(), 1);
        assert_eq!(listed.data[0].guide_name, "Guide luz");
        let by_slug = f.service.get_published("ceremonia-de-cacao").await.unwrap();
        assert_eq!(by_slug.data.therapy.id, therapy.id);
    }

    #[tokio::test]
    async fn test_auto_approve_and_unique_slugs() {
        let f = setup().await;
        let a = f.service.create(&f.guide_user, input("Yoga"), true).await.unwrap();
        let b = f.service.create(&f.other_user, input("Yoga"), true).await.unwrap();

        assert_eq!(a.status, TherapyStatus::Approved);
        assert_eq!(a.slug, "yoga");
        assert_eq!(b.slug, "yoga-2");
    }

    #[tokio::test]
    async fn test_input_validation() {
        let f = setup().await;
        let cases = [
            TherapyInput { title: "  ".to_string(), ..input("x") },
            TherapyInput { country: "france".to_string(), ..input("x") },
            TherapyInput { base_price: -1.0, ..input("x") },
            TherapyInput { base_price: f64::NAN, ..input("x") },
            TherapyInput { currency: "euro".to_string(), ..input("x") },
            TherapyInput { capacity: Some(0), ..input("x") },
            TherapyInput { title: "t".repeat(limits::TITLE + 1), ..input("x") },
            TherapyInput { location: "l".repeat(limits::LOCATION + 1), ..input("x") },
            TherapyInput { duration: "d".repeat(limits::DURATION + 1), ..input("x") },
            TherapyInput { image_url: Some("u".repeat(limits::URL + 1)), ..input("x") },
        ];
        for case in cases {
            assert!(matches!(
                f.service.create(&f.guide_user, case, false).await,
                Err(TherapyServiceError::ValidationError(_))
            ));
        }

        let defaulted = f
            .service
            .create(&f.guide_user, TherapyInput { currency: String::new(), ..input("Reiki") }, false)
            .await
            .unwrap();
        assert_eq!(defaulted.currency, "EUR");
    }

    #[tokio::test]
    async fn test_longest_title_still_gets_a_unique_slug() {
        let f = setup().await;
        let title = "ñ".repeat(limits::TITLE - 1);

        let first = f.service.create(&f.guide_user, input(&title), true).await.unwrap();
        let second = f.service.create(&f.guide_user, input(&title), true).await.unwrap();

        assert_eq!(first.title.chars().count(), limits::TITLE - 1);
        assert_eq!(first.slug, "n".repeat(limits::TITLE - 1));
        assert_eq!(second.slug, format!("{}-2", "n".repeat(limits::THERAPY_SLUG - 2)));
        assert_eq!(second.slug.len(), limits::THERAPY_SLUG);
    }

    #[tokio::test]
    async fn test_numeric_title_slug_is_not_an_id() {
        let f = setup().await;
        let therapy = f.service.create(&f.guide_user, input("2025"), true).await.unwrap();
        assert_eq!(therapy.slug, "therapy-2025");

        let by_slug = f.service.get_published("therapy-2025").await.unwrap();
        assert_eq!(by_slug.data.therapy.id, therapy.id);
        let by_id = f.service.get_published(&therapy.id.to_string()).await.unwrap();
        assert_eq!(by_id.data.therapy.slug, "therapy-2025");
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_slugs() {
        let f = setup().await;
        let (a, b) = tokio::join!(
            f.service.create(&f.guide_user, input("Breathwork"), true),
            f.service.create(&f.other_user, input("Breathwork"), true),
        );
        let mut slugs = vec![a.unwrap().slug, b.unwrap().slug];
        slugs.sort();
        assert_eq!(slugs, vec!["breathwork", "breathwork-2"]);
    }

    #[tokio::test]
    async fn test_single_listing_falls_back_to_demo_on_database_error() {
        let f = setup().await;
        if let Backend::Sqlite(p) = f.pool.backend() {
            sqlx::query("DROP TABLE reviews").execute(p).await.unwrap();
            sqlx::query("DROP TABLE therapies").execute(p).await.unwrap();
        }

        let found = f.service.get_published("temazcal-tradicional").await.unwrap();
        assert_eq!(found.source, CatalogSource::Demo);
        assert!(matches!(
            f.service.get_published("not-in-demo").await,
            Err(TherapyServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_user_and_profileless_guide_rejected() {
        let f = setup().await;
        assert!(matches!(
            f.service.create(&user(50, UserRole::User), input("x"), false).await,
            Err(TherapyServiceError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.create(&user(51, UserRole::Guide), input("x"), false).await,
            Err(TherapyServiceError::ProfileRequired)
        ));
    }

    #[tokio::test]
    async fn test_ownership_enforced() {
        let f = setup().await;
        let therapy = f.service.create(&f.guide_user, input("Temazcal"), false).await.unwrap();

        assert!(matches!(
            f.service.update(&f.other_user, therapy.id, input("Mine now")).await,
            Err(TherapyServiceError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.delete(&f.other_user, therapy.id).await,
            Err(TherapyServiceError::Forbidden(_))
        ));

        // Admins may edit any listing
        let edited = f.service.update(&f.admin, therapy.id, input("Temazcal Nocturno")).await.unwrap();
        assert_eq!(edited.title, "Temazcal Nocturno");

        f.service.delete(&f.guide_user, therapy.id).await.unwrap();
        assert!(f.service.list_own(&f.guide_user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_after_rejection_returns_to_pending() {
        let f = setup().await;
        let therapy = f.service.create(&f.guide_user, input("Rapé"), false).await.unwrap();

        let rejected = f.service.reject(therapy.id, "Missing description").await.unwrap();
        assert_eq!(rejected.status, TherapyStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Missing description"));

        let edited = f.service.update(&f.guide_user, therapy.id, input("Rapé ceremonial")).await.unwrap();
        assert_eq!(edited.status, TherapyStatus::Pending);
        assert!(edited.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let f = setup().await;
        let therapy = f.service.create(&f.guide_user, input("Sound bath"), false).await.unwrap();

        assert!(matches!(
            f.service.reject(therapy.id, "   ").await,
            Err(TherapyServiceError::ValidationError(_))
        ));
        assert!(matches!(
            f.service.approve(9999).await,
            Err(TherapyServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unpublish_hides_and_invalidates_cache() {
        let f = setup().await;
        let therapy = f.service.create(&f.guide_user, input("Kambo"), true).await.unwrap();

        // Warm the cache
        assert_eq!(f.service.list_published(&TherapyFilter::default()).await.data.len(), 1);

        let hidden = f.service.set_published(&f.guide_user, therapy.id, false).await.unwrap();
        assert!(!hidden.is_published);
        assert_eq!(hidden.status, TherapyStatus::Approved);
        assert!(f.service.list_published(&TherapyFilter::default()).await.data.is_empty());
    }

    #[tokio::test]
    async fn test_moderation_queue_and_counts() {
        let f = setup().await;
        let first = f.service.create(&f.guide_user, input("One"), false).await.unwrap();
        f.service.create(&f.guide_user, input("Two"), false).await.unwrap();
        f.service.create(&f.other_user, input("Three"), false).await.unwrap();
        f.service.approve(first.id).await.unwrap();

        let queue = f
            .service
            .list_by_status(TherapyStatus::Pending, &ListParams::new(1, 10))
            .await
            .unwrap();
        assert_eq!(queue.total, 2);
        assert_eq!(queue.items[0].therapy.title, "Two");

        let counts = f.service.counts().await.unwrap();
        assert_eq!(counts, StatusCounts { pending: 2, approved: 1, rejected: 0 });
    }

    #[tokio::test]
    async fn test_featured_keeps_requested_order() {
        let f = setup().await;
        let a = f.service.create(&f.guide_user, input("Alpha"), true).await.unwrap();
        let b = f.service.create(&f.guide_user, input("Beta"), true).await.unwrap();

        let featured = f.service.featured(&[b.id, 999, a.id]).await;
        let ids: Vec<i64> = featured.data.iter().map(|l| l.therapy.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }
}
