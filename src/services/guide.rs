//! Guide service
//!
//! Public guide directory with demo fallback, guide profile self-service
//! and moderator verification.

use crate::cache::{Cache, CacheLayer};
use crate::config::MarketplaceConfig;
use crate::db::is_unique_violation;
use crate::db::repositories::GuideRepository;
use crate::models::limits::{self, check_len};
use crate::models::{Guide, GuideInput, User};
use crate::services::catalog::{normalize, Sourced};
use crate::services::demo;
use crate::services::slug::{generate_slug, unique_slug};
use anyhow::Context;
use std::sync::Arc;

const CACHE_KEY_GUIDES: &str = "guides:list:";
const CACHE_PATTERN_GUIDES: &str = "guides:*";
/// Listings embed guide name and verification
const CACHE_PATTERN_THERAPIES: &str = "therapies:*";
/// Inserts retried after losing a race on the slug
const SLUG_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum GuideServiceError {
    #[error("Guide not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Guide profile already exists")]
    AlreadyExists,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Guide profiles are unavailable without a database")]
    Unavailable,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct GuideService {
    repo: Option<Arc<dyn GuideRepository>>,
    cache: Arc<Cache>,
    marketplace: MarketplaceConfig,
}

impl GuideService {
    pub fn new(
        repo: Arc<dyn GuideRepository>,
        cache: Arc<Cache>,
        marketplace: MarketplaceConfig,
    ) -> Self {
        Self {
            repo: Some(repo),
            cache,
            marketplace,
        }
    }

    pub fn demo_only(cache: Arc<Cache>, marketplace: MarketplaceConfig) -> Self {
        Self {
            repo: None,
            cache,
            marketplace,
        }
    }

    /// Guides, verified first; `None`, blank or `all` lists every country
    pub async fn list(&self, country: Option<&str>) -> Sourced<Vec<Guide>> {
        let country = normalize(country);
        let demo_list = || {
            let guides = demo::guides()
                .into_iter()
                .filter(|g| country.as_deref().map_or(true, |c| g.country == c))
                .collect();
            Sourced::demo(guides)
        };

        let Some(repo) = &self.repo else {
            return demo_list();
        };

        let cache_key = format!("{}{}", CACHE_KEY_GUIDES, country.as_deref().unwrap_or("all"));
        if let Ok(Some(cached)) = self.cache.get::<Vec<Guide>>(&cache_key).await {
            return Sourced::database(cached);
        }

        match repo.list(country.as_deref()).await {
            Ok(guides) => {
                if let Err(e) = self.cache.set(&cache_key, &guides).await {
                    tracing::debug!("Failed to cache guide list: {:#}", e);
                }
                Sourced::database(guides)
            }
            Err(e) => {
                tracing::warn!("Guide query failed, serving demo data: {:#}", e);
                demo_list()
            }
        }
    }

    /// A guide by numeric id or slug
    pub async fn get(&self, id_or_slug: &str) -> Result<Sourced<Guide>, GuideServiceError> {
        let demo_lookup = || {
            demo::find_guide(id_or_slug)
                .map(Sourced::demo)
                .ok_or_else(|| GuideServiceError::NotFound(id_or_slug.to_string()))
        };

        let Some(repo) = &self.repo else {
            return demo_lookup();
        };

        let found = match id_or_slug.parse::<i64>() {
            Ok(id) => repo.get_by_id(id).await,
            Err(_) => repo.get_by_slug(id_or_slug).await,
        };

        match found {
            Ok(Some(guide)) => Ok(Sourced::database(guide)),
            Ok(None) => Err(GuideServiceError::NotFound(id_or_slug.to_string())),
            Err(e) => {
                tracing::warn!(id_or_slug, "Guide lookup failed, serving demo data: {:#}", e);
                demo_lookup()
            }
        }
    }

    /// The caller's own profile
    pub async fn profile(&self, user: &User) -> Result<Guide, GuideServiceError> {
        self.repo()?
            .get_by_user(user.id)
            .await
            .context("Failed to load guide profile")?
            .ok_or_else(|| GuideServiceError::NotFound(format!("profile of user {}", user.id)))
    }

    /// Create the caller's profile; each account has at most one
    pub async fn create_profile(
        &self,
        user: &User,
        input: GuideInput,
    ) -> Result<Guide, GuideServiceError> {
        let repo = self.repo()?;
        if !user.is_guide() {
            return Err(GuideServiceError::Forbidden(
                "Only guide accounts can create a guide profile".to_string(),
            ));
        }
        if repo
            .get_by_user(user.id)
            .await
            .context("Failed to check guide profile")?
            .is_some()
        {
            return Err(GuideServiceError::AlreadyExists);
        }

        let input = self.validate_input(input)?;
        let base = generate_slug(&input.name);

        for _ in 0..SLUG_ATTEMPTS {
            let slug = unique_slug(&base, "guide", limits::GUIDE_SLUG, |candidate| {
                let repo = repo.clone();
                async move { repo.slug_exists(&candidate).await }
            })
            .await?;

            match repo.create(&Guide::new(Some(user.id), slug, input.clone())).await {
                Ok(guide) => {
                    tracing::info!(guide_id = guide.id, user_id = user.id, "Guide profile created");
                    self.invalidate_cache().await;
                    return Ok(guide);
                }
                // Either this account raced itself or the slug was just taken
                Err(e) if is_unique_violation(&e) => {
                    if repo
                        .get_by_user(user.id)
                        .await
                        .context("Failed to check guide profile")?
                        .is_some()
                    {
                        return Err(GuideServiceError::AlreadyExists);
                    }
                }
                Err(e) => return Err(e.context("Failed to create guide profile").into()),
            }
        }

        Err(anyhow::anyhow!("No free slug for guide '{}' after {} attempts", input.name, SLUG_ATTEMPTS).into())
    }

    /// Edit the caller's profile. Slug and verification are kept.
    pub async fn update_profile(
        &self,
        user: &User,
        input: GuideInput,
    ) -> Result<Guide, GuideServiceError> {
        let repo = self.repo()?;
        let mut guide = self.profile(user).await?;
        let input = self.validate_input(input)?;

        guide.apply(input);
        let guide = repo.update(&guide).await.context("Failed to update guide profile")?;

        self.invalidate_cache().await;
        Ok(guide)
    }

    /// Moderator toggle for the verified badge
    pub async fn set_verified(&self, id: i64, verified: bool) -> Result<Guide, GuideServiceError> {
        let guide = self
            .repo()?
            .set_verified(id, verified)
            .await
            .context("Failed to update guide verification")?
            .ok_or_else(|| GuideServiceError::NotFound(id.to_string()))?;

        tracing::info!(guide_id = id, verified, "Guide verification changed");
        self.invalidate_cache().await;
        Ok(guide)
    }

    pub async fn count(&self) -> Result<i64, GuideServiceError> {
        Ok(self.repo()?.count().await.context("Failed to count guides")?)
    }

    fn repo(&self) -> Result<&Arc<dyn GuideRepository>, GuideServiceError> {
        self.repo.as_ref().ok_or(GuideServiceError::Unavailable)
    }

    fn validate_input(&self, mut input: GuideInput) -> Result<GuideInput, GuideServiceError> {
        let invalid = GuideServiceError::ValidationError;

        input.name = input.name.trim().to_string();
        input.country = input.country.trim().to_lowercase();
        input.city = input.city.trim().to_string();
        input.specialties = input
            .specialties
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if input.name.is_empty() {
            return Err(invalid("Name cannot be empty".to_string()));
        }
        if !self.marketplace.is_country_supported(&input.country) {
            return Err(invalid(format!(
                "Unsupported country '{}'; expected one of: {}",
                input.country,
                self.marketplace.countries.join(", ")
            )));
        }
        // Stored comma-separated
        if let Some(bad) = input.specialties.iter().find(|s| s.contains(',')) {
            return Err(invalid(format!("Specialty '{}' cannot contain a comma", bad)));
        }

        check_len("Name", &input.name, limits::GUIDE_NAME).map_err(invalid)?;
        check_len("City", &input.city, limits::CITY).map_err(invalid)?;
        if let Some(url) = &input.photo_url {
            check_len("Photo URL", url, limits::URL).map_err(invalid)?;
        }
        if let Some(whatsapp) = &input.whatsapp {
            check_len("WhatsApp", whatsapp, limits::WHATSAPP).map_err(invalid)?;
        }
        Ok(input)
    }

    async fn invalidate_cache(&self) {
        for pattern in [CACHE_PATTERN_GUIDES, CACHE_PATTERN_THERAPIES] {
            if let Err(e) = self.cache.delete_pattern(pattern).await {
                tracing::warn!(pattern, "Failed to invalidate cache: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations, Backend, DynDatabasePool};
    use crate::models::UserRole;
    use crate::services::catalog::CatalogSource;

    async fn setup_with_pool() -> (GuideService, Arc<dyn UserRepository>, DynDatabasePool) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let service = GuideService::new(
            crate::db::repositories::SqlxGuideRepository::boxed(pool.clone()),
            Arc::new(Cache::Memory(MemoryCache::new())),
            MarketplaceConfig::default(),
        );
        (service, SqlxUserRepository::boxed(pool.clone()), pool)
    }

    async fn setup() -> (GuideService, Arc<dyn UserRepository>) {
        let (service, users, _) = setup_with_pool().await;
        (service, users)
    }

    async fn account(users: &Arc<dyn UserRepository>, email: &str, role: UserRole) -> User {
        users
            .create(&User::new(email.to_string(), "Someone".to_string(), "hash".to_string(), role))
            .await
            .unwrap()
    }

    fn input(name: &str, country: &str) -> GuideInput {
        GuideInput {
            name: name.to_string(),
            bio: "Facilitator".to_string(),
            country: country.to_string(),
            city: "Madrid".to_string(),
            specialties: vec![" cacao ".to_string(), String::new(), "yoga".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_demo_only_lists_demo_guides() {
        let service = GuideService::demo_only(Arc::new(Cache::Disabled), MarketplaceConfig::default());

        let all = service.list(None).await;
        assert_eq!(all.source, CatalogSource::Demo);
        assert_eq!(all.data.len(), demo::guides().len());

        let mexico = service.list(Some("MEXICO")).await;
        assert!(mexico.data.iter().all(|g| g.country == "mexico"));

        assert!(service.get("lucia-mendoza").await.is_ok());
        assert!(matches!(
            service.create_profile(&User::new("a@b.c".into(), "A".into(), "h".into(), UserRole::Guide), input("A", "spain")).await,
            Err(GuideServiceError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_create_profile_once() {
        let (service, users) = setup().await;
        let user = account(&users, "guide@example.com", UserRole::Guide).await;

        let guide = service.create_profile(&user, input("Lucía Mendoza", "Spain")).await.unwrap();
        assert_eq!(guide.slug, "lucia-mendoza");
        assert_eq!(guide.country, "spain");
        assert_eq!(guide.specialties, vec!["cacao", "yoga"]);
        assert!(!guide.verified);

        assert!(matches!(
            service.create_profile(&user, input("Again", "spain")).await,
            Err(GuideServiceError::AlreadyExists)
        ));
        assert_eq!(service.profile(&user).await.unwrap().id, guide.id);
    }

    #[tokio::test]
    async fn test_plain_user_cannot_create_profile() {
        let (service, users) = setup().await;
        let user = account(&users, "user@example.com", UserRole::User).await;
        assert!(matches!(
            service.create_profile(&user, input("X", "spain")).await,
            Err(GuideServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_validation() {
        let (service, users) = setup().await;
        let user = account(&users, "v@example.com", UserRole::Guide).await;

        assert!(matches!(
            service.create_profile(&user, input(" ", "spain")).await,
            Err(GuideServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create_profile(&user, input("Name", "peru")).await,
            Err(GuideServiceError::ValidationError(_))
        ));

        let too_long = [
            GuideInput { name: "n".repeat(limits::GUIDE_NAME + 1), ..input("x", "spain") },
            GuideInput { city: "c".repeat(limits::CITY + 1), ..input("x", "spain") },
            GuideInput { photo_url: Some("u".repeat(limits::URL + 1)), ..input("x", "spain") },
            GuideInput { whatsapp: Some("5".repeat(limits::WHATSAPP + 1)), ..input("x", "spain") },
        ];
        for case in too_long {
            assert!(matches!(
                service.create_profile(&user, case).await,
                Err(GuideServiceError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_specialty_with_comma_is_rejected() {
        let (service, users) = setup().await;
        let user = account(&users, "c@example.com", UserRole::Guide).await;

        let with_comma = GuideInput {
            specialties: vec!["cacao".to_string(), "reiki, yoga".to_string()],
            ..input("Coma", "spain")
        };
        match service.create_profile(&user, with_comma).await {
            Err(GuideServiceError::ValidationError(msg)) => assert!(msg.contains("reiki, yoga")),
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_longest_name_slug_fits_column() {
        let (service, users) = setup().await;
        let a = account(&users, "a@example.com", UserRole::Guide).await;
        let b = account(&users, "b@example.com", UserRole::Guide).await;
        let name = "x".repeat(limits::GUIDE_NAME);

        let first = service.create_profile(&a, input(&name, "spain")).await.unwrap();
        let second = service.create_profile(&b, input(&name, "spain")).await.unwrap();
        assert_eq!(first.slug.len(), limits::GUIDE_SLUG);
        assert_eq!(second.slug, format!("{}-2", "x".repeat(limits::GUIDE_SLUG - 2)));
    }

    #[tokio::test]
    async fn test_concurrent_profile_creation() {
        let (service, users) = setup().await;
        let user = account(&users, "twice@example.com", UserRole::Guide).await;

        let (first, second) = tokio::join!(
            service.create_profile(&user, input("Luz", "spain")),
            service.create_profile(&user, input("Luz", "spain")),
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(GuideServiceError::AlreadyExists))));

        // Different accounts with the same name both get a profile
        let other = account(&users, "other@example.com", UserRole::Guide).await;
        let third = account(&users, "third@example.com", UserRole::Guide).await;
        let (a, b) = tokio::join!(
            service.create_profile(&other, input("Sol", "mexico")),
            service.create_profile(&third, input("Sol", "mexico")),
        );
        let mut slugs = vec![a.unwrap().slug, b.unwrap().slug];
        slugs.sort();
        assert_eq!(slugs, vec!["sol", "sol-2"]);
    }

    #[tokio::test]
    async fn test_directory_falls_back_to_demo_on_database_error() {
        let (service, _, pool) = setup_with_pool().await;
        if let Backend::Sqlite(p) = pool.backend() {
            sqlx::query("DROP TABLE reviews").execute(p).await.unwrap();
            sqlx::query("DROP TABLE therapies").execute(p).await.unwrap();
            sqlx::query("DROP TABLE guides").execute(p).await.unwrap();
        }

        let listed = service.list(Some("mexico")).await;
        assert_eq!(listed.source, CatalogSource::Demo);
        assert!(!listed.data.is_empty());
        assert!(listed.data.iter().all(|g| g.country == "mexico"));

        let found = service.get("lucia-mendoza").await.unwrap();
        assert_eq!(found.source, CatalogSource::Demo);
        assert!(matches!(service.get("nobody").await, Err(GuideServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_keeps_slug_and_verification() {
        let (service, users) = setup().await;
        let user = account(&users, "u@example.com", UserRole::Guide).await;
        let guide = service.create_profile(&user, input("Andrés", "spain")).await.unwrap();
        service.set_verified(guide.id, true).await.unwrap();

        let updated = service.update_profile(&user, input("Andrés Vidal", "mexico")).await.unwrap();
        assert_eq!(updated.slug, "andres");
        assert_eq!(updated.name, "Andrés Vidal");
        assert_eq!(updated.country, "mexico");
        assert!(updated.verified);
    }

    #[tokio::test]
    async fn test_list_and_get_from_database() {
        let (service, users) = setup().await;
        let a = account(&users, "a@example.com", UserRole::Guide).await;
        let b = account(&users, "b@example.com", UserRole::Guide).await;
        service.create_profile(&a, input("Zoe", "spain")).await.unwrap();
        let ana = service.create_profile(&b, input("Ana", "mexico")).await.unwrap();

        let all = service.list(Some("all")).await;
        assert_eq!(all.source, CatalogSource::Database);
        assert_eq!(all.data.len(), 2);

        // Verification moves a guide to the front and invalidates the cache
        let zoe = service.get("zoe").await.unwrap().data;
        service.set_verified(zoe.id, true).await.unwrap();
        assert_eq!(service.list(None).await.data[0].name, "Zoe");

        let spain = service.list(Some("spain")).await;
        assert_eq!(spain.data.len(), 1);

        assert_eq!(service.get(&ana.id.to_string()).await.unwrap().data.slug, "ana");
        assert!(matches!(service.get("nobody").await, Err(GuideServiceError::NotFound(_))));
        assert!(matches!(service.set_verified(999, true).await, Err(GuideServiceError::NotFound(_))));
        assert_eq!(service.count().await.unwrap(), 2);
    }
}
