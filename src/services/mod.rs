//! Services layer - Business logic
//!
//! Services implement the marketplace rules on top of the repositories:
//! validation, ownership, moderation, cache invalidation and the demo
//! fallback for catalog reads.

pub mod catalog;
pub mod demo;
pub mod guide;
pub mod password;
pub mod pricing;
pub mod rate_limiter;
pub mod review;
pub mod settings;
pub mod slug;
pub mod therapy;
pub mod user;

pub use catalog::{CatalogSource, Sourced, TherapyFilter};
pub use guide::{GuideService, GuideServiceError};
pub use password::{hash_password, verify_password};
pub use pricing::{format_price, PriceCalculator, PriceQuote, PricingError};
pub use rate_limiter::LoginRateLimiter;
pub use review::{ReviewService, ReviewServiceError, TherapyReviews};
pub use settings::{AdminSettings, SettingsService, SettingsServiceError};
pub use slug::generate_slug;
pub use therapy::{StatusCounts, TherapyService, TherapyServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
