//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity.

pub mod guide;
pub mod login_log;
pub mod review;
pub mod session;
pub mod settings;
pub mod therapy;
pub mod user;

pub use guide::{GuideRepository, SqlxGuideRepository};
pub use login_log::{LoginLogRepository, SqlxLoginLogRepository};
pub use review::{ReviewRepository, SqlxReviewRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use settings::{Setting, SettingsRepository, SqlxSettingsRepository};
pub use therapy::{SqlxTherapyRepository, TherapyRepository};
pub use user::{SqlxUserRepository, UserRepository};
