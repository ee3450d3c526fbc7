//! Data models
//!
//! Database entities (User, Session, Guide, Therapy, Review, LoginLog) and
//! the input/output types built on them.

mod guide;
pub mod limits;
mod login_log;
mod pagination;
mod review;
mod session;
mod therapy;
mod user;

pub use guide::{join_specialties, split_specialties, Guide, GuideInput};
pub use login_log::{LoginLog, NewLoginLog};
pub use pagination::{ListParams, PagedResult};
pub use review::{CreateReviewInput, Review, ReviewSummary, ReviewWithAuthor, MAX_COMMENT_CHARS};
pub use session::Session;
pub use therapy::{Therapy, TherapyInput, TherapyListing, TherapyStatus, TherapyType};
pub use user::{User, UserRole, UserStatus};
