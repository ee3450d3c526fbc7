//! Review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum review comment length, in characters
pub const MAX_COMMENT_CHARS: usize = 2000;

/// A rating left by a user on a therapy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub therapy_id: i64,
    pub user_id: i64,
    /// 1..=5
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(therapy_id: i64, user_id: i64, rating: i32, comment: String) -> Self {
        Self {
            id: 0,
            therapy_id,
            user_id,
            rating,
            comment,
            created_at: Utc::now(),
        }
    }
}

/// Review with the author's display name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewWithAuthor {
    #[serde(flatten)]
    pub review: Review,
    pub author_name: String,
}

/// Aggregate rating for a therapy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ReviewSummary {
    pub count: i64,
    /// Mean rating rounded to one decimal, 0 when there are no reviews
    pub average: f64,
}

impl ReviewSummary {
    pub fn new(count: i64, average: Option<f64>) -> Self {
        let average = match average {
            Some(avg) if count > 0 => (avg * 10.0).round() / 10.0,
            _ => 0.0,
        };
        Self { count, average }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewInput {
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_rounds_average() {
        let summary = ReviewSummary::new(3, Some(4.333333));
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average, 4.3);
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(ReviewSummary::new(0, None), ReviewSummary::default());
        assert_eq!(ReviewSummary::new(0, Some(5.0)).average, 0.0);
    }
}
