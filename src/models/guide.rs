//! Guide model
//!
//! A guide is a provider (ceremony facilitator, therapist, vendor) that owns
//! therapy listings. Guides created through self-service are linked to a
//! user account; catalog-only guides have no `user_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub id: i64,
    /// Owning account, if any
    pub user_id: Option<i64>,
    /// URL-friendly identifier (unique)
    pub slug: String,
    pub name: String,
    pub bio: String,
    /// Lowercase country key, one of the configured marketplace countries
    pub country: String,
    pub city: String,
    pub photo_url: Option<String>,
    pub specialties: Vec<String>,
    pub whatsapp: Option<String>,
    /// Set by moderators
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Guide {
    /// Build an unsaved guide from profile input
    pub fn new(user_id: Option<i64>, slug: String, input: GuideInput) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id,
            slug,
            name: input.name,
            bio: input.bio,
            country: input.country,
            city: input.city,
            photo_url: input.photo_url,
            specialties: input.specialties,
            whatsapp: input.whatsapp,
            verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply profile input, keeping identity and moderation fields
    pub fn apply(&mut self, input: GuideInput) {
        self.name = input.name;
        self.bio = input.bio;
        self.country = input.country;
        self.city = input.city;
        self.photo_url = input.photo_url;
        self.specialties = input.specialties;
        self.whatsapp = input.whatsapp;
    }

    /// Whether the given user owns this profile
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == Some(user_id)
    }
}

/// Profile fields a guide can edit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuideInput {
    pub name: String,
    #[serde(default)]
    pub bio: String,
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
}

/// Join specialties for storage in a single column
pub fn join_specialties(specialties: &[String]) -> String {
    specialties
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Split a stored specialties column
pub fn split_specialties(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialties_storage_format() {
        let specialties = vec![
            "ayahuasca".to_string(),
            " ".to_string(),
            " breathwork ".to_string(),
        ];
        let joined = join_specialties(&specialties);
        assert_eq!(joined, "ayahuasca,breathwork");
        assert_eq!(split_specialties(&joined), vec!["ayahuasca", "breathwork"]);
        assert!(split_specialties("").is_empty());
    }

    #[test]
    fn test_apply_keeps_verification() {
        let mut guide = Guide::new(
            Some(3),
            "ana".to_string(),
            GuideInput {
                name: "Ana".to_string(),
                country: "spain".to_string(),
                ..Default::default()
            },
        );
        guide.verified = true;

        guide.apply(GuideInput {
            name: "Ana Maria".to_string(),
            country: "mexico".to_string(),
            ..Default::default()
        });

        assert_eq!(guide.name, "Ana Maria");
        assert_eq!(guide.country, "mexico");
        assert_eq!(guide.slug, "ana");
        assert!(guide.verified);
        assert!(guide.is_owned_by(3));
        assert!(!guide.is_owned_by(4));
    }
}
