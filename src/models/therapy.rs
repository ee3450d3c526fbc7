//! Therapy model
//!
//! A therapy is a bookable listing offered by a guide: a ceremony, a
//! therapy session, a product or an event. Listings go through moderation
//! (`status`) and can be hidden by their guide (`is_published`); only
//! approved and published listings are publicly visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Therapy {
    pub id: i64,
    pub guide_id: i64,
    /// URL-friendly identifier (unique)
    pub slug: String,
    pub title: String,
    pub description: String,
    pub therapy_type: TherapyType,
    /// Lowercase country key
    pub country: String,
    pub location: String,
    /// Amount the guide receives, before the marketplace fee
    pub base_price: f64,
    /// ISO 4217 code
    pub currency: String,
    pub duration: String,
    pub capacity: Option<i32>,
    pub image_url: Option<String>,
    /// Guide-controlled visibility toggle
    pub is_published: bool,
    pub status: TherapyStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Therapy {
    /// Build an unsaved listing from guide input
    pub fn new(guide_id: i64, slug: String, input: TherapyInput, status: TherapyStatus) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            guide_id,
            slug,
            title: input.title,
            description: input.description,
            therapy_type: input.therapy_type,
            country: input.country,
            location: input.location,
            base_price: input.base_price,
            currency: input.currency.to_uppercase(),
            duration: input.duration,
            capacity: input.capacity,
            image_url: input.image_url,
            is_published: input.is_published,
            status,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Publicly visible: approved by moderation and published by the guide
    pub fn is_visible(&self) -> bool {
        self.status == TherapyStatus::Approved && self.is_published
    }

    /// Apply an edit. Any edit to a moderated listing sends it back to review.
    pub fn apply(&mut self, input: TherapyInput) {
        self.title = input.title;
        self.description = input.description;
        self.therapy_type = input.therapy_type;
        self.country = input.country;
        self.location = input.location;
        self.base_price = input.base_price;
        self.currency = input.currency.to_uppercase();
        self.duration = input.duration;
        self.capacity = input.capacity;
        self.image_url = input.image_url;
        self.is_published = input.is_published;

        self.status = TherapyStatus::Pending;
        self.rejection_reason = None;
    }
}

/// Listing category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TherapyType {
    Ceremony,
    Therapy,
    Product,
    Event,
}

impl TherapyType {
    pub const ALL: [TherapyType; 4] = [
        TherapyType::Ceremony,
        TherapyType::Therapy,
        TherapyType::Product,
        TherapyType::Event,
    ];
}

impl fmt::Display for TherapyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TherapyType::Ceremony => write!(f, "ceremony"),
            TherapyType::Therapy => write!(f, "therapy"),
            TherapyType::Product => write!(f, "product"),
            TherapyType::Event => write!(f, "event"),
        }
    }
}

impl FromStr for TherapyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ceremony" => Ok(TherapyType::Ceremony),
            "therapy" => Ok(TherapyType::Therapy),
            "product" => Ok(TherapyType::Product),
            "event" => Ok(TherapyType::Event),
            _ => Err(anyhow::anyhow!("Invalid therapy type: {}", s)),
        }
    }
}

/// Moderation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TherapyStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for TherapyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TherapyStatus::Pending => write!(f, "pending"),
            TherapyStatus::Approved => write!(f, "approved"),
            TherapyStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for TherapyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TherapyStatus::Pending),
            "approved" => Ok(TherapyStatus::Approved),
            "rejected" => Ok(TherapyStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid therapy status: {}", s)),
        }
    }
}

/// Fields a guide submits when creating or editing a listing
#[derive(Debug, Clone, Deserialize)]
pub struct TherapyInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub therapy_type: TherapyType,
    pub country: String,
    #[serde(default)]
    pub location: String,
    pub base_price: f64,
    pub currency: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub capacity: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_published")]
    pub is_published: bool,
}

fn default_published() -> bool {
    true
}

/// A therapy joined with the guide fields the catalog shows and searches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapyListing {
    #[serde(flatten)]
    pub therapy: Therapy,
    pub guide_name: String,
    pub guide_slug: String,
    pub guide_verified: bool,
}
