//! Admin settings service
//!
//! A typed view over the key/value `settings` table. Missing keys fall
//! back to defaults, so a fresh database behaves like a configured one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::SettingsRepository;

/// Known setting keys
pub mod keys {
    pub const SITE_NAME: &str = "site_name";
    pub const CONTACT_EMAIL: &str = "contact_email";
    pub const CONTACT_WHATSAPP: &str = "contact_whatsapp";
    pub const AUTO_APPROVE_LISTINGS: &str = "auto_approve_listings";
    pub const FEATURED_THERAPY_IDS: &str = "featured_therapy_ids";

    pub const ALL: [&str; 5] = [
        SITE_NAME,
        CONTACT_EMAIL,
        CONTACT_WHATSAPP,
        AUTO_APPROVE_LISTINGS,
        FEATURED_THERAPY_IDS,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSettings {
    pub site_name: String,
    pub contact_email: String,
    pub contact_whatsapp: String,
    /// New guide listings skip the moderation queue
    pub auto_approve_listings: bool,
    pub featured_therapy_ids: Vec<i64>,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            site_name: "PsycheConecta".to_string(),
            contact_email: String::new(),
            contact_whatsapp: String::new(),
            auto_approve_listings: false,
            featured_therapy_ids: Vec::new(),
        }
    }
}

impl AdminSettings {
    fn from_map(map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            site_name: map
                .get(keys::SITE_NAME)
                .cloned()
                .unwrap_or(defaults.site_name),
            contact_email: map
                .get(keys::CONTACT_EMAIL)
                .cloned()
                .unwrap_or(defaults.contact_email),
            contact_whatsapp: map
                .get(keys::CONTACT_WHATSAPP)
                .cloned()
                .unwrap_or(defaults.contact_whatsapp),
            auto_approve_listings: map
                .get(keys::AUTO_APPROVE_LISTINGS)
                .map(|v| v == "true")
                .unwrap_or(defaults.auto_approve_listings),
            featured_therapy_ids: map
                .get(keys::FEATURED_THERAPY_IDS)
                .map(|v| parse_ids(v))
                .unwrap_or(defaults.featured_therapy_ids),
        }
    }

    fn to_map(&self) -> HashMap<String, String> {
        let ids: Vec<String> = self.featured_therapy_ids.iter().map(|id| id.to_string()).collect();

        HashMap::from([
            (keys::SITE_NAME.to_string(), self.site_name.trim().to_string()),
            (keys::CONTACT_EMAIL.to_string(), self.contact_email.trim().to_string()),
            (keys::CONTACT_WHATSAPP.to_string(), self.contact_whatsapp.trim().to_string()),
            (
                keys::AUTO_APPROVE_LISTINGS.to_string(),
                self.auto_approve_listings.to_string(),
            ),
            (keys::FEATURED_THERAPY_IDS.to_string(), ids.join(",")),
        ])
    }

    fn validate(&self) -> Result<(), SettingsServiceError> {
        if self.site_name.trim().is_empty() {
            return Err(SettingsServiceError::InvalidValue(
                "site_name cannot be empty".to_string(),
            ));
        }
        let email = self.contact_email.trim();
        if !email.is_empty() && !email.contains('@') {
            return Err(SettingsServiceError::InvalidValue(format!(
                "contact_email '{}' is not an email address",
                email
            )));
        }
        if self.featured_therapy_ids.iter().any(|id| *id <= 0) {
            return Err(SettingsServiceError::InvalidValue(
                "featured_therapy_ids must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Comma-separated ids; unparseable entries are skipped
fn parse_ids(value: &str) -> Vec<i64> {
    value
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

#[derive(Debug, Error)]
pub enum SettingsServiceError {
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    #[error("Failed to save settings: {0}")]
    SaveError(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_admin_settings(&self) -> Result<AdminSettings, SettingsServiceError> {
        let map = self
            .repo
            .get_many(&keys::ALL)
            .await
            .map_err(|e| SettingsServiceError::LoadError(e.to_string()))?;

        Ok(AdminSettings::from_map(&map))
    }

    /// Validate and persist every field, returning the stored view
    pub async fn update_admin_settings(
        &self,
        settings: &AdminSettings,
    ) -> Result<AdminSettings, SettingsServiceError> {
        settings.validate()?;

        self.repo
            .set_many(&settings.to_map())
            .await
            .map_err(|e| SettingsServiceError::SaveError(e.to_string()))?;

        tracing::info!(
            auto_approve = settings.auto_approve_listings,
            featured = settings.featured_therapy_ids.len(),
            "Admin settings updated"
        );

        self.get_admin_settings().await
    }

    pub async fn auto_approve_listings(&self) -> Result<bool, SettingsServiceError> {
        Ok(self.get_admin_settings().await?.auto_approve_listings)
    }
}
