//! Catalog filtering
//!
//! One predicate decides what a catalog query returns, whether the rows come
//! from the database or from the demo catalog.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::{TherapyListing, TherapyType};

/// Optional predicates over published listings.
///
/// Blank values and the literal `all` mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TherapyFilter {
    pub country: Option<String>,
    pub therapy_type: Option<TherapyType>,
    pub search: Option<String>,
}

impl TherapyFilter {
    /// Build a filter from raw query-string values.
    ///
    /// An unknown type is an error rather than being silently dropped.
    pub fn from_query(
        country: Option<&str>,
        therapy_type: Option<&str>,
        search: Option<&str>,
    ) -> anyhow::Result<Self> {
        let therapy_type = match normalize(therapy_type) {
            Some(t) => Some(TherapyType::from_str(&t)?),
            None => None,
        };
        Ok(Self {
            country: normalize(country),
            therapy_type,
            search: search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase),
        })
    }

    pub fn matches(&self, listing: &TherapyListing) -> bool {
        let therapy = &listing.therapy;

        if let Some(country) = &self.country {
            if !therapy.country.eq_ignore_ascii_case(country) {
                return false;
            }
        }

        if let Some(kind) = self.therapy_type {
            if therapy.therapy_type != kind {
                return false;
            }
        }

        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let hit = [
                &therapy.title,
                &therapy.description,
                &therapy.location,
                &listing.guide_name,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        true
    }

    pub fn apply(&self, listings: Vec<TherapyListing>) -> Vec<TherapyListing> {
        listings.into_iter().filter(|l| self.matches(l)).collect()
    }

    /// Stable cache key for this filter
    pub fn cache_key(&self) -> String {
        format!(
            "therapies:published:{}:{}:{}",
            self.country.as_deref().unwrap_or("all"),
            self.therapy_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "all".to_string()),
            self.search.as_deref().unwrap_or("")
        )
    }
}

/// Where catalog data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSource {
    Database,
    Demo,
}

/// Catalog data tagged with its source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sourced<T> {
    pub data: T,
    pub source: CatalogSource,
}

impl<T> Sourced<T> {
    pub fn database(data: T) -> Self {
        Self {
            data,
            source: CatalogSource::Database,
        }
    }

    pub fn demo(data: T) -> Self {
        Self {
            data,
            source: CatalogSource::Demo,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            data: f(self.data),
            source: self.source,
        }
    }
}

/// Trim and lowercase; blank and `all` become `None`
pub fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty() && v != "all")
}
