//! Configuration management
//!
//! Configuration is loaded from a `config.yml` file and then overridden by
//! `PSYCHE_*` environment variables. Missing values fall back to defaults,
//! so an absent or empty file yields a runnable configuration.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Marketplace rules (fee, currency, countries)
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP`.
    /// Only enable behind a reverse proxy that overwrites these headers.
    #[serde(default)]
    pub trust_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            trust_proxy: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite, postgres or none)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// Whether a database has been configured at all
    pub fn is_configured(&self) -> bool {
        self.driver != DatabaseDriver::None && !self.url.trim().is_empty()
    }
}

fn default_database_url() -> String {
    "data/psycheconecta.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// PostgreSQL
    Postgres,
    /// No database: the catalog is served from demo data only
    None,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache driver (memory or none)
    #[serde(default)]
    pub driver: CacheDriver,
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            ttl_seconds: default_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_max_entries() -> u64 {
    1_000
}

/// Cache driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// In-memory cache (default)
    #[default]
    Memory,
    /// Caching disabled
    None,
}

/// Marketplace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Platform fee added on top of the guide's base price, in percent
    #[serde(default = "default_fee_percent")]
    pub fee_percent: f64,
    /// Currency used when a listing does not specify one
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// Countries listings may be published in (lowercase)
    #[serde(default = "default_countries")]
    pub countries: Vec<String>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            fee_percent: default_fee_percent(),
            default_currency: default_currency(),
            countries: default_countries(),
        }
    }
}

impl MarketplaceConfig {
    /// Check if a country is supported (case-insensitive)
    pub fn is_country_supported(&self, country: &str) -> bool {
        let country = country.trim().to_lowercase();
        self.countries.iter().any(|c| c.to_lowercase() == country)
    }
}

fn default_fee_percent() -> f64 {
    25.0
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_countries() -> Vec<String> {
    vec!["spain".to_string(), "mexico".to_string()]
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - PSYCHE_SERVER_HOST, PSYCHE_SERVER_PORT, PSYCHE_SERVER_CORS_ORIGIN
    /// - PSYCHE_SERVER_TRUST_PROXY
    /// - PSYCHE_DATABASE_DRIVER, PSYCHE_DATABASE_URL
    /// - PSYCHE_CACHE_DRIVER, PSYCHE_CACHE_TTL_SECONDS
    /// - PSYCHE_MARKETPLACE_FEE_PERCENT
    /// - PSYCHE_AUTH_SESSION_DAYS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the marketplace misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fee = self.marketplace.fee_percent;
        if !fee.is_finite() || fee < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "marketplace.fee_percent must be a non-negative number, got {}",
                fee
            )));
        }
        if self.marketplace.countries.is_empty() {
            return Err(ConfigError::ValidationError(
                "marketplace.countries must list at least one country".to_string(),
            ));
        }
        if self.auth.session_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_days must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PSYCHE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PSYCHE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("PSYCHE_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(trust) = std::env::var("PSYCHE_SERVER_TRUST_PROXY") {
            match trust.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.server.trust_proxy = true,
                "false" | "0" | "no" => self.server.trust_proxy = false,
                _ => {}
            }
        }

        if let Ok(driver) = std::env::var("PSYCHE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "postgres" | "postgresql" => self.database.driver = DatabaseDriver::Postgres,
                "none" => self.database.driver = DatabaseDriver::None,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("PSYCHE_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(driver) = std::env::var("PSYCHE_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "none" => self.cache.driver = CacheDriver::None,
                _ => {}
            }
        }
        if let Ok(ttl) = std::env::var("PSYCHE_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(fee) = std::env::var("PSYCHE_MARKETPLACE_FEE_PERCENT") {
            if let Ok(fee) = fee.parse::<f64>() {
                if fee.is_finite() && fee >= 0.0 {
                    self.marketplace.fee_percent = fee;
                }
            }
        }

        if let Ok(days) = std::env::var("PSYCHE_AUTH_SESSION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                if days > 0 {
                    self.auth.session_days = days;
                }
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches PSYCHE_* variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "PSYCHE_SERVER_HOST",
    "PSYCHE_SERVER_PORT",
    "PSYCHE_SERVER_CORS_ORIGIN",
    "PSYCHE_SERVER_TRUST_PROXY",
    "PSYCHE_DATABASE_DRIVER",
    "PSYCHE_DATABASE_URL",
    "PSYCHE_CACHE_DRIVER",
    "PSYCHE_CACHE_TTL_SECONDS",
    "PSYCHE_MARKETPLACE_FEE_PERCENT",
    "PSYCHE_AUTH_SESSION_DAYS",
];


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn driver_strategy() -> impl Strategy<Value = DatabaseDriver> {
        prop_oneof![
            Just(DatabaseDriver::Sqlite),
            Just(DatabaseDriver::Postgres),
            Just(DatabaseDriver::None),
        ]
    }

    fn config_strategy() -> impl Strategy<Value = Config> {
        (
            "[a-z][a-z0-9]{0,10}",
            1u16..=65535,
            driver_strategy(),
            0u32..=100,
            prop::collection::vec("[a-z]{3,10}", 1..4),
            1i64..=90,
        )
            .prop_map(|(host, port, driver, fee, countries, session_days)| Config {
                server: ServerConfig {
                    host,
                    port,
                    cors_origin: "http://localhost:5173".to_string(),
                    trust_proxy: false,
                },
                database: DatabaseConfig {
                    driver,
                    ..DatabaseConfig::default()
                },
                cache: CacheConfig::default(),
                marketplace: MarketplaceConfig {
                    fee_percent: fee as f64,
                    default_currency: "EUR".to_string(),
                    countries,
                },
                auth: AuthConfig { session_days },
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serialising a config and loading it back yields the same values.
        #[test]
        fn config_yaml_roundtrip(config in config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(config.server.host, parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.database.driver, parsed.database.driver);
            prop_assert_eq!(config.marketplace.fee_percent, parsed.marketplace.fee_percent);
            prop_assert_eq!(config.marketplace.countries, parsed.marketplace.countries);
            prop_assert_eq!(config.auth.session_days, parsed.auth.session_days);
        }
    }
}
