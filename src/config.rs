//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honoured for local runs.

use std::env;
use std::str::FromStr;

use crate::services::advertisement::AdvertisementFilter;
use crate::services::debounce::DEFAULT_COOLDOWN_SECONDS;

/// Company id the scale normally advertises under.
pub const DEFAULT_MANUFACTURER_ID: u16 = 0xA6C0;

/// Where records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    /// Process memory; contents are lost on restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid {
                var: "STORAGE_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    pub storage_backend: StorageBackend,
    /// GCP project ID (Firestore backend only)
    pub gcp_project_id: String,

    // --- Scale ---
    /// Advertised local name of the scale
    pub scale_name: String,
    /// Company id filter; `None` accepts any
    pub scale_manufacturer_id: Option<u16>,
    pub cooldown_seconds: i64,

    // --- Pipeline ---
    /// Seconds between scheduled batch runs; 0 disables the schedule
    pub etl_interval_seconds: u64,
    pub ingest_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage_backend: StorageBackend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .parse()?;

        let gcp_project_id = match (storage_backend, env::var("GCP_PROJECT_ID")) {
            (_, Ok(id)) => id,
            (StorageBackend::Firestore, Err(_)) => {
                return Err(ConfigError::Missing("GCP_PROJECT_ID"))
            }
            (StorageBackend::Memory, Err(_)) => "local-dev".to_string(),
        };

        let scale_manufacturer_id = match env::var("SCALE_MANUFACTURER_ID") {
            Ok(v) => parse_manufacturer_id(&v)?,
            Err(_) => Some(DEFAULT_MANUFACTURER_ID),
        };

        let config = Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: parse_var("PORT", 8080)?,
            storage_backend,
            gcp_project_id,
            scale_name: env::var("SCALE_NAME").unwrap_or_else(|_| "tzc".to_string()),
            scale_manufacturer_id,
            cooldown_seconds: parse_var("MEASUREMENT_COOLDOWN_SECONDS", DEFAULT_COOLDOWN_SECONDS)?,
            etl_interval_seconds: parse_var("ETL_INTERVAL_SECONDS", 300)?,
            ingest_queue_capacity: parse_var("INGEST_QUEUE_CAPACITY", 1024)?,
        };

        if config.cooldown_seconds < 0 {
            return Err(ConfigError::Invalid {
                var: "MEASUREMENT_COOLDOWN_SECONDS",
                value: config.cooldown_seconds.to_string(),
            });
        }
        if config.ingest_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "INGEST_QUEUE_CAPACITY",
                value: "0".to_string(),
            });
        }

        Ok(config)
    }

    /// Config for tests: in-memory storage, no schedule.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            storage_backend: StorageBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            scale_name: "tzc".to_string(),
            scale_manufacturer_id: None,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            etl_interval_seconds: 0,
            ingest_queue_capacity: 64,
        }
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_seconds)
    }

    pub fn advertisement_filter(&self) -> AdvertisementFilter {
        AdvertisementFilter {
            name: self.scale_name.clone(),
            manufacturer_id: self.scale_manufacturer_id,
        }
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: v }),
        Err(_) => Ok(default),
    }
}

/// Parse a company id: hex with or without `0x`, or `off` to disable the filter.
fn parse_manufacturer_id(raw: &str) -> Result<Option<u16>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u16::from_str_radix(digits, 16)
        .map(Some)
        .map_err(|_| ConfigError::Invalid {
            var: "SCALE_MANUFACTURER_ID",
            value: raw.to_string(),
        })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manufacturer_id() {
        assert_eq!(parse_manufacturer_id("0xA6C0").unwrap(), Some(0xA6C0));
        assert_eq!(parse_manufacturer_id("a6c0").unwrap(), Some(0xA6C0));
        assert_eq!(parse_manufacturer_id("OFF").unwrap(), None);
        assert!(matches!(
            parse_manufacturer_id("0x1FFFF"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!(
            "Memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert_eq!(
            "firestore".parse::<StorageBackend>().unwrap(),
            StorageBackend::Firestore
        );
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_config_from_env() {
        // Only variables no other test touches
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("SCALE_MANUFACTURER_ID", "off");
        env::set_var("ETL_INTERVAL_SECONDS", "0");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.scale_manufacturer_id, None);
        assert_eq!(config.etl_interval_seconds, 0);
        assert_eq!(config.advertisement_filter().manufacturer_id, None);
    }
}
