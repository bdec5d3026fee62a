//! Exporter configuration

use anyhow::Result;
use exporter_lib::store::StoreSettings;
use exporter_lib::ExporterError;
use serde::Deserialize;
use std::time::Duration;

/// Settings as they appear in the environment, before validation
#[derive(Debug, Deserialize)]
struct RawConfig {
    db_host: Option<String>,
    /// MySQL port
    #[serde(default = "default_db_port")]
    db_port: u16,
    db_database: Option<String>,
    db_username: Option<String>,
    db_password: Option<String>,

    /// Port of the metrics endpoint
    #[serde(default = "default_exporter_port")]
    exporter_port: u16,

    /// Polling interval in seconds
    #[serde(default = "default_interval")]
    interval: u64,

    /// Terminate on store errors instead of retrying next cycle
    #[serde(default = "default_exit_on_store_error")]
    exit_on_store_error: bool,
}

fn default_db_port() -> u16 {
    3306
}

fn default_exporter_port() -> u16 {
    8080
}

fn default_interval() -> u64 {
    60
}

fn default_exit_on_store_error() -> bool {
    true
}

/// Validated, immutable exporter configuration
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub store: StoreSettings,
    pub exporter_port: u16,
    pub interval: Duration,
    pub exit_on_store_error: bool,
}

impl ExporterConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        Ok(Self::from_source(source)?)
    }

    fn from_source(source: config::Config) -> Result<Self, ExporterError> {
        let raw: RawConfig = source
            .try_deserialize()
            .map_err(|e| ExporterError::Config {
                reason: e.to_string(),
            })?;

        if raw.interval == 0 {
            return Err(ExporterError::Config {
                reason: "INTERVAL must be at least 1 second".to_string(),
            });
        }

        Ok(Self {
            store: StoreSettings {
                host: required(raw.db_host, "DB_HOST")?,
                port: raw.db_port,
                database: required(raw.db_database, "DB_DATABASE")?,
                username: required(raw.db_username, "DB_USERNAME")?,
                password: required(raw.db_password, "DB_PASSWORD")?,
            },
            exporter_port: raw.exporter_port,
            interval: Duration::from_secs(raw.interval),
            exit_on_store_error: raw.exit_on_store_error,
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, ExporterError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ExporterError::Config {
            reason: format!("Missing environment variable: {}", name),
        })
}
