//! MySQL-backed store
//!
//! Holds a single connection for the lifetime of the process. There is no
//! pool and no reconnect: a broken connection surfaces as a query error and
//! the scheduler loop decides what to do with it.

use super::{async_trait, TelemetryStore};
use crate::error::{ExporterError, Result};
use crate::models::{AttributeDefinition, Device, PositionRecord};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Row};
use tokio::sync::Mutex;
use tracing::{info, instrument};

const DEVICES_QUERY: &str = "SELECT id, name, uniqueid FROM tc_devices";

const ATTRIBUTES_QUERY: &str = "SELECT attribute, expression FROM tc_attributes";

// ROW_NUMBER keeps exactly one row per device even when two positions share
// the same server time; the higher id wins the tie. Needs MySQL 8.0+ or
// MariaDB 10.2+.
const LATEST_POSITIONS_QUERY: &str = r#"
    SELECT deviceid, servertime, latitude, longitude, altitude, speed, course, attributes
    FROM (
        SELECT deviceid, servertime, latitude, longitude, altitude, speed, course, attributes,
               ROW_NUMBER() OVER (PARTITION BY deviceid ORDER BY servertime DESC, id DESC) AS rn
        FROM tc_positions
    ) ranked
    WHERE rn = 1
"#;

/// Connection parameters for the Traccar database
#[derive(Clone)]
pub struct StoreSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl StoreSettings {
    /// Endpoint description safe to log (no credentials)
    pub fn endpoint(&self) -> String {
        format!("mysql://{}:{}/{}", self.host, self.port, self.database)
    }
}

impl std::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Store reading from a Traccar MySQL database
pub struct MySqlStore {
    conn: Mutex<Option<MySqlConnection>>,
}

impl MySqlStore {
    /// Open the single connection used by every cycle
    #[instrument(skip(settings), fields(endpoint = %settings.endpoint()))]
    pub async fn connect(settings: &StoreSettings) -> Result<Self> {
        info!(
            username = %settings.username,
            "Connecting to {}",
            settings.endpoint()
        );

        let conn = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.username)
            .password(&settings.password)
            .database(&settings.database)
            .connect()
            .await
            .map_err(|source| ExporterError::StoreConnection {
                host: settings.host.clone(),
                port: settings.port,
                source,
            })?;

        info!("Store connection established");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    async fn fetch_all(&self, query: &'static str, name: &'static str) -> Result<Vec<MySqlRow>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(|| ExporterError::StoreQuery {
            query: name,
            source: sqlx::Error::PoolClosed,
        })?;

        sqlx::query(query)
            .fetch_all(conn)
            .await
            .map_err(|source| ExporterError::StoreQuery { query: name, source })
    }
}

#[async_trait]
impl TelemetryStore for MySqlStore {
    async fn load_devices(&self) -> Result<Vec<Device>> {
        let rows = self.fetch_all(DEVICES_QUERY, "load_devices").await?;
        rows.iter()
            .map(|row| row_to_device(row).map_err(|source| query_error("load_devices", source)))
            .collect()
    }

    async fn load_attribute_definitions(&self) -> Result<Vec<AttributeDefinition>> {
        let rows = self
            .fetch_all(ATTRIBUTES_QUERY, "load_attribute_definitions")
            .await?;
        rows.iter()
            .map(|row| {
                row_to_attribute_definition(row)
                    .map_err(|source| query_error("load_attribute_definitions", source))
            })
            .collect()
    }

    async fn load_latest_positions(&self) -> Result<Vec<PositionRecord>> {
        let rows = self
            .fetch_all(LATEST_POSITIONS_QUERY, "load_latest_positions")
            .await?;
        rows.iter()
            .map(|row| {
                row_to_position(row).map_err(|source| query_error("load_latest_positions", source))
            })
            .collect()
    }

    async fn close(&self) {
        if let Some(conn) = self.conn.lock().await.take() {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "Failed to close store connection cleanly");
            } else {
                info!("Store connection closed");
            }
        }
    }
}

fn query_error(query: &'static str, source: sqlx::Error) -> ExporterError {
    ExporterError::StoreQuery { query, source }
}

fn row_to_device(row: &MySqlRow) -> std::result::Result<Device, sqlx::Error> {
    Ok(Device {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        unique_id: row.try_get("uniqueid")?,
    })
}

fn row_to_attribute_definition(
    row: &MySqlRow,
) -> std::result::Result<AttributeDefinition, sqlx::Error> {
    Ok(AttributeDefinition {
        attribute: row.try_get("attribute")?,
        expression: row.try_get("expression")?,
    })
}

fn row_to_position(row: &MySqlRow) -> std::result::Result<PositionRecord, sqlx::Error> {
    Ok(PositionRecord {
        device_id: row.try_get("deviceid")?,
        server_time: row.try_get("servertime")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        altitude: row.try_get("altitude")?,
        speed: row.try_get("speed")?,
        course: row.try_get("course")?,
        attributes: row.try_get("attributes")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> StoreSettings {
        StoreSettings {
            host: "db".to_string(),
            port: 3306,
            database: "traccar".to_string(),
            username: "exporter".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[test]
    fn test_endpoint_omits_credentials() {
        let endpoint = settings().endpoint();
        assert_eq!(endpoint, "mysql://db:3306/traccar");
        assert!(!endpoint.contains("hunter2"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", settings());
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_latest_positions_query_selects_one_row_per_device() {
        assert!(LATEST_POSITIONS_QUERY.contains("PARTITION BY deviceid"));
        assert!(LATEST_POSITIONS_QUERY.contains("ORDER BY servertime DESC"));
        assert!(LATEST_POSITIONS_QUERY.contains("rn = 1"));
    }
}
