//! Error types for the exporter.
//!
//! Every failure the poll-transform-publish cycle can hit is a variant of
//! [`ExporterError`]. The scheduler loop decides per variant whether the
//! process, the cycle, the update pass or a single row is affected.

use thiserror::Error;

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Main error type for the exporter.
#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Failed to connect to store at {host}:{port}: {source}")]
    StoreConnection {
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },

    #[error("Store query '{query}' failed: {source}")]
    StoreQuery {
        query: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to decode attributes of device {device_id}: {source}")]
    AttributeDecode {
        device_id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Attribute '{key}' of device {device_id} is not numeric: {value}")]
    NonNumericAttribute {
        device_id: i64,
        key: String,
        value: String,
    },

    #[error("Position references unknown device {device_id}")]
    UnknownDevice { device_id: i64 },

    #[error("Metric registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Invalid attribute pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ExporterError {
    /// Store failures are the only errors that end the cycle before the
    /// update pass runs.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            ExporterError::StoreConnection { .. } | ExporterError::StoreQuery { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_classified() {
        let query = ExporterError::StoreQuery {
            query: "load_devices",
            source: sqlx::Error::PoolClosed,
        };
        assert!(query.is_store_error());
        assert!(query.to_string().contains("load_devices"));

        let unknown = ExporterError::UnknownDevice { device_id: 7 };
        assert!(!unknown.is_store_error());
        assert_eq!(unknown.to_string(), "Position references unknown device 7");
    }
}
