//! Read access to the Traccar database
//!
//! The exporter only ever issues the three read queries of
//! [`TelemetryStore`]. [`MySqlStore`] runs them over one long-lived
//! connection; tests use an in-memory double.

mod mysql;

#[cfg(test)]
pub(crate) mod memory;

pub use mysql::{MySqlStore, StoreSettings};

use crate::error::Result;
use crate::models::{AttributeDefinition, Device, PositionRecord};

pub use async_trait::async_trait;

/// Trait for the queries the exporter runs against the store
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// All rows of the device table
    async fn load_devices(&self) -> Result<Vec<Device>>;

    /// All computed-attribute definitions, unfiltered
    async fn load_attribute_definitions(&self) -> Result<Vec<AttributeDefinition>>;

    /// Exactly one row per device: the one with the latest server time
    async fn load_latest_positions(&self) -> Result<Vec<PositionRecord>>;

    /// Release the underlying connection
    async fn close(&self);
}
