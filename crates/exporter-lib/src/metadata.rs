//! Device identity and attribute naming metadata
//!
//! Both tables are re-read every cycle so renamed devices and edited
//! computed attributes show up without a restart.

use crate::error::Result;
use crate::models::{AttributeDefinition, AttributeRenameRules, DeviceMap};
use crate::store::TelemetryStore;
use regex::Regex;
use tracing::debug;

/// Expressions that name a digital/analog I/O channel
const IO_EXPRESSION_PATTERN: &str = r"^io[0-9]+$";

/// Selects the computed attributes that rename a bare I/O channel
#[derive(Debug, Clone)]
pub struct RenameFilter {
    io_expression: Regex,
}

impl RenameFilter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            io_expression: Regex::new(IO_EXPRESSION_PATTERN)?,
        })
    }

    /// Keep only definitions whose expression is a bare I/O channel
    pub fn rules_from(&self, definitions: Vec<AttributeDefinition>) -> AttributeRenameRules {
        definitions
            .into_iter()
            .filter(|d| self.io_expression.is_match(&d.expression))
            .map(|d| (d.expression, d.attribute))
            .collect()
    }
}

/// Load every device keyed by its store id
pub async fn load_devices(store: &dyn TelemetryStore) -> Result<DeviceMap> {
    let devices = store.load_devices().await?;
    debug!(count = devices.len(), "Loaded devices");
    Ok(devices.into_iter().map(|d| (d.id, d)).collect())
}

/// Load the raw key → display key renames for I/O attributes
pub async fn load_attribute_rename_rules(
    store: &dyn TelemetryStore,
    filter: &RenameFilter,
) -> Result<AttributeRenameRules> {
    let definitions = store.load_attribute_definitions().await?;
    let rules = filter.rules_from(definitions);
    debug!(count = rules.len(), "Loaded attribute rename rules");
    Ok(rules)
}
