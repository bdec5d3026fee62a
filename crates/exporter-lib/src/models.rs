//! Core data models for the exporter

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Device identity row from `tc_devices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub unique_id: String,
}

/// Devices of the current cycle keyed by store id
pub type DeviceMap = HashMap<i64, Device>;

/// Raw attribute key (`io1`) to display key (`ignition`)
pub type AttributeRenameRules = HashMap<String, String>;

/// Most recent position of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub device_id: i64,
    pub server_time: NaiveDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub course: f64,
    /// Numeric attributes in the order they appear in the stored JSON
    pub attributes: Vec<(String, f64)>,
}

/// Computed-attribute row from `tc_attributes`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Name the computed attribute is published under
    pub attribute: String,
    /// Source expression, e.g. `io1`
    pub expression: String,
}

/// Latest `tc_positions` row of one device, attributes still encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub device_id: i64,
    pub server_time: NaiveDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub course: f64,
    pub attributes: Option<String>,
}
