//! Latest position of every device
//!
//! The store guarantees one row per device. This module decodes each row's
//! attribute JSON in isolation: a row that cannot be decoded is logged and
//! skipped, it never takes the other rows of the cycle down with it.

use crate::error::{ExporterError, Result};
use crate::models::{PositionRecord, PositionSnapshot};
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::store::TelemetryStore;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A decoded row plus the attributes that had to be dropped from it
#[derive(Debug)]
pub struct DecodedPosition {
    pub position: PositionSnapshot,
    pub rejected: Vec<ExporterError>,
}

/// Reads and decodes the latest position rows
#[derive(Clone)]
pub struct PositionReader {
    metrics: ExporterMetrics,
    logger: StructuredLogger,
}

impl PositionReader {
    pub fn new(metrics: ExporterMetrics, logger: StructuredLogger) -> Self {
        Self { metrics, logger }
    }

    /// Load one snapshot per device, skipping rows whose attributes are malformed
    pub async fn load_latest_positions(
        &self,
        store: &dyn TelemetryStore,
    ) -> Result<Vec<PositionSnapshot>> {
        let records = store.load_latest_positions().await?;
        let mut positions = Vec::with_capacity(records.len());

        for record in records {
            let device_id = record.device_id;
            match decode_position(record) {
                Ok(decoded) => {
                    for rejected in &decoded.rejected {
                        warn!(device_id = device_id, error = %rejected, "Dropping attribute");
                        self.metrics.inc_rejected_attributes();
                    }
                    positions.push(decoded.position);
                }
                Err(e) => {
                    self.logger.log_position_skipped(device_id, &e);
                    self.metrics.inc_skipped_positions();
                }
            }
        }

        debug!(count = positions.len(), "Loaded latest positions");
        Ok(positions)
    }
}

/// Decode the attribute JSON of one row
///
/// Numbers are kept as-is and booleans become `1.0`/`0.0`. Any other value is
/// reported in [`DecodedPosition::rejected`] instead of being coerced.
/// Attributes keep the key order of the stored document.
pub fn decode_position(record: PositionRecord) -> Result<DecodedPosition> {
    let (attributes, rejected) = match record.attributes.as_deref() {
        None => (Vec::new(), Vec::new()),
        Some(raw) => decode_attributes(record.device_id, raw)?,
    };

    Ok(DecodedPosition {
        position: PositionSnapshot {
            device_id: record.device_id,
            server_time: record.server_time,
            latitude: record.latitude,
            longitude: record.longitude,
            altitude: record.altitude,
            speed: record.speed,
            course: record.course,
            attributes,
        },
        rejected,
    })
}

fn decode_attributes(
    device_id: i64,
    raw: &str,
) -> Result<(Vec<(String, f64)>, Vec<ExporterError>)> {
    let object: Map<String, Value> = serde_json::from_str(raw)
        .map_err(|source| ExporterError::AttributeDecode { device_id, source })?;

    let mut values = Vec::with_capacity(object.len());
    let mut rejected = Vec::new();

    for (key, value) in object {
        match numeric_value(&value) {
            Some(v) => values.push((key, v)),
            None => rejected.push(ExporterError::NonNumericAttribute {
                device_id,
                key,
                value: value.to_string(),
            }),
        }
    }

    Ok((values, rejected))
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
