//! In-memory store used by unit tests

use super::{async_trait, TelemetryStore};
use crate::error::{ExporterError, Result};
use crate::models::{AttributeDefinition, Device, PositionRecord};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Table contents plus knobs for latency and failures
#[derive(Default)]
pub(crate) struct MemoryStore {
    devices: Mutex<Vec<Device>>,
    definitions: Mutex<Vec<AttributeDefinition>>,
    positions: Mutex<Vec<PositionRecord>>,
    latency: Mutex<Duration>,
    fail_positions: AtomicBool,
    cycles: AtomicUsize,
    pub(crate) closed: AtomicBool,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_device(self, id: i64, name: &str, unique_id: &str) -> Self {
        self.devices.lock().unwrap().push(Device {
            id,
            name: name.to_string(),
            unique_id: unique_id.to_string(),
        });
        self
    }

    pub(crate) fn with_definition(self, attribute: &str, expression: &str) -> Self {
        self.definitions.lock().unwrap().push(AttributeDefinition {
            attribute: attribute.to_string(),
            expression: expression.to_string(),
        });
        self
    }

    pub(crate) fn with_position(self, record: PositionRecord) -> Self {
        self.positions.lock().unwrap().push(record);
        self
    }

    /// Simulated duration of the position query
    pub(crate) fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    pub(crate) fn fail_positions(&self, fail: bool) {
        self.fail_positions.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn remove_device(&self, id: i64) {
        self.devices.lock().unwrap().retain(|d| d.id != id);
    }

    pub(crate) fn cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn load_devices(&self) -> Result<Vec<Device>> {
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn load_attribute_definitions(&self) -> Result<Vec<AttributeDefinition>> {
        Ok(self.definitions.lock().unwrap().clone())
    }

    async fn load_latest_positions(&self) -> Result<Vec<PositionRecord>> {
        self.cycles.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.fail_positions.load(Ordering::SeqCst) {
            return Err(ExporterError::StoreQuery {
                query: "load_latest_positions",
                source: sqlx::Error::PoolClosed,
            });
        }

        // Same selection as the SQL query: max server time per device
        let mut latest: HashMap<i64, PositionRecord> = HashMap::new();
        for record in self.positions.lock().unwrap().iter() {
            match latest.get(&record.device_id) {
                Some(current) if current.server_time >= record.server_time => {}
                _ => {
                    latest.insert(record.device_id, record.clone());
                }
            }
        }
        Ok(latest.into_values().collect())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Position record with fixed scalars and the given attributes JSON
pub(crate) fn record(device_id: i64, server_time: &str, attributes: Option<&str>) -> PositionRecord {
    PositionRecord {
        device_id,
        server_time: NaiveDateTime::parse_from_str(server_time, "%Y-%m-%d %H:%M:%S").unwrap(),
        latitude: 10.5,
        longitude: 20.1,
        altitude: 5.0,
        speed: 30.0,
        course: 90.0,
        attributes: attributes.map(str::to_string),
    }
}
