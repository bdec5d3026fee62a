//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Prometheus self-metrics (cycle latency, overruns, store errors, skipped rows)
//! - Structured JSON logging with tracing

use crate::error::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::time::Duration;
use tracing::{error, info, warn};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Exporter self-metrics
///
/// Registered into the same registry as the device gauges so a single scrape
/// returns both. Clones share the underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    cycle_duration_seconds: Histogram,
    cycle_overruns: IntCounter,
    store_errors: IntCounter,
    skipped_positions: IntCounter,
    rejected_attributes: IntCounter,
    unknown_device_errors: IntCounter,
    devices_known: IntGauge,
    positions_last_cycle: IntGauge,
}

impl ExporterMetrics {
    /// Create the self-metrics and register them into `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let cycle_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "traccar_exporter_cycle_duration_seconds",
                "Time spent polling the store and updating the snapshot",
            )
            .buckets(CYCLE_BUCKETS.to_vec()),
        )?;
        let cycle_overruns = IntCounter::new(
            "traccar_exporter_cycle_overruns_total",
            "Cycles that took longer than the polling interval",
        )?;
        let store_errors = IntCounter::new(
            "traccar_exporter_store_errors_total",
            "Failed store queries",
        )?;
        let skipped_positions = IntCounter::new(
            "traccar_exporter_skipped_positions_total",
            "Position rows skipped because their attributes could not be decoded",
        )?;
        let rejected_attributes = IntCounter::new(
            "traccar_exporter_rejected_attributes_total",
            "Attributes skipped because their value is not numeric",
        )?;
        let unknown_device_errors = IntCounter::new(
            "traccar_exporter_unknown_device_errors_total",
            "Update passes aborted by a position of an unknown device",
        )?;
        let devices_known = IntGauge::new(
            "traccar_exporter_devices_known",
            "Devices loaded from the store in the last cycle",
        )?;
        let positions_last_cycle = IntGauge::new(
            "traccar_exporter_positions_last_cycle",
            "Latest-position rows loaded in the last cycle",
        )?;

        registry.register(Box::new(cycle_duration_seconds.clone()))?;
        registry.register(Box::new(cycle_overruns.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(skipped_positions.clone()))?;
        registry.register(Box::new(rejected_attributes.clone()))?;
        registry.register(Box::new(unknown_device_errors.clone()))?;
        registry.register(Box::new(devices_known.clone()))?;
        registry.register(Box::new(positions_last_cycle.clone()))?;

        Ok(Self {
            cycle_duration_seconds,
            cycle_overruns,
            store_errors,
            skipped_positions,
            rejected_attributes,
            unknown_device_errors,
            devices_known,
            positions_last_cycle,
        })
    }

    /// Record the duration of one poll-and-update cycle
    pub fn observe_cycle(&self, elapsed: Duration) {
        self.cycle_duration_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn inc_cycle_overruns(&self) {
        self.cycle_overruns.inc();
    }

    pub fn inc_store_errors(&self) {
        self.store_errors.inc();
    }

    pub fn inc_skipped_positions(&self) {
        self.skipped_positions.inc();
    }

    pub fn inc_rejected_attributes(&self) {
        self.rejected_attributes.inc();
    }

    pub fn inc_unknown_device_errors(&self) {
        self.unknown_device_errors.inc();
    }

    /// Update the per-cycle input sizes
    pub fn set_cycle_inputs(&self, devices: usize, positions: usize) {
        self.devices_known.set(devices as i64);
        self.positions_last_cycle.set(positions as i64);
    }

    pub fn cycle_overruns(&self) -> u64 {
        self.cycle_overruns.get()
    }

    pub fn store_errors(&self) -> u64 {
        self.store_errors.get()
    }

    pub fn skipped_positions(&self) -> u64 {
        self.skipped_positions.get()
    }

    pub fn rejected_attributes(&self) -> u64 {
        self.rejected_attributes.get()
    }

    pub fn unknown_device_errors(&self) -> u64 {
        self.unknown_device_errors.get()
    }
}

/// Structured logger for exporter events
///
/// Every record carries an `event` field and the store endpoint so log
/// pipelines can group them per exporter instance.
#[derive(Clone)]
pub struct StructuredLogger {
    store: String,
}

impl StructuredLogger {
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, interval: Duration, exporter_port: u16) {
        info!(
            event = "exporter_started",
            store = %self.store,
            exporter_version = %version,
            interval_ms = interval.as_millis() as u64,
            exporter_port = exporter_port,
            "Traccar exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            store = %self.store,
            reason = %reason,
            "Traccar exporter shutting down"
        );
    }

    /// Log a finished cycle and how long the loop will sleep
    pub fn log_cycle(&self, devices: usize, positions: usize, elapsed: Duration, sleep: Duration) {
        tracing::debug!(
            event = "cycle_completed",
            store = %self.store,
            devices = devices,
            positions = positions,
            elapsed_ms = elapsed.as_millis() as u64,
            sleep_ms = sleep.as_millis() as u64,
            "Cycle finished"
        );
    }

    /// Log a cycle that took longer than the interval
    pub fn log_overrun(&self, elapsed: Duration, interval: Duration) {
        warn!(
            event = "cycle_overrun",
            store = %self.store,
            elapsed_ms = elapsed.as_millis() as u64,
            interval_ms = interval.as_millis() as u64,
            "Execution takes longer than the update interval"
        );
    }

    /// Log a failed store call
    pub fn log_store_error(&self, error: &dyn std::error::Error, fatal: bool) {
        error!(
            event = "store_error",
            store = %self.store,
            fatal = fatal,
            error = %error,
            "Store query failed"
        );
    }

    /// Log a position row dropped during decoding
    pub fn log_position_skipped(&self, device_id: i64, reason: &dyn std::error::Error) {
        warn!(
            event = "position_skipped",
            store = %self.store,
            device_id = device_id,
            reason = %reason,
            "Skipping position row"
        );
    }

    /// Log an update pass aborted by a position without device metadata
    pub fn log_unknown_device(&self, device_id: i64, positions: usize) {
        error!(
            event = "unknown_device",
            store = %self.store,
            device_id = device_id,
            positions = positions,
            "Position references a device missing from tc_devices, aborting update pass"
        );
    }
}
