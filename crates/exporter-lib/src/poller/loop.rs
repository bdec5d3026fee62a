//! Scheduler loop
//!
//! Runs one cycle at a time, strictly serially. A cycle that finishes early
//! sleeps for the rest of the interval; a cycle that overruns logs a warning
//! and the next one starts immediately, without any catch-up.

use crate::error::{ExporterError, Result};
use crate::health::{components, HealthRegistry};
use crate::metadata::{self, RenameFilter};
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::positions::PositionReader;
use crate::snapshot::Snapshot;
use crate::store::TelemetryStore;
use crate::updater::SnapshotUpdater;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Configuration for the scheduler loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Target time between cycle starts (default: 60 seconds)
    pub interval: Duration,
    /// Terminate on a failed store query instead of retrying next cycle
    pub exit_on_store_error: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            exit_on_store_error: true,
        }
    }
}

/// Phase of the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Updating,
    Sleeping,
    ShuttingDown,
}

/// What one cycle did and how long the loop should wait afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub devices: usize,
    pub positions: usize,
    pub elapsed: Duration,
    pub sleep: Duration,
    pub overrun: bool,
}

/// Remaining time in the interval, or `None` when the cycle overran it
pub fn sleep_budget(interval: Duration, elapsed: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed)
}

/// Scheduler loop that periodically republishes the latest device state
pub struct PollLoop {
    store: Arc<dyn TelemetryStore>,
    reader: PositionReader,
    rename_filter: RenameFilter,
    updater: SnapshotUpdater,
    metrics: ExporterMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
    config: PollConfig,
    state: PollState,
}

impl PollLoop {
    /// Create a new scheduler loop
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        snapshot: Snapshot,
        metrics: ExporterMetrics,
        logger: StructuredLogger,
        health: HealthRegistry,
        config: PollConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            reader: PositionReader::new(metrics.clone(), logger.clone()),
            rename_filter: RenameFilter::new()?,
            updater: SnapshotUpdater::new(snapshot),
            metrics,
            logger,
            health,
            config,
            state: PollState::Idle,
        })
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Run until `shutdown` fires, then release the store connection
    ///
    /// Returns an error only for a store failure when
    /// [`PollConfig::exit_on_store_error`] is set.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            interval_secs = self.config.interval.as_secs(),
            exit_on_store_error = self.config.exit_on_store_error,
            "Starting poll loop"
        );

        let outcome = loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break Ok(()),
            }

            let started = Instant::now();
            let pause = match self.run_cycle().await {
                Ok(report) => report.sleep,
                Err(e) if e.is_store_error() => {
                    let fatal = self.config.exit_on_store_error;
                    self.metrics.inc_store_errors();
                    self.logger.log_store_error(&e, fatal);
                    self.health
                        .set_unhealthy(components::STORE, e.to_string())
                        .await;
                    if fatal {
                        break Err(e);
                    }
                    self.pause_after(started.elapsed()).0
                }
                Err(e) => break Err(e),
            };

            self.state = PollState::Sleeping;
            if !pause.is_zero() {
                tokio::select! {
                    _ = sleep(pause) => {}
                    _ = shutdown.recv() => break Ok(()),
                }
            }
            self.state = PollState::Idle;
        };

        self.state = PollState::ShuttingDown;
        info!("Shutting down poll loop");
        self.store.close().await;
        outcome
    }

    /// Run a single poll-and-update cycle
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let start = Instant::now();

        self.state = PollState::Polling;
        let store = self.store.as_ref();
        let devices = metadata::load_devices(store).await?;
        let rename_rules =
            metadata::load_attribute_rename_rules(store, &self.rename_filter).await?;
        let positions = self.reader.load_latest_positions(store).await?;
        self.metrics.set_cycle_inputs(devices.len(), positions.len());
        self.health.set_healthy(components::STORE).await;

        self.state = PollState::Updating;
        match self.updater.update(&positions, &devices, &rename_rules) {
            Ok(summary) => {
                debug!(
                    positions = summary.positions,
                    attributes = summary.attributes,
                    "Snapshot updated"
                );
                self.health.set_healthy(components::POLLER).await;
            }
            Err(ExporterError::UnknownDevice { device_id }) => {
                self.metrics.inc_unknown_device_errors();
                self.logger.log_unknown_device(device_id, positions.len());
                self.health
                    .set_degraded(
                        components::POLLER,
                        format!("Position references unknown device {}", device_id),
                    )
                    .await;
            }
            Err(e) => return Err(e),
        }

        self.health.set_ready(true).await;

        let elapsed = start.elapsed();
        self.metrics.observe_cycle(elapsed);

        let (sleep, overrun) = self.pause_after(elapsed);
        self.logger
            .log_cycle(devices.len(), positions.len(), elapsed, sleep);

        Ok(CycleReport {
            devices: devices.len(),
            positions: positions.len(),
            elapsed,
            sleep,
            overrun,
        })
    }

    /// Sleep owed after a cycle that took `elapsed`, and whether it overran
    fn pause_after(&self, elapsed: Duration) -> (Duration, bool) {
        match sleep_budget(self.config.interval, elapsed) {
            Some(remaining) => (remaining, false),
            None => {
                self.logger.log_overrun(elapsed, self.config.interval);
                self.metrics.inc_cycle_overruns();
                (Duration::ZERO, true)
            }
        }
    }
}

/// Builder for creating the scheduler loop
pub struct PollLoopBuilder {
    store: Option<Arc<dyn TelemetryStore>>,
    snapshot: Option<Snapshot>,
    metrics: Option<ExporterMetrics>,
    logger: Option<StructuredLogger>,
    health: HealthRegistry,
    config: PollConfig,
}

impl PollLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            store: None,
            snapshot: None,
            metrics: None,
            logger: None,
            health: HealthRegistry::new(),
            config: PollConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn TelemetryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn metrics(mut self, metrics: ExporterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    /// Set the polling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Choose between terminating and retrying after a store failure
    pub fn exit_on_store_error(mut self, exit: bool) -> Self {
        self.config.exit_on_store_error = exit;
        self
    }

    /// Build the scheduler loop
    pub fn build(self) -> Result<PollLoop> {
        let store = self.store.ok_or_else(|| missing("store"))?;
        let snapshot = self.snapshot.ok_or_else(|| missing("snapshot"))?;
        let metrics = self.metrics.ok_or_else(|| missing("metrics"))?;
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new("unknown"));

        PollLoop::new(
            store,
            snapshot,
            metrics,
            logger,
            self.health,
            self.config,
        )
    }
}

impl Default for PollLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(part: &str) -> ExporterError {
    ExporterError::Config {
        reason: format!("poll loop requires a {}", part),
    }
}
