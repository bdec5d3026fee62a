//! Traccar telemetry exporter library
//!
//! This crate provides the core functionality for:
//! - Reading device metadata and latest positions from a Traccar database
//! - Projecting them onto labeled Prometheus gauges
//! - Scheduling the poll-transform-publish cycle
//! - Health checks, self-metrics and the scrape endpoint

pub mod api;
pub mod error;
pub mod health;
pub mod metadata;
pub mod models;
pub mod observability;
pub mod poller;
pub mod positions;
pub mod snapshot;
pub mod store;
pub mod updater;

pub use error::{ExporterError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use snapshot::Snapshot;
