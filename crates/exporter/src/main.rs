//! Traccar exporter - publishes live device telemetry as Prometheus gauges
//!
//! Polls the Traccar database on a fixed interval and serves the latest
//! position and I/O state of every device on `/metrics`.

use anyhow::{anyhow, Result};
use exporter_lib::{
    api,
    health::{components, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
    poller::PollLoopBuilder,
    store::MySqlStore,
    Snapshot,
};
use prometheus::Registry;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting traccar-exporter");

    let config = config::ExporterConfig::load().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;
    info!(
        store = %config.store.endpoint(),
        interval_secs = config.interval.as_secs(),
        "Exporter configured"
    );

    // Device gauges and self-metrics share one registry
    let registry = Registry::new();
    let snapshot = Snapshot::new(registry.clone())?;
    let metrics = ExporterMetrics::new(&registry)?;

    let logger = StructuredLogger::new(config.store.endpoint());
    logger.log_startup(EXPORTER_VERSION, config.interval, config.exporter_port);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::POLLER).await;

    let store = MySqlStore::connect(&config.store).await.map_err(|e| {
        error!(error = %e, "Could not connect to the store");
        e
    })?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), snapshot.clone()));
    let api_handle = tokio::spawn(api::serve(config.exporter_port, app_state));

    let poll_loop = PollLoopBuilder::new()
        .store(Arc::new(store))
        .snapshot(snapshot)
        .metrics(metrics)
        .logger(logger.clone())
        .health(health_registry)
        .interval(config.interval)
        .exit_on_store_error(config.exit_on_store_error)
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let signal_logger = logger.clone();
    tokio::spawn(async move {
        let reason = shutdown_signal().await;
        signal_logger.log_shutdown(reason);
        let _ = shutdown_tx.send(());
    });

    let outcome = tokio::select! {
        result = poll_loop.run(shutdown_rx) => result.map_err(anyhow::Error::from),
        result = api_handle => match result {
            Ok(Ok(())) => Err(anyhow!("HTTP server stopped unexpectedly")),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e.into()),
        },
    };

    match outcome {
        Ok(()) => {
            info!("Exporter stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Exporter terminated");
            Err(e)
        }
    }
}

/// Wait for Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT received",
                _ = term.recv() => "SIGTERM received",
            },
            Err(e) => {
                error!(error = %e, "Could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT received"
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT received"
    }
}
