//! Shelfwatch - inventory change detection daemon
//!
//! Watches a storage space (fridge, cabinet, stockroom shelf) with fixed
//! cameras and a door sensor. Each door open/close cycle brackets one
//! before/after comparison; detected changes are emitted as classified,
//! confidence-scored records.
//!
//! Module structure:
//! - `domain/` - Core business types (zones, frames, regions, cycle)
//! - `io/` - External interfaces (cameras, door sensor, snapshots, egress)
//! - `services/` - Business logic (detector, capture, differ, classifier)
//! - `infra/` - Infrastructure (config, metrics)

use clap::Parser;
use shelfwatch::infra::{Config, DoorMode, Metrics};
use shelfwatch::io::{DoorMonitor, DoorSignalSource, GpioPinSensor, SimulatedDoorSensor};
use shelfwatch::services::{CaptureOrchestrator, ChangeDetector};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Shelfwatch - camera-based inventory change detector
#[derive(Parser, Debug)]
#[command(name = "shelfwatch", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "shelfwatch starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    let door_mode_str = match config.door_mode() {
        DoorMode::Gpio => "gpio",
        DoorMode::Sim => "sim",
    };
    info!(
        config_file = %config.config_file(),
        zones = %config.zones().len(),
        door_mode = %door_mode_str,
        capture_timeout_ms = %config.capture_timeout_ms(),
        max_open_ms = %config.max_open_ms(),
        diff_threshold = %config.diff_threshold(),
        min_region_area = %config.min_region_area(),
        egress_file = %config.egress_file(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());

    // Event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(1000);

    // Start the door monitor. It owns the only event sender, so detector
    // shutdown follows monitor shutdown through channel closure.
    let door_source: Box<dyn DoorSignalSource> = match config.door_mode() {
        DoorMode::Gpio => Box::new(GpioPinSensor::new(&config)),
        DoorMode::Sim => {
            let (sensor, _handle) = SimulatedDoorSensor::new();
            Box::new(sensor)
        }
    };
    let door_monitor = DoorMonitor::new(door_source, &config).with_event_tx(event_tx);
    let door_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        door_monitor.run(door_shutdown).await;
    });

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let summary = metrics_clone.report();
            summary.log();
        }
    });

    // Build the capture and detection pipeline
    let orchestrator = CaptureOrchestrator::from_config(&config, metrics.clone());
    let mut detector = ChangeDetector::new(&config, orchestrator, metrics);
    info!("detector_started");

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run detector - consumes events until channel closes
    detector.run(event_rx).await;

    info!("shelfwatch shutdown complete");
    Ok(())
}
