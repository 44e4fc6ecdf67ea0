//! Cycle simulator - drives end-to-end door cycles without hardware
//!
//! Runs the full pipeline (door monitor, capture, differ, classifier,
//! egress) against a simulated door and scripted cameras. Odd cycles
//! stage an item appearing in each zone, even cycles stage it being
//! removed, so both labels show up in the output.

use clap::Parser;
use image::GrayImage;
use shelfwatch::infra::{Config, Metrics};
use shelfwatch::io::{DoorMonitor, SimulatedCamera, SimulatedDoorSensor};
use shelfwatch::services::{CaptureOrchestrator, ChangeDetector, ZoneCamera};
use shelfwatch::domain::types::ZoneId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Shelfwatch cycle simulator
#[derive(Parser, Debug)]
#[command(name = "cyclesim", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Number of door cycles to simulate
    #[arg(long, default_value_t = 2)]
    cycles: u32,

    /// How long the simulated door stays open per cycle (milliseconds)
    #[arg(long, default_value_t = 1000)]
    hold_ms: u64,
}

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;
const BACKGROUND: u8 = 64;
const ITEM_BRIGHTNESS: u8 = 224;

fn flat_frame() -> GrayImage {
    GrayImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, image::Luma([BACKGROUND]))
}

/// Frame with a bright "item" square at a per-zone offset
fn item_frame(zone_index: u32) -> GrayImage {
    let mut img = flat_frame();
    let x0 = 80 + zone_index * 140;
    let y0 = 120;
    for y in y0..y0 + 120 {
        for x in x0..x0 + 120 {
            img.put_pixel(x, y, image::Luma([ITEM_BRIGHTNESS]));
        }
    }
    img
}

/// Script a zone camera: item appears on odd cycles, disappears on even
fn scripted_camera(zone_index: u32, cycles: u32) -> SimulatedCamera {
    let mut frames = Vec::with_capacity(cycles as usize * 2);
    for cycle in 0..cycles {
        if cycle % 2 == 0 {
            frames.push(flat_frame());
            frames.push(item_frame(zone_index));
        } else {
            frames.push(item_frame(zone_index));
            frames.push(flat_frame());
        }
    }
    SimulatedCamera::with_frames(frames)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        cycles = %args.cycles,
        hold_ms = %args.hold_ms,
        zones = %config.zones().len(),
        "cyclesim starting"
    );

    let metrics = Arc::new(Metrics::new());

    // Scripted cameras replace whatever sources the config names; the
    // zone table still controls zone names and count.
    let zones: Vec<ZoneCamera> = config
        .zones()
        .iter()
        .enumerate()
        .map(|(i, spec)| ZoneCamera {
            zone: ZoneId::new(&spec.name),
            camera: Arc::new(scripted_camera(i as u32, args.cycles)),
        })
        .collect();

    let orchestrator = CaptureOrchestrator::new(
        zones,
        Duration::from_millis(config.capture_timeout_ms()),
        metrics.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(64);
    let (report_tx, mut report_rx) = mpsc::channel(16);

    let (door_sensor, door) = SimulatedDoorSensor::new();
    let door_monitor = DoorMonitor::new(Box::new(door_sensor), &config).with_event_tx(event_tx);
    tokio::spawn(door_monitor.run(shutdown_rx));

    let mut detector =
        ChangeDetector::new(&config, orchestrator, metrics.clone()).with_report_tx(report_tx);
    let detector_task = tokio::spawn(async move {
        detector.run(event_rx).await;
    });

    // Door transitions must clear the poll interval and debounce window
    let settle = Duration::from_millis(
        config.door_poll_interval_ms() + config.door_debounce_ms() + 100,
    );
    let hold = settle.max(Duration::from_millis(args.hold_ms));

    for cycle in 0..args.cycles {
        door.set_open();
        tokio::time::sleep(hold).await;
        door.set_closed();

        match tokio::time::timeout(Duration::from_secs(30), report_rx.recv()).await {
            Ok(Some(report)) => {
                info!(
                    cycle = %cycle,
                    cid = %report.cid,
                    records = %report.records.len(),
                    "cycle_report"
                );
                println!("{}", report.to_json());
            }
            Ok(None) => {
                error!("report channel closed before all cycles finished");
                break;
            }
            Err(_) => {
                error!(cycle = %cycle, "timed out waiting for cycle report");
                break;
            }
        }

        // Let the close transition leave the debounce window before reopening
        tokio::time::sleep(settle).await;
    }

    metrics.report().log();

    let _ = shutdown_tx.send(true);
    detector_task.await?;

    info!("cyclesim complete");
    Ok(())
}
