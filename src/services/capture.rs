//! Capture orchestration - per-zone parallel frame grabs
//!
//! All zone captures within one phase run in parallel, bounded by the
//! zone count, so total phase latency tracks the slowest single camera
//! rather than the sum. A zone whose camera fails is marked unavailable
//! for this cycle and the rest proceed; the only hard failure is zero
//! zones producing a before frame.

use crate::domain::cycle::epoch_ms;
use crate::domain::types::{CapturePhase, CapturedFrame, ZoneId};
use crate::infra::config::{Config, ZoneSource};
use crate::infra::metrics::Metrics;
use crate::io::camera::{CameraSource, SimulatedCamera, StillCamera};
use crate::io::snapshot::SnapshotWriter;
use image::GrayImage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Total capture-subsystem failure for the before phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    NoFramesCaptured,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::NoFramesCaptured => {
                write!(f, "no configured zone produced a before frame")
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// One configured zone bound to its exclusively-owned camera source
pub struct ZoneCamera {
    pub zone: ZoneId,
    pub camera: Arc<dyn CameraSource>,
}

/// Coordinates per-zone captures for the before/after phases
pub struct CaptureOrchestrator {
    zones: Vec<ZoneCamera>,
    timeout: Duration,
    snapshots: Option<SnapshotWriter>,
    metrics: Arc<Metrics>,
}

impl CaptureOrchestrator {
    pub fn new(zones: Vec<ZoneCamera>, timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self { zones, timeout, snapshots: None, metrics }
    }

    /// Build zone cameras from the configured zone table
    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Self {
        let zones = config
            .zones()
            .iter()
            .map(|spec| {
                let camera: Arc<dyn CameraSource> = match &spec.source {
                    ZoneSource::Stills(dir) => Arc::new(StillCamera::new(dir)),
                    // Sim zones serve a flat frame so an idle deployment
                    // produces empty change lists rather than errors
                    ZoneSource::Sim => Arc::new(SimulatedCamera::steady(GrayImage::from_pixel(
                        640,
                        480,
                        image::Luma([128]),
                    ))),
                };
                ZoneCamera { zone: ZoneId::new(&spec.name), camera }
            })
            .collect();

        let mut orchestrator =
            Self::new(zones, Duration::from_millis(config.capture_timeout_ms()), metrics);
        if config.snapshot_enabled() {
            orchestrator = orchestrator.with_snapshots(SnapshotWriter::new(config.snapshot_dir()));
        }
        orchestrator
    }

    /// Enable frame persistence to the snapshot directory
    pub fn with_snapshots(mut self, writer: SnapshotWriter) -> Self {
        self.snapshots = Some(writer);
        self
    }

    /// Zone order as configured (reports iterate in this order)
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        self.zones.iter().map(|z| z.zone.clone()).collect()
    }

    /// Capture the before phase; hard error when every zone fails
    pub async fn begin_before_capture(
        &self,
    ) -> Result<HashMap<ZoneId, CapturedFrame>, CaptureError> {
        let frames = self.capture_phase(CapturePhase::Before).await;
        if frames.is_empty() {
            return Err(CaptureError::NoFramesCaptured);
        }
        Ok(frames)
    }

    /// Capture the after phase; zones that fail are simply absent
    pub async fn begin_after_capture(&self) -> HashMap<ZoneId, CapturedFrame> {
        self.capture_phase(CapturePhase::After).await
    }

    async fn capture_phase(&self, phase: CapturePhase) -> HashMap<ZoneId, CapturedFrame> {
        let phase_start = Instant::now();
        let mut tasks = JoinSet::new();

        for zone_camera in &self.zones {
            let zone = zone_camera.zone.clone();
            let camera = zone_camera.camera.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let start = Instant::now();
                let result = camera.capture(timeout).await;
                (zone, result, start.elapsed())
            });
        }

        let mut frames = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (zone, result, elapsed) = match joined {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, "capture_task_panicked");
                    continue;
                }
            };

            match result {
                Ok(image) => {
                    self.metrics.record_frame_captured(elapsed.as_micros() as u64);
                    let frame =
                        CapturedFrame { zone: zone.clone(), phase, image, captured_at_ms: epoch_ms() };
                    if let Some(ref snapshots) = self.snapshots {
                        snapshots.write(&frame);
                    }
                    frames.insert(zone, frame);
                }
                Err(e) => {
                    self.metrics.record_capture_failure();
                    warn!(
                        zone = %zone,
                        phase = %phase.as_str(),
                        error = %e,
                        "zone_capture_failed"
                    );
                }
            }
        }

        info!(
            phase = %phase.as_str(),
            captured = %frames.len(),
            configured = %self.zones.len(),
            elapsed_ms = %phase_start.elapsed().as_millis(),
            "capture_phase_complete"
        );

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(value: u8) -> GrayImage {
        GrayImage::from_pixel(8, 8, image::Luma([value]))
    }

    fn orchestrator(zones: Vec<ZoneCamera>) -> CaptureOrchestrator {
        CaptureOrchestrator::new(zones, Duration::from_millis(200), Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn test_single_failure_does_not_abort_phase() {
        let zones = vec![
            ZoneCamera {
                zone: ZoneId::new("shelf_1_left"),
                camera: Arc::new(SimulatedCamera::steady(gray(50))),
            },
            ZoneCamera {
                zone: ZoneId::new("shelf_1_right"),
                camera: Arc::new(SimulatedCamera::unavailable()),
            },
            ZoneCamera {
                zone: ZoneId::new("overhead"),
                camera: Arc::new(SimulatedCamera::steady(gray(60))),
            },
        ];

        let frames = orchestrator(zones).begin_before_capture().await.unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.contains_key(&ZoneId::new("shelf_1_left")));
        assert!(!frames.contains_key(&ZoneId::new("shelf_1_right")));
        assert!(frames.contains_key(&ZoneId::new("overhead")));
    }

    #[tokio::test]
    async fn test_all_zones_failing_is_hard_error() {
        let zones = vec![
            ZoneCamera {
                zone: ZoneId::new("shelf_1_left"),
                camera: Arc::new(SimulatedCamera::unavailable()),
            },
            ZoneCamera {
                zone: ZoneId::new("overhead"),
                camera: Arc::new(SimulatedCamera::unavailable()),
            },
        ];

        let result = orchestrator(zones).begin_before_capture().await;
        assert_eq!(result.unwrap_err(), CaptureError::NoFramesCaptured);
    }

    #[tokio::test]
    async fn test_after_phase_allows_empty() {
        let zones = vec![ZoneCamera {
            zone: ZoneId::new("overhead"),
            camera: Arc::new(SimulatedCamera::unavailable()),
        }];

        let frames = orchestrator(zones).begin_after_capture().await;
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_frames_tagged_with_phase() {
        let zones = vec![ZoneCamera {
            zone: ZoneId::new("overhead"),
            camera: Arc::new(SimulatedCamera::with_frames(vec![gray(10), gray(20)])),
        }];
        let orchestrator = orchestrator(zones);

        let before = orchestrator.begin_before_capture().await.unwrap();
        assert_eq!(before[&ZoneId::new("overhead")].phase, CapturePhase::Before);

        let after = orchestrator.begin_after_capture().await;
        assert_eq!(after[&ZoneId::new("overhead")].phase, CapturePhase::After);
    }

    #[tokio::test]
    async fn test_slow_camera_times_out_without_blocking_others() {
        let zones = vec![
            ZoneCamera {
                zone: ZoneId::new("shelf_1_left"),
                camera: Arc::new(SimulatedCamera::steady(gray(50))),
            },
            ZoneCamera {
                zone: ZoneId::new("drawer"),
                camera: Arc::new(
                    SimulatedCamera::steady(gray(70)).with_latency(Duration::from_secs(5)),
                ),
            },
        ];

        let start = Instant::now();
        let frames = orchestrator(zones).begin_before_capture().await.unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames.contains_key(&ZoneId::new("shelf_1_left")));
        // Bounded by the 200ms timeout, not the 5s latency
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
