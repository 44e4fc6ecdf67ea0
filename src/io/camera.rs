//! Camera source capability trait and its concrete variants
//!
//! Each configured zone owns exactly one camera source; no two zones may
//! share a source. The variant is a configuration-time choice:
//! - `StillCamera` reads the newest image file from a per-zone directory
//!   populated by an external frame grabber (the hardware-facing path)
//! - `SimulatedCamera` serves scripted frames for tests and simulation

use async_trait::async_trait;
use image::GrayImage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Per-zone capture failure. Recorded and recovered by the caller; a
/// single camera failure never aborts the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// Camera failed to open or produced no frame
    Unavailable(String),
    /// Capture did not complete within the bounded timeout
    Timeout,
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::Unavailable(reason) => write!(f, "camera unavailable: {}", reason),
            CameraError::Timeout => write!(f, "capture timed out"),
        }
    }
}

impl std::error::Error for CameraError {}

/// A source of single frames for one zone
#[async_trait]
pub trait CameraSource: Send + Sync {
    /// Grab one grayscale frame within the given timeout
    async fn capture(&self, timeout: Duration) -> Result<GrayImage, CameraError>;
}

/// Reads the newest still image from a directory.
///
/// An external grabber owns the actual video device and drops frames into
/// the directory; this keeps device ownership exclusive per zone.
pub struct StillCamera {
    dir: PathBuf,
}

impl StillCamera {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn newest_image(dir: &Path) -> Result<PathBuf, CameraError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Unavailable(format!("{}: {}", dir.display(), e)))?;

        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                .unwrap_or(false);
            if !is_image {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            match newest {
                Some((ts, _)) if ts >= modified => {}
                _ => newest = Some((modified, path)),
            }
        }

        newest.map(|(_, path)| path).ok_or_else(|| {
            CameraError::Unavailable(format!("no image files in {}", dir.display()))
        })
    }

    fn load_newest(dir: &Path) -> Result<GrayImage, CameraError> {
        let path = Self::newest_image(dir)?;
        let img = image::open(&path)
            .map_err(|e| CameraError::Unavailable(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "still_frame_loaded");
        Ok(img.to_luma8())
    }
}

#[async_trait]
impl CameraSource for StillCamera {
    async fn capture(&self, timeout: Duration) -> Result<GrayImage, CameraError> {
        let dir = self.dir.clone();
        // Decode on the blocking pool; large stills can take a while
        let load = tokio::task::spawn_blocking(move || Self::load_newest(&dir));

        match tokio::time::timeout(timeout, load).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(CameraError::Unavailable(join_err.to_string())),
            Err(_) => Err(CameraError::Timeout),
        }
    }
}

/// Scripted camera for tests and simulation.
///
/// Serves frames from a queue, then from an optional steady fallback
/// frame. An empty source reports `Unavailable`, which is how tests
/// inject per-zone capture failures.
pub struct SimulatedCamera {
    frames: Mutex<VecDeque<GrayImage>>,
    fallback: Option<GrayImage>,
    latency: Duration,
}

impl SimulatedCamera {
    /// Camera that fails every capture
    pub fn unavailable() -> Self {
        Self { frames: Mutex::new(VecDeque::new()), fallback: None, latency: Duration::ZERO }
    }

    /// Camera serving the given frames in order, then failing
    pub fn with_frames(frames: Vec<GrayImage>) -> Self {
        Self { frames: Mutex::new(frames.into()), fallback: None, latency: Duration::ZERO }
    }

    /// Camera serving the same frame forever
    pub fn steady(frame: GrayImage) -> Self {
        Self { frames: Mutex::new(VecDeque::new()), fallback: Some(frame), latency: Duration::ZERO }
    }

    /// Add artificial capture latency (for timeout tests)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_frame(&self, frame: GrayImage) {
        self.frames.lock().push_back(frame);
    }
}

#[async_trait]
impl CameraSource for SimulatedCamera {
    async fn capture(&self, timeout: Duration) -> Result<GrayImage, CameraError> {
        if self.latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(CameraError::Timeout);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let queued = self.frames.lock().pop_front();
        queued
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| CameraError::Unavailable("no scripted frame".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([value]))
    }

    #[tokio::test]
    async fn test_simulated_camera_serves_queue_then_fails() {
        let camera = SimulatedCamera::with_frames(vec![gray(4, 4, 10), gray(4, 4, 20)]);
        let timeout = Duration::from_millis(100);

        let first = camera.capture(timeout).await.unwrap();
        assert_eq!(first.get_pixel(0, 0).0[0], 10);

        let second = camera.capture(timeout).await.unwrap();
        assert_eq!(second.get_pixel(0, 0).0[0], 20);

        assert!(matches!(
            camera.capture(timeout).await,
            Err(CameraError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_simulated_camera_steady_never_runs_out() {
        let camera = SimulatedCamera::steady(gray(4, 4, 128));
        let timeout = Duration::from_millis(100);

        for _ in 0..3 {
            let frame = camera.capture(timeout).await.unwrap();
            assert_eq!(frame.get_pixel(2, 2).0[0], 128);
        }
    }

    #[tokio::test]
    async fn test_simulated_camera_latency_beyond_timeout() {
        let camera = SimulatedCamera::steady(gray(4, 4, 0))
            .with_latency(Duration::from_millis(50));

        let result = camera.capture(Duration::from_millis(5)).await;
        assert_eq!(result.unwrap_err(), CameraError::Timeout);
    }

    #[tokio::test]
    async fn test_still_camera_missing_dir_unavailable() {
        let camera = StillCamera::new("/nonexistent/shelfwatch-frames");
        let result = camera.capture(Duration::from_millis(200)).await;
        assert!(matches!(result, Err(CameraError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_still_camera_picks_newest_file() {
        let dir = tempfile::tempdir().unwrap();

        gray(4, 4, 10).save(dir.path().join("old.png")).unwrap();
        // Ensure distinct mtimes on coarse-grained filesystems
        std::thread::sleep(Duration::from_millis(20));
        gray(4, 4, 200).save(dir.path().join("new.png")).unwrap();

        let camera = StillCamera::new(dir.path());
        let frame = camera.capture(Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame.get_pixel(0, 0).0[0], 200);
    }
}
