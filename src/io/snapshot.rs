//! Frame snapshot persistence
//!
//! Captured frames are optionally written as PNG files under
//! `<root>/<phase>/<zone>_<timestamp>.png`. This is a logging
//! convenience, not a correctness dependency: write failures are logged
//! and the cycle proceeds.

use crate::domain::types::CapturedFrame;
use chrono::Utc;
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct SnapshotWriter {
    root: PathBuf,
}

impl SnapshotWriter {
    pub fn new(root: &str) -> Self {
        Self { root: PathBuf::from(root) }
    }

    /// Write one frame; returns true if the file landed on disk
    pub fn write(&self, frame: &CapturedFrame) -> bool {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let dir = self.root.join(frame.phase.as_str());
        let path = dir.join(format!("{}_{}.png", frame.zone, timestamp));

        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "snapshot_dir_create_failed");
            return false;
        }

        match frame.image.save(&path) {
            Ok(()) => {
                debug!(path = %path.display(), zone = %frame.zone, "snapshot_written");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot_write_failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cycle::epoch_ms;
    use crate::domain::types::{CapturePhase, ZoneId};
    use image::GrayImage;

    fn frame(zone: &str, phase: CapturePhase) -> CapturedFrame {
        CapturedFrame {
            zone: ZoneId::new(zone),
            phase,
            image: GrayImage::from_pixel(8, 8, image::Luma([42])),
            captured_at_ms: epoch_ms(),
        }
    }

    #[test]
    fn test_write_creates_phase_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path().to_str().unwrap());

        assert!(writer.write(&frame("shelf_1_left", CapturePhase::Before)));
        assert!(writer.write(&frame("shelf_1_left", CapturePhase::After)));

        let before: Vec<_> = std::fs::read_dir(dir.path().join("before")).unwrap().collect();
        let after: Vec<_> = std::fs::read_dir(dir.path().join("after")).unwrap().collect();
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn test_write_failure_is_not_fatal() {
        // Root under a file path cannot be created
        let file = tempfile::NamedTempFile::new().unwrap();
        let bad_root = format!("{}/nested", file.path().display());
        let writer = SnapshotWriter::new(&bad_root);

        assert!(!writer.write(&frame("overhead", CapturePhase::Before)));
    }
}
