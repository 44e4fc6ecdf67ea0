//! Shared types for the inventory change detector

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Newtype wrapper for camera zone names to provide type safety
///
/// A zone is a named region of the storage space monitored by exactly
/// one camera (e.g. "shelf_1_left", "overhead", "drawer").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the door cycle a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Before,
    After,
}

impl CapturePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapturePhase::Before => "before",
            CapturePhase::After => "after",
        }
    }
}

/// Door sensor status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorStatus {
    Closed,
    Open,
    Unknown,
}

impl DoorStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DoorStatus::Closed => "closed",
            DoorStatus::Open => "open",
            DoorStatus::Unknown => "unknown",
        }
    }
}

/// Event fed into the detector loop
#[derive(Debug, Clone)]
pub struct DetectorEvent {
    pub event_type: EventType,
    pub event_time: u64,
    pub received_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    DoorStateChange(DoorStatus),
}

/// One frame grabbed from a zone camera at a phase trigger.
///
/// Lives only for the duration of the current door cycle; consumed by the
/// differ (or discarded on cycle abort).
pub struct CapturedFrame {
    pub zone: ZoneId,
    pub phase: CapturePhase,
    pub image: GrayImage,
    pub captured_at_ms: u64,
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("zone", &self.zone)
            .field("phase", &self.phase.as_str())
            .field("dimensions", &self.image.dimensions())
            .field("captured_at_ms", &self.captured_at_ms)
            .finish()
    }
}

/// Axis-aligned bounding box in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    fn right(&self) -> u32 {
        self.x + self.width
    }

    fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Intersection area with another box (0 if disjoint)
    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        if x2 <= x1 || y2 <= y1 {
            return 0;
        }
        u64::from(x2 - x1) * u64::from(y2 - y1)
    }

    /// Overlap ratio: intersection area over the smaller box's area
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f32 {
        let min_area = self.area().min(other.area());
        if min_area == 0 {
            return 0.0;
        }
        self.intersection_area(other) as f32 / min_area as f32
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox { x, y, width: right - x, height: bottom - y }
    }
}

/// A candidate rectangular area of pixel difference within one zone.
///
/// Produced by the differ, consumed by the classifier; not persisted
/// beyond the current door cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRegion {
    pub zone: ZoneId,
    pub bbox: BoundingBox,
    /// Mean absolute luminance difference inside the box (0..=255)
    pub delta: f32,
    /// Box area as a fraction of the frame area (0..=1)
    pub relative_size: f32,
}

/// Coarse change label assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeLabel {
    Addition,
    Removal,
    Ambiguous,
}

impl ChangeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeLabel::Addition => "addition",
            ChangeLabel::Removal => "removal",
            ChangeLabel::Ambiguous => "ambiguous",
        }
    }
}

/// A classified, confidence-scored change - the unit handed to the
/// downstream inventory consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub zone: ZoneId,
    pub region: ChangeRegion,
    pub label: ChangeLabel,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_area_and_union() {
        let a = BoundingBox { x: 0, y: 0, width: 10, height: 10 };
        let b = BoundingBox { x: 5, y: 5, width: 10, height: 10 };

        assert_eq!(a.area(), 100);
        assert_eq!(a.intersection_area(&b), 25);

        let u = a.union(&b);
        assert_eq!(u, BoundingBox { x: 0, y: 0, width: 15, height: 15 });
    }

    #[test]
    fn test_bbox_disjoint_overlap_is_zero() {
        let a = BoundingBox { x: 0, y: 0, width: 4, height: 4 };
        let b = BoundingBox { x: 10, y: 10, width: 4, height: 4 };

        assert_eq!(a.intersection_area(&b), 0);
        assert_eq!(a.overlap_ratio(&b), 0.0);
    }

    #[test]
    fn test_bbox_overlap_ratio_uses_smaller_area() {
        let big = BoundingBox { x: 0, y: 0, width: 100, height: 100 };
        let small = BoundingBox { x: 10, y: 10, width: 10, height: 10 };

        // Small box fully contained: ratio relative to its own area
        assert_eq!(small.overlap_ratio(&big), 1.0);
        assert_eq!(big.overlap_ratio(&small), 1.0);
    }

    #[test]
    fn test_label_as_str() {
        assert_eq!(ChangeLabel::Addition.as_str(), "addition");
        assert_eq!(ChangeLabel::Removal.as_str(), "removal");
        assert_eq!(ChangeLabel::Ambiguous.as_str(), "ambiguous");
    }

    #[test]
    fn test_door_status_as_str() {
        assert_eq!(DoorStatus::Closed.as_str(), "closed");
        assert_eq!(DoorStatus::Open.as_str(), "open");
        assert_eq!(DoorStatus::Unknown.as_str(), "unknown");
    }
}
