//! Door-cycle model: state machine and the emitted cycle report
//!
//! One door cycle bounds exactly one before/after comparison. All cycle
//! entities (frames, regions, records) live only until the report is
//! emitted; nothing survives past that.

use crate::domain::types::{ChangeRecord, ZoneId};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// State machine value for the cycle in progress.
///
/// Transitions are strictly linear; door signals arriving in the wrong
/// state are rejected by the detector rather than mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    BeforeCapture,
    AwaitingClose,
    AfterCapture,
    Diffing,
    Classifying,
    Emitted,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::BeforeCapture => "before_capture",
            CycleState::AwaitingClose => "awaiting_close",
            CycleState::AfterCapture => "after_capture",
            CycleState::Diffing => "diffing",
            CycleState::Classifying => "classifying",
            CycleState::Emitted => "emitted",
        }
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(&self, next: CycleState) -> bool {
        use CycleState::*;
        matches!(
            (self, next),
            (Idle, BeforeCapture)
                | (BeforeCapture, AwaitingClose)
                | (BeforeCapture, Idle)
                | (AwaitingClose, AfterCapture)
                | (AwaitingClose, Idle)
                | (AfterCapture, Diffing)
                | (Diffing, Classifying)
                | (Classifying, Emitted)
                | (Emitted, Idle)
        )
    }
}

/// Why a zone produced no comparison in this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CameraUnavailable,
    DimensionMismatch,
    MissingFrame,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::CameraUnavailable => "camera_unavailable",
            SkipReason::DimensionMismatch => "dimension_mismatch",
            SkipReason::MissingFrame => "missing_frame",
        }
    }
}

/// Per-zone outcome recorded in the cycle report
#[derive(Debug, Clone, Serialize)]
pub struct ZoneOutcome {
    pub zone: ZoneId,
    /// None means the zone was diffed; Some carries the skip reason
    pub skipped: Option<SkipReason>,
    pub regions: usize,
}

/// Terminal output of one door cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// UUIDv7 cycle ID
    pub cid: String,
    pub opened_at_ms: u64,
    pub closed_at_ms: Option<u64>,
    /// True when the close signal never arrived within the cycle bound
    pub aborted: bool,
    pub zones: Vec<ZoneOutcome>,
    pub records: Vec<ChangeRecord>,
}

impl CycleReport {
    pub fn new(opened_at_ms: u64) -> Self {
        Self {
            cid: new_uuid_v7(),
            opened_at_ms,
            closed_at_ms: None,
            aborted: false,
            zones: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Mark the cycle aborted (timeout); records stay empty
    pub fn abort(&mut self) {
        self.aborted = true;
        self.records.clear();
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_transitions_allowed() {
        use CycleState::*;
        let path = [Idle, BeforeCapture, AwaitingClose, AfterCapture, Diffing, Classifying, Emitted];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(Emitted.can_advance_to(Idle));
    }

    #[test]
    fn test_abort_paths_allowed() {
        // Capture failure and cycle timeout both return to idle
        assert!(CycleState::BeforeCapture.can_advance_to(CycleState::Idle));
        assert!(CycleState::AwaitingClose.can_advance_to(CycleState::Idle));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        use CycleState::*;
        assert!(!Idle.can_advance_to(AfterCapture));
        assert!(!Idle.can_advance_to(Idle));
        assert!(!AwaitingClose.can_advance_to(BeforeCapture));
        assert!(!Diffing.can_advance_to(Idle));
        assert!(!Emitted.can_advance_to(BeforeCapture));
    }

    #[test]
    fn test_report_abort_clears_records() {
        let mut report = CycleReport::new(epoch_ms());
        report.records.push(crate::domain::types::ChangeRecord {
            zone: ZoneId::new("shelf_1_left"),
            region: crate::domain::types::ChangeRegion {
                zone: ZoneId::new("shelf_1_left"),
                bbox: crate::domain::types::BoundingBox { x: 0, y: 0, width: 4, height: 4 },
                delta: 40.0,
                relative_size: 0.1,
            },
            label: crate::domain::types::ChangeLabel::Addition,
            confidence: 0.5,
        });

        report.abort();
        assert!(report.aborted);
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_report_serializes() {
        let report = CycleReport::new(1234);
        let json = report.to_json();
        assert!(json.contains("\"opened_at_ms\":1234"));
        assert!(json.contains("\"aborted\":false"));
    }
}
