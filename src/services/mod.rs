//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `detector` - Central event processor and door-cycle state machine
//! - `capture` - Per-zone parallel frame capture orchestration
//! - `differ` - Before/after frame differencing and region extraction
//! - `classifier` - Change labeling and confidence scoring

pub mod capture;
pub mod classifier;
pub mod detector;
pub mod differ;

// Re-export commonly used types
pub use capture::{CaptureError, CaptureOrchestrator, ZoneCamera};
pub use classifier::ChangeClassifier;
pub use detector::ChangeDetector;
pub use differ::{DiffError, FrameDiffer};
