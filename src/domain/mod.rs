//! Domain models - core types and the door-cycle model
//!
//! This module contains the canonical data types used throughout the system:
//! - `CycleReport` - the terminal output of one door cycle
//! - `CycleState` - the state machine value for the cycle in progress
//! - `CapturedFrame` - one frame grabbed from a zone camera
//! - `ChangeRegion` / `ChangeRecord` - raw and classified change candidates
//! - `DetectorEvent` - door signals fed into the detector loop

pub mod cycle;
pub mod types;
