//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `camera` - Camera source capability trait and its variants
//! - `door` - Door signal source trait and the polling monitor
//! - `snapshot` - Optional frame persistence (PNG snapshots)
//! - `egress` - Cycle report output to file (JSONL format)

pub mod camera;
pub mod door;
pub mod egress;
pub mod snapshot;

// Re-export commonly used types
pub use camera::{CameraError, CameraSource, SimulatedCamera, StillCamera};
pub use door::{DoorMonitor, DoorSignalSource, GpioPinSensor, SimulatedDoorHandle, SimulatedDoorSensor};
pub use egress::CycleEgress;
pub use snapshot::SnapshotWriter;
