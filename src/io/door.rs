//! Door signal monitoring
//!
//! A `DoorMonitor` polls a `DoorSignalSource` and emits debounced
//! open/close transition events into the detector channel. The source is
//! a configuration-time choice: a sysfs GPIO reed-switch pin (hardware)
//! or a shared-state simulated sensor (tests, simulation).

use crate::domain::cycle::epoch_ms;
use crate::domain::types::{DetectorEvent, DoorStatus, EventType};
use crate::infra::config::Config;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// A source of door state readings
#[async_trait]
pub trait DoorSignalSource: Send + Sync {
    async fn read_status(&self) -> DoorStatus;
}

/// Reads a reed-switch pin exported via sysfs.
///
/// Pin semantics: LOW (0) = door open, HIGH (1) = door closed
/// (magnetic reed switch with pull-up).
pub struct GpioPinSensor {
    value_path: PathBuf,
}

impl GpioPinSensor {
    pub fn new(config: &Config) -> Self {
        Self { value_path: PathBuf::from(config.gpio_value_path()) }
    }
}

#[async_trait]
impl DoorSignalSource for GpioPinSensor {
    async fn read_status(&self) -> DoorStatus {
        match tokio::fs::read_to_string(&self.value_path).await {
            Ok(raw) => match raw.trim() {
                "0" => DoorStatus::Open,
                "1" => DoorStatus::Closed,
                other => {
                    warn!(value = %other, path = %self.value_path.display(), "gpio_unexpected_value");
                    DoorStatus::Unknown
                }
            },
            Err(e) => {
                warn!(error = %e, path = %self.value_path.display(), "gpio_read_failed");
                DoorStatus::Unknown
            }
        }
    }
}

/// Simulated door sensor driven through a shared handle
pub struct SimulatedDoorSensor {
    state: Arc<Mutex<DoorStatus>>,
}

/// Cloneable handle for flipping the simulated door state
#[derive(Clone)]
pub struct SimulatedDoorHandle {
    state: Arc<Mutex<DoorStatus>>,
}

impl SimulatedDoorSensor {
    pub fn new() -> (Self, SimulatedDoorHandle) {
        let state = Arc::new(Mutex::new(DoorStatus::Closed));
        (Self { state: state.clone() }, SimulatedDoorHandle { state })
    }
}

impl SimulatedDoorHandle {
    pub fn set_open(&self) {
        *self.state.lock() = DoorStatus::Open;
    }

    pub fn set_closed(&self) {
        *self.state.lock() = DoorStatus::Closed;
    }
}

#[async_trait]
impl DoorSignalSource for SimulatedDoorSensor {
    async fn read_status(&self) -> DoorStatus {
        *self.state.lock()
    }
}

/// Polls the door source and emits debounced transition events
pub struct DoorMonitor {
    source: Box<dyn DoorSignalSource>,
    poll_interval: Duration,
    debounce: Duration,
    last_status: DoorStatus,
    last_transition: Option<Instant>,
    event_tx: Option<mpsc::Sender<DetectorEvent>>,
}

impl DoorMonitor {
    pub fn new(source: Box<dyn DoorSignalSource>, config: &Config) -> Self {
        Self {
            source,
            poll_interval: Duration::from_millis(config.door_poll_interval_ms()),
            debounce: Duration::from_millis(config.door_debounce_ms()),
            last_status: DoorStatus::Unknown,
            last_transition: None,
            event_tx: None,
        }
    }

    /// Set the event sender for door state changes
    pub fn with_event_tx(mut self, tx: mpsc::Sender<DetectorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Handle one reading; returns the event to emit, if any.
    ///
    /// Unknown readings and bouncy transitions inside the debounce window
    /// are dropped.
    fn observe(&mut self, status: DoorStatus, now: Instant) -> Option<DetectorEvent> {
        if status == DoorStatus::Unknown || status == self.last_status {
            return None;
        }

        if let Some(last) = self.last_transition {
            if now.duration_since(last) < self.debounce {
                debug!(
                    status = %status.as_str(),
                    "door_transition_debounced"
                );
                return None;
            }
        }

        self.last_transition = Some(now);
        let previous = self.last_status;
        self.last_status = status;

        info!(
            door = %status.as_str(),
            previous = %previous.as_str(),
            "door_state_changed"
        );

        Some(DetectorEvent {
            event_type: EventType::DoorStateChange(status),
            event_time: epoch_ms(),
            received_at: now,
        })
    }

    /// Start the polling loop
    pub async fn run(mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            poll_interval_ms = %self.poll_interval.as_millis(),
            debounce_ms = %self.debounce.as_millis(),
            "door_monitor_started"
        );

        let mut poll_timer = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("door_monitor_shutdown");
                        return;
                    }
                }
                _ = poll_timer.tick() => {}
            }

            let status = self.source.read_status().await;

            if let Some(event) = self.observe(status, Instant::now()) {
                if let Some(ref tx) = self.event_tx {
                    if let Err(e) = tx.try_send(event) {
                        warn!(error = %e, "failed to send door state event");
                    }
                }
            } else {
                tracing::trace!(door = %status.as_str(), "door_poll");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_with_debounce(debounce_ms: u64) -> DoorMonitor {
        let (sensor, _handle) = SimulatedDoorSensor::new();
        let config = Config::default();
        let mut monitor = DoorMonitor::new(Box::new(sensor), &config);
        monitor.debounce = Duration::from_millis(debounce_ms);
        monitor
    }

    #[test]
    fn test_transition_emits_event() {
        let mut monitor = monitor_with_debounce(0);
        let now = Instant::now();

        let event = monitor.observe(DoorStatus::Open, now).unwrap();
        assert_eq!(event.event_type, EventType::DoorStateChange(DoorStatus::Open));
        assert_eq!(monitor.last_status, DoorStatus::Open);
    }

    #[test]
    fn test_repeated_status_is_silent() {
        let mut monitor = monitor_with_debounce(0);
        let now = Instant::now();

        assert!(monitor.observe(DoorStatus::Open, now).is_some());
        assert!(monitor.observe(DoorStatus::Open, now).is_none());
    }

    #[test]
    fn test_unknown_reading_dropped() {
        let mut monitor = monitor_with_debounce(0);
        assert!(monitor.observe(DoorStatus::Unknown, Instant::now()).is_none());
        assert_eq!(monitor.last_status, DoorStatus::Unknown);
    }

    #[test]
    fn test_bounce_inside_window_dropped() {
        let mut monitor = monitor_with_debounce(500);
        let now = Instant::now();

        assert!(monitor.observe(DoorStatus::Open, now).is_some());
        // Contact bounce 10ms later is ignored; state stays open
        let bounce = now + Duration::from_millis(10);
        assert!(monitor.observe(DoorStatus::Closed, bounce).is_none());
        assert_eq!(monitor.last_status, DoorStatus::Open);

        // Real close after the window is accepted
        let close = now + Duration::from_millis(600);
        assert!(monitor.observe(DoorStatus::Closed, close).is_some());
        assert_eq!(monitor.last_status, DoorStatus::Closed);
    }

    #[tokio::test]
    async fn test_simulated_sensor_handle() {
        let (sensor, handle) = SimulatedDoorSensor::new();
        assert_eq!(sensor.read_status().await, DoorStatus::Closed);

        handle.set_open();
        assert_eq!(sensor.read_status().await, DoorStatus::Open);

        handle.set_closed();
        assert_eq!(sensor.read_status().await, DoorStatus::Closed);
    }
}
