//! Central event processor and door-cycle state machine
//!
//! The ChangeDetector consumes door signals and drives one cycle at a
//! time through capture, diffing and classification:
//!
//! idle → before_capture → awaiting_close → after_capture → diffing →
//! classifying → emitted → idle
//!
//! Door-open while a cycle is active is ignored (no nested cycles);
//! door-close outside awaiting_close is ignored. A cycle left in
//! awaiting_close past the configured bound aborts, discards its before
//! frames and emits an empty change list.

use crate::domain::cycle::{epoch_ms, CycleReport, CycleState, SkipReason, ZoneOutcome};
use crate::domain::types::{
    CapturedFrame, ChangeRecord, ChangeRegion, DetectorEvent, DoorStatus, EventType, ZoneId,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::egress::CycleEgress;
use crate::services::capture::CaptureOrchestrator;
use crate::services::classifier::ChangeClassifier;
use crate::services::differ::FrameDiffer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, trace, warn};

pub struct ChangeDetector {
    orchestrator: CaptureOrchestrator,
    differ: FrameDiffer,
    classifier: ChangeClassifier,
    egress: CycleEgress,
    metrics: Arc<Metrics>,
    /// Optional in-process consumer for emitted cycle reports
    report_tx: Option<mpsc::Sender<CycleReport>>,
    max_open: Duration,
    state: CycleState,
    before_frames: HashMap<ZoneId, CapturedFrame>,
    report: Option<CycleReport>,
    deadline: Option<Instant>,
}

impl ChangeDetector {
    pub fn new(config: &Config, orchestrator: CaptureOrchestrator, metrics: Arc<Metrics>) -> Self {
        Self {
            orchestrator,
            differ: FrameDiffer::from_config(config),
            classifier: ChangeClassifier::from_config(config),
            egress: CycleEgress::new(config.egress_file()),
            metrics,
            report_tx: None,
            max_open: Duration::from_millis(config.max_open_ms()),
            state: CycleState::Idle,
            before_frames: HashMap::new(),
            report: None,
            deadline: None,
        }
    }

    /// Attach a downstream consumer for emitted reports
    pub fn with_report_tx(mut self, tx: mpsc::Sender<CycleReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Start the detector, consuming events from the channel
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<DetectorEvent>) {
        // Coarse tick for the cycle-timeout check
        let mut tick_interval = interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(e) => self.process_event(e).await,
                        None => break, // Channel closed
                    }
                }
                _ = tick_interval.tick() => {
                    self.check_cycle_timeout();
                }
            }
        }
    }

    /// Process a single door event, dispatching on the current state
    pub async fn process_event(&mut self, event: DetectorEvent) {
        match event.event_type {
            EventType::DoorStateChange(DoorStatus::Open) => self.handle_door_open().await,
            EventType::DoorStateChange(DoorStatus::Closed) => self.handle_door_close().await,
            EventType::DoorStateChange(DoorStatus::Unknown) => {}
        }
    }

    async fn handle_door_open(&mut self) {
        if self.state != CycleState::Idle {
            debug!(state = %self.state.as_str(), "door_open_ignored");
            return;
        }

        self.metrics.record_door_open();
        self.metrics.record_cycle_started();
        self.advance(CycleState::BeforeCapture);
        self.report = Some(CycleReport::new(epoch_ms()));

        match self.orchestrator.begin_before_capture().await {
            Ok(frames) => {
                let cid = self.report.as_ref().map(|r| r.cid.clone()).unwrap_or_default();
                info!(
                    cid = %cid,
                    zones_captured = %frames.len(),
                    "cycle_started"
                );
                self.before_frames = frames;
                self.deadline = Some(Instant::now() + self.max_open);
                self.advance(CycleState::AwaitingClose);
            }
            Err(e) => {
                // Total capture-subsystem failure is the one hard error
                error!(error = %e, "before_capture_failed");
                self.abort_cycle("before_capture_failed");
            }
        }
    }

    async fn handle_door_close(&mut self) {
        if self.state != CycleState::AwaitingClose {
            debug!(state = %self.state.as_str(), "door_close_ignored");
            return;
        }

        self.metrics.record_door_close();
        self.advance(CycleState::AfterCapture);
        let after_frames = self.orchestrator.begin_after_capture().await;
        if let Some(report) = self.report.as_mut() {
            report.closed_at_ms = Some(epoch_ms());
        }

        self.advance(CycleState::Diffing);
        let mut zone_regions: Vec<(ZoneId, Vec<ChangeRegion>)> = Vec::new();
        let mut outcomes: Vec<ZoneOutcome> = Vec::new();

        for zone in self.orchestrator.zone_ids() {
            let before = self.before_frames.get(&zone);
            let after = after_frames.get(&zone);

            let (before, after) = match (before, after) {
                (Some(b), Some(a)) => (b, a),
                (None, None) => {
                    outcomes.push(ZoneOutcome {
                        zone,
                        skipped: Some(SkipReason::CameraUnavailable),
                        regions: 0,
                    });
                    continue;
                }
                _ => {
                    // One phase captured, the other did not; no partial diffing
                    outcomes.push(ZoneOutcome {
                        zone,
                        skipped: Some(SkipReason::MissingFrame),
                        regions: 0,
                    });
                    continue;
                }
            };

            match self.differ.diff_pair(&zone, &before.image, &after.image) {
                Ok(regions) => {
                    self.metrics.record_regions(regions.len());
                    outcomes.push(ZoneOutcome { zone: zone.clone(), skipped: None, regions: regions.len() });
                    zone_regions.push((zone, regions));
                }
                Err(e) => {
                    warn!(zone = %zone, error = %e, "zone_diff_skipped");
                    outcomes.push(ZoneOutcome {
                        zone,
                        skipped: Some(SkipReason::DimensionMismatch),
                        regions: 0,
                    });
                }
            }
        }

        self.advance(CycleState::Classifying);
        let mut records: Vec<ChangeRecord> = Vec::new();
        for (zone, regions) in &zone_regions {
            // Both frames exist here; diffing already required the pair
            let (Some(before), Some(after)) = (self.before_frames.get(zone), after_frames.get(zone))
            else {
                continue;
            };
            records.extend(self.classifier.classify_zone(regions, &before.image, &after.image));
        }

        self.advance(CycleState::Emitted);
        self.metrics.record_records_emitted(records.len());
        self.metrics.record_cycle_completed();
        if let Some(report) = self.report.as_mut() {
            report.zones = outcomes;
            report.records = records;
        }
        self.emit_report();

        self.before_frames.clear();
        self.deadline = None;
        self.advance(CycleState::Idle);
    }

    /// Abort the active cycle if the door has stayed open past the bound
    pub fn check_cycle_timeout(&mut self) {
        if self.state != CycleState::AwaitingClose {
            return;
        }
        let Some(deadline) = self.deadline else { return };
        if Instant::now() < deadline {
            return;
        }

        warn!(
            max_open_ms = %self.max_open.as_millis(),
            "cycle_timeout"
        );
        self.abort_cycle("cycle_timeout");
    }

    /// Discard the cycle in progress and return to idle; the aborted
    /// report carries an empty change list.
    fn abort_cycle(&mut self, reason: &str) {
        if let Some(report) = self.report.as_mut() {
            report.abort();
        }
        self.metrics.record_cycle_aborted();
        self.emit_report();

        self.before_frames.clear();
        self.deadline = None;
        info!(reason = %reason, "cycle_aborted");
        self.advance(CycleState::Idle);
    }

    fn emit_report(&mut self) {
        let Some(report) = self.report.take() else { return };

        self.egress.write_report(&report);

        info!(
            cid = %report.cid,
            aborted = %report.aborted,
            zones = %report.zones.len(),
            records = %report.records.len(),
            "cycle_emitted"
        );

        if let Some(ref tx) = self.report_tx {
            if let Err(e) = tx.try_send(report) {
                warn!(error = %e, "failed to send cycle report downstream");
            }
        }
    }

    fn advance(&mut self, next: CycleState) {
        if !self.state.can_advance_to(next) {
            warn!(
                from = %self.state.as_str(),
                to = %next.as_str(),
                "invalid_cycle_transition"
            );
        }
        trace!(from = %self.state.as_str(), to = %next.as_str(), "cycle_state");
        self.state = next;
    }
}
