//! Application service: the frame path.
//!
//! [`AppService`] owns the presence filter, capture gate and presence
//! timer. Each call to [`on_frame`](AppService::on_frame) runs one frame
//! through them and returns at most one command for the actuator worker.
//! It never touches the serial link and never waits on the actuator.
//!
//! ```text
//!  detections ──▶ ┌──────────────────────────┐ ──▶ Option<Command>
//!                 │        AppService        │
//!  ActuatorStatus │ filter · capture · timer │ ──▶ EventSink / TelemetryPort
//!                 └──────────────────────────┘
//! ```

use std::time::Instant;

use log::{debug, info};

use crate::actuator::ActuatorStatus;
use crate::config::SystemConfig;
use crate::presence::capture::CaptureGate;
use crate::presence::filter::PresenceFilter;
use crate::presence::timer::{PresenceTimer, TimerSettings};
use crate::presence::{DetectionSample, PresenceState, TimerPhase};

use super::commands::Command;
use super::events::AppEvent;
use super::ports::{EventSink, TelemetryPort};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService {
    filter: PresenceFilter,
    capture: CaptureGate,
    timer: PresenceTimer,
    frames: u64,
    was_present: bool,
}

impl AppService {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            filter: PresenceFilter::new(&config.detection),
            capture: CaptureGate::new(&config.capture),
            timer: PresenceTimer::new(TimerSettings::from_config(config)),
            frames: 0,
            was_present: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, auto: bool, sink: &mut impl EventSink) {
        info!("AppService started (auto control: {})", auto);
        sink.emit(&AppEvent::Started { auto });
    }

    // ── Per-frame orchestration ───────────────────────────────

    /// Run one frame: filter → telemetry → capture gate → timer.
    pub fn on_frame(
        &mut self,
        detections: &[DetectionSample],
        now: Instant,
        status: &ActuatorStatus,
        telemetry: &impl TelemetryPort,
        sink: &mut impl EventSink,
    ) -> Option<Command> {
        self.frames += 1;

        let present = self.filter.update(detections, now, status.state.is_open);
        let confidence = self.filter.last_confidence();
        if let Some(c) = confidence {
            telemetry.record_detection(c);
        }
        if present != self.was_present {
            debug!(
                "FRAME {}: presence {} (threshold {:.2})",
                self.frames,
                if present { "on" } else { "off" },
                self.filter.effective_threshold(status.state.is_open)
            );
            self.was_present = present;
        }

        if let Some(c) = self.filter.any_confidence() {
            if self.capture.should_capture(Some(c), now) {
                telemetry.record_image_capture();
                sink.emit(&AppEvent::CaptureRequested { confidence: c });
            }
        }

        self.timer.process(present, now, status, confidence)
    }

    /// Tell the timer a command it issued could not be queued.
    pub fn command_dropped(&mut self, cmd: &Command, now: Instant) {
        self.timer.command_dropped(cmd.seq, now);
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn is_present(&self) -> bool {
        self.filter.is_present()
    }

    pub fn presence_state(&self) -> PresenceState {
        self.timer.state()
    }

    pub fn phase(&self, status: &ActuatorStatus) -> TimerPhase {
        self.timer.phase(status)
    }
}
