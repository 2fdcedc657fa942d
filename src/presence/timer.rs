//! Dwell / absence timing: decides *when* to open or close.
//!
//! ```text
//!              present                         dwell ≥ required_detection
//!   AbsentIdle ───────▶ PresentCounting ─────────────────────────────▶ Open
//!        ▲                     │ absent                                  │
//!        │ absence ≥ required  ▼                                         ▼
//!   Close ◀──────────── AbsentCounting ◀────────── absent ──── PresentConfirmed
//! ```
//!
//! Only the null→set assignment of a timer is observable, so flicker within
//! one frame cannot restart a count. An issued command is latched until the
//! opposite condition resets the timers or the worker reports it did not
//! run; after a failure re-emission waits out the command cooldown.

use std::time::{Duration, Instant};

use log::{debug, info};

use super::{PresenceState, TimerPhase};
use crate::actuator::ActuatorStatus;
use crate::app::commands::{Command, CommandKind, Trigger};
use crate::config::SystemConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    pub required_detection: Duration,
    pub required_absence: Duration,
    /// Wait after a failed or skipped command before re-issuing.
    pub retry_after: Duration,
    pub manual_timeout: Option<Duration>,
}

impl TimerSettings {
    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self {
            required_detection: cfg.detection.required_detection(),
            required_absence: cfg.detection.required_no_detection(),
            retry_after: cfg.window.command_cooldown(),
            manual_timeout: cfg.window.manual_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Issued {
    seq: u64,
    kind: CommandKind,
}

pub struct PresenceTimer {
    settings: TimerSettings,
    state: PresenceState,
    issued: Option<Issued>,
    next_seq: u64,
    retry_not_before: Option<Instant>,
}

impl PresenceTimer {
    pub fn new(settings: TimerSettings) -> Self {
        Self {
            settings,
            state: PresenceState::default(),
            issued: None,
            next_seq: 1,
            retry_not_before: None,
        }
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn phase(&self, status: &ActuatorStatus) -> TimerPhase {
        self.state.phase(status.state.is_open)
    }

    /// Advance the timers for one frame.
    ///
    /// `confidence` is the frame's qualifying confidence, carried into the
    /// command trigger for notifications.
    pub fn process(
        &mut self,
        present: bool,
        now: Instant,
        status: &ActuatorStatus,
        confidence: Option<f32>,
    ) -> Option<Command> {
        if !status
            .state
            .automatic_allowed(now, self.settings.manual_timeout)
        {
            // Start from scratch when automation resumes.
            if self.state != PresenceState::default() || self.issued.is_some() {
                debug!("TIMER: suspended (manual mode)");
                self.state = PresenceState::default();
                self.issued = None;
            }
            return None;
        }

        self.absorb_outcome(status, now);

        if present {
            if self.state.detection_since.is_none() {
                info!("TIMER: presence started");
                self.state.detection_since = Some(now);
            }
            if self.state.absence_since.take().is_some() {
                self.clear_latch(CommandKind::Close);
            }
            let since = self.state.detection_since?;
            let dwell = now.saturating_duration_since(since);
            if dwell >= self.settings.required_detection && !status.state.is_open {
                return self.issue(CommandKind::Open, dwell, confidence, now);
            }
        } else {
            if self.state.absence_since.is_none() {
                if self.state.detection_since.is_some() {
                    info!("TIMER: presence lost");
                }
                self.state.absence_since = Some(now);
            }
            if self.state.detection_since.take().is_some() {
                self.clear_latch(CommandKind::Open);
            }
            let since = self.state.absence_since?;
            let absence = now.saturating_duration_since(since);
            if absence >= self.settings.required_absence && status.state.is_open {
                return self.issue(CommandKind::Close, absence, None, now);
            }
        }
        None
    }

    /// Drop the latch when the worker reports the latched command did not run.
    fn absorb_outcome(&mut self, status: &ActuatorStatus, now: Instant) {
        let (Some(issued), Some(outcome)) = (self.issued, status.last_outcome) else {
            return;
        };
        if outcome.seq != issued.seq || outcome.success() {
            return;
        }
        info!(
            "TIMER: {} #{} did not run ({:?}), retry after cooldown",
            issued.kind, issued.seq, outcome.result
        );
        self.issued = None;
        let base = outcome.at.max(now);
        self.retry_not_before = Some(base + self.settings.retry_after);
    }

    /// The command with `seq` never reached the worker; retry after cooldown.
    pub fn command_dropped(&mut self, seq: u64, now: Instant) {
        if self.issued.is_some_and(|i| i.seq == seq) {
            info!("TIMER: #{} dropped, retry after cooldown", seq);
            self.issued = None;
            self.retry_not_before = Some(now + self.settings.retry_after);
        }
    }

    fn clear_latch(&mut self, kind: CommandKind) {
        if self.issued.is_some_and(|i| i.kind == kind) {
            self.issued = None;
        }
    }

    fn issue(
        &mut self,
        kind: CommandKind,
        held: Duration,
        confidence: Option<f32>,
        now: Instant,
    ) -> Option<Command> {
        if self.issued.is_some_and(|i| i.kind == kind) {
            return None;
        }
        if self.retry_not_before.is_some_and(|t| now < t) {
            return None;
        }
        self.retry_not_before = None;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.issued = Some(Issued { seq, kind });
        info!(
            "TIMER: issuing {} #{} after {:.1}s",
            kind,
            seq,
            held.as_secs_f32()
        );
        Some(Command::automatic(
            kind,
            seq,
            Trigger {
                held_secs: held.as_secs_f32(),
                confidence,
            },
        ))
    }
}
