//! Two-stage actuator (window leaf + lock) and its published status.
//!
//! - [`sequence`]: range-checked motion primitives and the open / close
//!   sequences, shared by the controller and the one-shot CLI.
//! - [`controller`]: cooldown, idempotency, manual mode and the state that
//!   changes only after a confirmed physical transition.

pub mod controller;
pub mod sequence;
#[cfg(test)]
pub(crate) mod testing;

use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use serde::Serialize;

use crate::app::commands::CommandKind;
use crate::config::WindowConfig;

/// Last confirmed physical state of the mechanism.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorState {
    pub current_angle: f32,
    pub target_angle: f32,
    pub current_lock_angle: f32,
    pub target_lock_angle: f32,
    pub is_open: bool,
    pub is_locked: bool,
    pub manual_mode: bool,
    pub manual_since: Option<Instant>,
    pub last_command_time: Option<Instant>,
}

impl ActuatorState {
    /// Startup assumption: closed, locked, automatic.
    pub fn closed(cfg: &WindowConfig) -> Self {
        Self {
            current_angle: cfg.closed_angle,
            target_angle: cfg.closed_angle,
            current_lock_angle: cfg.lock_locked_angle,
            target_lock_angle: cfg.lock_locked_angle,
            is_open: false,
            is_locked: true,
            manual_mode: false,
            manual_since: None,
            last_command_time: None,
        }
    }

    /// Whether automatic commands may run at `now`.
    ///
    /// Manual mode suspends automation until re-enabled, or until
    /// `manual_timeout` has elapsed when one is configured.
    pub fn automatic_allowed(&self, now: Instant, manual_timeout: Option<Duration>) -> bool {
        if !self.manual_mode {
            return true;
        }
        match (manual_timeout, self.manual_since) {
            (Some(timeout), Some(since)) => now.saturating_duration_since(since) >= timeout,
            _ => false,
        }
    }
}

/// How much the published state can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// State matches the last confirmed readback.
    Ok,
    /// A sequence failed part-way; the mechanism may sit between states.
    Degraded,
    /// A command was cancelled mid-motion; position unknown.
    Unknown,
}

/// What became of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Ran and confirmed.
    Executed,
    /// Not run: cooldown, manual mode, or already in the requested state.
    Skipped,
    /// Started or was rejected with an error.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandOutcome {
    pub seq: u64,
    pub kind: CommandKind,
    pub result: OutcomeKind,
    pub at: Instant,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.result == OutcomeKind::Executed
    }
}

/// Snapshot published by the actuator worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorStatus {
    pub state: ActuatorState,
    pub health: Health,
    pub last_outcome: Option<CommandOutcome>,
}

impl ActuatorStatus {
    pub fn initial(cfg: &WindowConfig) -> Self {
        Self {
            state: ActuatorState::closed(cfg),
            health: Health::Ok,
            last_outcome: None,
        }
    }
}

/// Shared cell holding the latest [`ActuatorStatus`].
///
/// Reads and writes are a copy under a critical section, so the frame path
/// never waits on the serial link.
#[derive(Clone)]
pub struct StatusHandle(Arc<Mutex<CriticalSectionRawMutex, Cell<ActuatorStatus>>>);

impl StatusHandle {
    pub fn new(initial: ActuatorStatus) -> Self {
        Self(Arc::new(Mutex::new(Cell::new(initial))))
    }

    pub fn get(&self) -> ActuatorStatus {
        self.0.lock(Cell::get)
    }

    pub fn set(&self, status: ActuatorStatus) {
        self.0.lock(|cell| cell.set(status));
    }
}

/// Which half of the mechanism a motion drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Window,
    Lock,
}

impl Axis {
    pub fn setpoint(self) -> crate::transport::Register {
        match self {
            Self::Window => crate::transport::Register::WindowSetpoint,
            Self::Lock => crate::transport::Register::LockSetpoint,
        }
    }

    pub fn readback(self) -> crate::transport::Register {
        match self {
            Self::Window => crate::transport::Register::WindowReadback,
            Self::Lock => crate::transport::Register::LockReadback,
        }
    }

    pub fn tolerance(self, cfg: &WindowConfig) -> f32 {
        match self {
            Self::Window => cfg.window_tolerance,
            Self::Lock => cfg.lock_tolerance,
        }
    }

    /// Permitted travel `(min, max)` for direct moves.
    pub fn limits(self, cfg: &WindowConfig) -> (f32, f32) {
        match self {
            Self::Window => (cfg.closed_angle, cfg.max_angle),
            Self::Lock => cfg.lock_limits(),
        }
    }
}
