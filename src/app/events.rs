//! Outbound application events.
//!
//! The frame path and the actuator worker emit these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them: log, write JSON lines for a messaging
//! bridge, or forward to another thread.

use serde::Serialize;

use super::commands::Origin;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// The runner is up; carries whether automatic control is active.
    Started { auto: bool },

    /// Open sequence completed (unlocked and leaf confirmed at open angle).
    WindowOpened {
        reason: Origin,
        dwell_secs: Option<f32>,
        confidence: Option<f32>,
    },

    /// Close sequence completed (leaf confirmed closed and locked).
    WindowClosed {
        reason: Origin,
        absence_secs: Option<f32>,
    },

    /// Leaf moved to an explicit angle.
    AngleSet { angle: f32, open: bool, reason: Origin },

    /// Lock moved on its own.
    LockChanged { locked: bool, reason: Origin },

    /// Manual / automatic mode switched.
    ModeChanged { manual: bool },

    /// A frame qualified for an image capture.
    CaptureRequested { confidence: f32 },

    /// A command failed or a collaborator misbehaved.
    Error { message: String },

    /// Orderly shutdown.
    Stopped,
}

impl AppEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
