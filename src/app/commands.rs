//! Inbound commands.
//!
//! [`Command`] is what the presence timer or an operator asks the actuator
//! to do; [`AppCommand`] is what travels over the worker queue, adding the
//! mode switches that do not touch the mechanism.

use core::fmt;

/// Who asked for a command. Manual commands bypass idempotency and put the
/// controller into manual mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandKind {
    Open,
    Close,
    /// Move the leaf to an absolute angle (degrees).
    SetAngle(f32),
    Lock,
    Unlock,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
            Self::SetAngle(a) => write!(f, "set-angle {a:.1}"),
            Self::Lock => write!(f, "lock"),
            Self::Unlock => write!(f, "unlock"),
        }
    }
}

/// Why an automatic command fired; carried through to notifications.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    /// Seconds of continuous presence (open) or absence (close).
    pub held_secs: f32,
    /// Best qualifying confidence on the triggering frame.
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub origin: Origin,
    /// Monotonic per issuer; automatic commands start at 1, manual ones use 0.
    pub seq: u64,
    pub trigger: Option<Trigger>,
}

impl Command {
    pub fn manual(kind: CommandKind) -> Self {
        Self {
            kind,
            origin: Origin::Manual,
            seq: 0,
            trigger: None,
        }
    }

    pub fn automatic(kind: CommandKind, seq: u64, trigger: Trigger) -> Self {
        Self {
            kind,
            origin: Origin::Automatic,
            seq,
            trigger: Some(trigger),
        }
    }

    pub fn is_manual(&self) -> bool {
        self.origin == Origin::Manual
    }
}

/// Messages the actuator worker accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppCommand {
    /// Drive the mechanism.
    Actuate(Command),
    /// Leave manual mode; the presence timer drives the window again.
    EnableAuto,
    /// Enter manual mode without moving anything.
    DisableAuto,
}
