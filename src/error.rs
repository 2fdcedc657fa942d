//! Unified error types for the window controller.
//!
//! A single `Error` enum for operations that span transport and actuator
//! failures (one-shot manoeuvres and readbacks). All variants are `Copy` so they can be
//! carried through command outcomes and status snapshots without allocation.
//! Variants holding angles derive `PartialEq` only (they carry `f32`).

use core::fmt;

use crate::transport::Register;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// The serial link to the actuator controller failed.
    Transport(TransportError),
    /// An actuator command was rejected or did not complete.
    Actuator(ActuatorError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Link-level failures that drop the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFault {
    /// The serial device could not be opened.
    PortUnavailable,
    /// The link failed mid-transaction.
    Disconnected,
    /// Every connect attempt failed.
    RetriesExhausted { attempts: u8 },
}

impl fmt::Display for ConnectionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortUnavailable => write!(f, "serial port unavailable"),
            Self::Disconnected => write!(f, "link disconnected"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "connect failed after {attempts} attempts")
            }
        }
    }
}

/// A response arrived but could not be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFault {
    /// CRC-16 over the frame did not match.
    CrcMismatch,
    /// The device answered with a Modbus exception code.
    Exception(u8),
    /// The frame was well-formed but did not answer our request.
    UnexpectedResponse,
    /// The frame header was not a function we speak.
    Malformed,
}

impl fmt::Display for ProtocolFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::Exception(code) => write!(f, "exception code {code:#04x}"),
            Self::UnexpectedResponse => write!(f, "unexpected response"),
            Self::Malformed => write!(f, "malformed frame"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportError {
    /// The link is unusable; the next operation reconnects.
    Connection(ConnectionFault),
    /// Register write rejected or unanswered.
    Write(Register),
    /// Register read unanswered.
    Read(Register),
    /// Response for `Register` failed validation.
    Protocol(Register, ProtocolFault),
    /// Position not reached before the deadline.
    Timeout {
        register: Register,
        target: f32,
        last: Option<f32>,
    },
    /// Shutdown requested while waiting on the device.
    Cancelled,
}

impl TransportError {
    /// Whether the connection should be dropped and re-established.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(fault) => write!(f, "connection: {fault}"),
            Self::Write(reg) => write!(f, "write to {reg} failed"),
            Self::Read(reg) => write!(f, "read from {reg} failed"),
            Self::Protocol(reg, fault) => write!(f, "{reg}: {fault}"),
            Self::Timeout {
                register,
                target,
                last: Some(last),
            } => write!(
                f,
                "{register} did not reach {target:.1} (last reading {last:.1})"
            ),
            Self::Timeout {
                register,
                target,
                last: None,
            } => write!(f, "{register} did not reach {target:.1} (no reading)"),
            Self::Cancelled => write!(f, "cancelled by shutdown"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorError {
    /// Requested angle lies outside the permitted range; nothing was sent.
    Range { requested: f32, min: f32, max: f32 },
    /// A step of the motion sequence failed on the link.
    Transport(TransportError),
}

impl ActuatorError {
    /// Whether the failure happened before anything reached the device.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Range { .. })
    }
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range {
                requested,
                min,
                max,
            } => write!(f, "angle {requested:.1} outside {min:.1}..={max:.1}"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl From<TransportError> for ActuatorError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

impl std::error::Error for ActuatorError {}
impl std::error::Error for TransportError {}

pub type Result<T> = core::result::Result<T, Error>;
