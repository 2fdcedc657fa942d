//! Register-oriented link to the actuator controller.
//!
//! ```text
//!   ActuatorController ──▶ RegisterPort ──▶ Session ──▶ ModbusConnection ──▶ Link
//! ```
//!
//! The controller only sees [`RegisterPort`]; framing, reconnects and the
//! USB reset hook live below it.

pub mod codec;
pub mod connection;
pub mod link;
pub mod session;

use core::fmt;
use std::time::Duration;

use log::debug;

use crate::app::ports::Clock;
use crate::error::TransportError;
use crate::shutdown::ShutdownSignal;

/// Holding registers exposed by the actuator controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Register {
    WindowSetpoint = 0,
    WindowReadback = 1,
    LockSetpoint = 2,
    LockReadback = 3,
}

impl Register {
    pub const fn address(self) -> u16 {
        self as u16
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::WindowSetpoint => "window setpoint",
            Self::WindowReadback => "window readback",
            Self::LockSetpoint => "lock setpoint",
            Self::LockReadback => "lock readback",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (reg {})", self.name(), self.address())
    }
}

/// Single-attempt register access. Implementations never retry a write;
/// the caller decides what a failure means.
pub trait RegisterPort {
    fn write_register(&mut self, register: Register, value: u16) -> Result<(), TransportError>;

    fn read_register(&mut self, register: Register) -> Result<u16, TransportError>;

    /// Write an angle in degrees (sent as tenths).
    fn write_angle(&mut self, register: Register, angle_deg: f32) -> Result<(), TransportError> {
        self.write_register(register, codec::angle_to_register(angle_deg))
    }

    /// Read an angle in degrees.
    fn read_angle(&mut self, register: Register) -> Result<f32, TransportError> {
        Ok(codec::register_to_angle(self.read_register(register)?))
    }
}

impl<P: RegisterPort + ?Sized> RegisterPort for &mut P {
    fn write_register(&mut self, register: Register, value: u16) -> Result<(), TransportError> {
        (**self).write_register(register, value)
    }

    fn read_register(&mut self, register: Register) -> Result<u16, TransportError> {
        (**self).read_register(register)
    }
}

/// Convergence parameters for [`poll_until_reached`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSpec {
    pub tolerance: f32,
    pub timeout: Duration,
    pub interval: Duration,
}

/// Readings are tenths of a degree; absorb float noise at the tolerance edge.
const TOLERANCE_SLACK: f32 = 1e-3;

/// Poll `register` until it reads within `poll.tolerance` of `target`.
///
/// Read failures inside the window are retried until the deadline; only a
/// dropped link aborts early. Returns the converged reading.
pub fn poll_until_reached<P, C>(
    port: &mut P,
    clock: &C,
    cancel: &ShutdownSignal,
    register: Register,
    target: f32,
    poll: &PollSpec,
) -> Result<f32, TransportError>
where
    P: RegisterPort + ?Sized,
    C: Clock,
{
    let deadline = clock.now() + poll.timeout;
    let mut last: Option<f32> = None;

    loop {
        if cancel.is_raised() {
            return Err(TransportError::Cancelled);
        }

        match port.read_angle(register) {
            Ok(angle) => {
                if last.is_none_or(|prev| (prev - angle).abs() > f32::EPSILON) {
                    debug!("POLL: {} = {:.1} (target {:.1})", register, angle, target);
                }
                last = Some(angle);
                if (angle - target).abs() <= poll.tolerance + TOLERANCE_SLACK {
                    return Ok(angle);
                }
            }
            Err(e) if e.is_connection_fault() => return Err(e),
            Err(e) => debug!("POLL: {} read error: {}", register, e),
        }

        if clock.now() >= deadline {
            return Err(TransportError::Timeout {
                register,
                target,
                last,
            });
        }
        clock.sleep(poll.interval);
    }
}
