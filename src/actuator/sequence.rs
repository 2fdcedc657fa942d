//! Motion primitives and the interlocked open / close sequences.
//!
//! Every move is a setpoint write followed by a readback poll; the next
//! stage starts only after the previous one is confirmed:
//!
//! ```text
//!   open : unlock ──▶ confirm lock ──▶ settle ──▶ move leaf ──▶ confirm leaf
//!   close: move leaf ──▶ confirm leaf ──▶ settle ──▶ lock ──▶ confirm lock
//! ```
//!
//! A failed stage aborts the sequence, so the leaf never moves against a
//! locked bolt and the bolt never drives into an open frame.

use log::{info, warn};
use serde::Serialize;

use super::Axis;
use crate::app::ports::Clock;
use crate::config::WindowConfig;
use crate::error::{self, ActuatorError};
use crate::shutdown::ShutdownSignal;
use crate::transport::{PollSpec, Register, RegisterPort, poll_until_reached};

/// Operator manoeuvres run directly, outside the cooldown and mode rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Manoeuvre {
    Open,
    Close,
    WindowAngle(f32),
    LockAngle(f32),
    Lock,
    Unlock,
}

/// Both readbacks, interpreted against the configured angles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Readback {
    pub window_angle: f32,
    pub lock_angle: f32,
    pub open: bool,
    pub locked: bool,
}

/// Borrowed view of everything needed to move the mechanism.
pub struct Motion<'a, P: RegisterPort + ?Sized, C: Clock> {
    port: &'a mut P,
    clock: &'a C,
    cancel: &'a ShutdownSignal,
    cfg: &'a WindowConfig,
}

impl<'a, P: RegisterPort + ?Sized, C: Clock> Motion<'a, P, C> {
    pub fn new(
        port: &'a mut P,
        clock: &'a C,
        cancel: &'a ShutdownSignal,
        cfg: &'a WindowConfig,
    ) -> Self {
        Self {
            port,
            clock,
            cancel,
            cfg,
        }
    }

    /// Reject `angle` outside the axis travel before any I/O.
    pub fn check_range(&self, axis: Axis, angle: f32) -> Result<(), ActuatorError> {
        let (min, max) = axis.limits(self.cfg);
        if angle.is_nan() || angle < min || angle > max {
            return Err(ActuatorError::Range {
                requested: angle,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Write the setpoint and wait for the readback. Returns the confirmed angle.
    pub fn move_axis(&mut self, axis: Axis, angle: f32) -> Result<f32, ActuatorError> {
        self.check_range(axis, angle)?;
        info!("MOTION: {:?} -> {:.1}", axis, angle);
        self.port.write_angle(axis.setpoint(), angle)?;
        let poll = PollSpec {
            tolerance: axis.tolerance(self.cfg),
            timeout: self.cfg.move_timeout(),
            interval: self.cfg.poll_interval(),
        };
        let reached = poll_until_reached(
            &mut *self.port,
            self.clock,
            self.cancel,
            axis.readback(),
            angle,
            &poll,
        )
        .inspect_err(|e| warn!("MOTION: {:?} -> {:.1} failed: {}", axis, angle, e))?;
        info!("MOTION: {:?} confirmed at {:.1}", axis, reached);
        Ok(reached)
    }

    pub fn move_window(&mut self, angle: f32) -> Result<f32, ActuatorError> {
        self.move_axis(Axis::Window, angle)
    }

    pub fn move_lock(&mut self, angle: f32) -> Result<f32, ActuatorError> {
        self.move_axis(Axis::Lock, angle)
    }

    pub fn unlock(&mut self) -> Result<f32, ActuatorError> {
        self.move_lock(self.cfg.lock_unlocked_angle)
    }

    pub fn lock(&mut self) -> Result<f32, ActuatorError> {
        self.move_lock(self.cfg.lock_locked_angle)
    }

    pub fn settle(&self) {
        self.clock.sleep(self.cfg.settle());
    }

    /// Unlock, then move the leaf to `angle`.
    ///
    /// Returns `(leaf, lock)` confirmed readings.
    pub fn open_to(&mut self, angle: f32) -> Result<(f32, f32), ActuatorError> {
        self.check_range(Axis::Window, angle)?;
        let lock = self.unlock()?;
        self.settle();
        let leaf = self.move_window(angle)?;
        Ok((leaf, lock))
    }

    /// Full open sequence to the configured open angle.
    pub fn open(&mut self) -> Result<(f32, f32), ActuatorError> {
        self.open_to(self.cfg.open_angle)
    }

    /// Full close sequence: leaf to the closed angle, then lock.
    ///
    /// Returns `(leaf, lock)` confirmed readings.
    pub fn close(&mut self) -> Result<(f32, f32), ActuatorError> {
        let leaf = self.move_window(self.cfg.closed_angle)?;
        self.settle();
        let lock = self.lock()?;
        Ok((leaf, lock))
    }

    /// Run `m` to completion, then read both axes back.
    pub fn perform(&mut self, m: Manoeuvre) -> error::Result<Readback> {
        match m {
            Manoeuvre::Open => {
                self.open()?;
            }
            Manoeuvre::Close => {
                self.close()?;
            }
            Manoeuvre::WindowAngle(angle) => {
                self.move_window(angle)?;
            }
            Manoeuvre::LockAngle(angle) => {
                self.move_lock(angle)?;
            }
            Manoeuvre::Lock => {
                self.lock()?;
            }
            Manoeuvre::Unlock => {
                self.unlock()?;
            }
        }
        self.readback()
    }

    pub fn readback(&mut self) -> error::Result<Readback> {
        let window_angle = self.port.read_angle(Register::WindowReadback)?;
        let lock_angle = self.port.read_angle(Register::LockReadback)?;
        Ok(Readback {
            window_angle,
            lock_angle,
            open: window_angle > self.cfg.open_hysteresis_angle(),
            locked: (lock_angle - self.cfg.lock_locked_angle).abs() <= self.cfg.lock_tolerance,
        })
    }
}
