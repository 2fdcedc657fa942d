//! Actuator controller: the only writer of [`ActuatorState`].
//!
//! Every request passes three gates in order:
//!
//! 1. **Cooldown** since the last executed command (default 5 s).
//! 2. **Manual mode**: automatic requests are ignored while an operator
//!    holds control (until re-enabled or the optional manual timeout).
//! 3. **Idempotency**: an automatic request for the current state is a
//!    no-op. Manual requests always re-execute.
//!
//! A rejected request returns `Ok(false)` without touching the link. State
//! is committed in one step after the whole sequence is confirmed; on any
//! failure it stays as it was and [`Health`] records the doubt.

use log::{debug, error, info, warn};

use super::sequence::Motion;
use super::{ActuatorState, Axis, Health};
use crate::app::commands::{Command, CommandKind};
use crate::app::ports::Clock;
use crate::config::WindowConfig;
use crate::error::{ActuatorError, TransportError};
use crate::shutdown::ShutdownSignal;
use crate::transport::RegisterPort;

pub struct ActuatorController<P: RegisterPort, C: Clock> {
    port: P,
    clock: C,
    cfg: WindowConfig,
    cancel: ShutdownSignal,
    state: ActuatorState,
    health: Health,
}

impl<P: RegisterPort, C: Clock> ActuatorController<P, C> {
    pub fn new(port: P, clock: C, cfg: WindowConfig, cancel: ShutdownSignal) -> Self {
        let state = ActuatorState::closed(&cfg);
        Self {
            port,
            clock,
            cfg,
            cancel,
            state,
            health: Health::Ok,
        }
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn health(&self) -> Health {
        self.health
    }

    pub fn config(&self) -> &WindowConfig {
        &self.cfg
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Whether automatic commands are currently accepted.
    pub fn auto_control_enabled(&self) -> bool {
        self.state
            .automatic_allowed(self.clock.now(), self.cfg.manual_timeout())
    }

    /// Leave manual mode. Returns `true` if the mode changed.
    pub fn enable_auto_control(&mut self) -> bool {
        if !self.state.manual_mode {
            return false;
        }
        info!("CTRL: automatic control enabled");
        self.state.manual_mode = false;
        self.state.manual_since = None;
        true
    }

    /// Enter manual mode without moving. Returns `true` if the mode changed.
    pub fn disable_auto_control(&mut self) -> bool {
        if self.state.manual_mode {
            return false;
        }
        info!("CTRL: automatic control disabled");
        self.state.manual_mode = true;
        self.state.manual_since = Some(self.clock.now());
        true
    }

    /// Map a [`Command`] onto the operation it names.
    pub fn execute(&mut self, cmd: &Command) -> Result<bool, ActuatorError> {
        let manual = cmd.is_manual();
        match cmd.kind {
            CommandKind::Open => self.set_window_position(true, manual),
            CommandKind::Close => self.set_window_position(false, manual),
            CommandKind::SetAngle(angle) => self.set_window_angle(angle, manual),
            CommandKind::Lock => self.set_lock_position(true, manual),
            CommandKind::Unlock => self.set_lock_position(false, manual),
        }
    }

    /// Run the full open or close sequence.
    pub fn set_window_position(
        &mut self,
        should_be_open: bool,
        manual: bool,
    ) -> Result<bool, ActuatorError> {
        let what = if should_be_open { "open" } else { "close" };
        if !self.admit(manual, self.state.is_open == should_be_open, what) {
            return Ok(false);
        }

        info!(
            "CTRL: {} window ({})",
            what,
            if manual { "manual" } else { "automatic" }
        );
        let result = {
            let mut motion = Motion::new(&mut self.port, &self.clock, &self.cancel, &self.cfg);
            if should_be_open {
                motion.open()
            } else {
                motion.close()
            }
        };
        let (leaf, lock) = result.map_err(|e| self.fail(what, e))?;

        let target = if should_be_open {
            self.cfg.open_angle
        } else {
            self.cfg.closed_angle
        };
        let lock_target = if should_be_open {
            self.cfg.lock_unlocked_angle
        } else {
            self.cfg.lock_locked_angle
        };
        self.commit(manual, |s| {
            s.current_angle = leaf;
            s.target_angle = target;
            s.current_lock_angle = lock;
            s.target_lock_angle = lock_target;
            s.is_open = should_be_open;
            s.is_locked = !should_be_open;
        });
        Ok(true)
    }

    /// Move the leaf to `angle` within the closed–open range, unlocking
    /// first when locked.
    pub fn set_window_angle(&mut self, angle: f32, manual: bool) -> Result<bool, ActuatorError> {
        let (min, max) = (self.cfg.closed_angle, self.cfg.open_angle);
        if angle.is_nan() || angle < min || angle > max {
            return Err(ActuatorError::Range {
                requested: angle,
                min,
                max,
            });
        }
        let already = (self.state.current_angle - angle).abs() <= self.cfg.window_tolerance;
        if !self.admit(manual, already, "set angle") {
            return Ok(false);
        }

        let was_locked = self.state.is_locked;
        info!("CTRL: window angle {:.1} (locked: {})", angle, was_locked);
        let result = {
            let mut motion = Motion::new(&mut self.port, &self.clock, &self.cancel, &self.cfg);
            if was_locked {
                motion.open_to(angle).map(|(leaf, lock)| (leaf, Some(lock)))
            } else {
                motion.move_window(angle).map(|leaf| (leaf, None))
            }
        };
        let (leaf, lock) = result.map_err(|e| self.fail("set angle", e))?;

        let open = angle > self.cfg.open_hysteresis_angle();
        let unlocked = self.cfg.lock_unlocked_angle;
        self.commit(manual, |s| {
            s.current_angle = leaf;
            s.target_angle = angle;
            if let Some(lock) = lock {
                s.current_lock_angle = lock;
                s.target_lock_angle = unlocked;
                s.is_locked = false;
            }
            s.is_open = open;
        });
        Ok(true)
    }

    /// Drive the lock alone.
    pub fn set_lock_position(&mut self, locked: bool, manual: bool) -> Result<bool, ActuatorError> {
        let what = if locked { "lock" } else { "unlock" };
        if !self.admit(manual, self.state.is_locked == locked, what) {
            return Ok(false);
        }
        if locked && self.state.is_open {
            warn!("CTRL: locking while the window reads open");
        }

        let target = if locked {
            self.cfg.lock_locked_angle
        } else {
            self.cfg.lock_unlocked_angle
        };
        let result =
            Motion::new(&mut self.port, &self.clock, &self.cancel, &self.cfg).move_axis(Axis::Lock, target);
        let lock = result.map_err(|e| self.fail(what, e))?;

        self.commit(manual, |s| {
            s.current_lock_angle = lock;
            s.target_lock_angle = target;
            s.is_locked = locked;
        });
        Ok(true)
    }

    // ── Gates & bookkeeping ────────────────────────────────────

    fn admit(&mut self, manual: bool, already: bool, what: &str) -> bool {
        let now = self.clock.now();
        if let Some(last) = self.state.last_command_time {
            let since = now.saturating_duration_since(last);
            if since < self.cfg.command_cooldown() {
                info!(
                    "CTRL: {} ignored, cooldown ({:.1}s since last command)",
                    what,
                    since.as_secs_f32()
                );
                return false;
            }
        }

        if manual {
            return true;
        }

        if self.state.manual_mode {
            if !self.state.automatic_allowed(now, self.cfg.manual_timeout()) {
                debug!("CTRL: automatic {} ignored in manual mode", what);
                return false;
            }
            info!("CTRL: manual timeout elapsed, resuming automatic control");
            self.state.manual_mode = false;
            self.state.manual_since = None;
        }

        if already {
            debug!("CTRL: automatic {} ignored, already there", what);
            return false;
        }
        true
    }

    fn commit(&mut self, manual: bool, apply: impl FnOnce(&mut ActuatorState)) {
        let now = self.clock.now();
        let mut next = self.state;
        apply(&mut next);
        next.last_command_time = Some(now);
        if manual {
            if !next.manual_mode {
                info!("CTRL: entering manual mode");
            }
            next.manual_mode = true;
            next.manual_since = Some(now);
        }
        self.state = next;
        self.health = Health::Ok;
    }

    fn fail(&mut self, what: &str, e: ActuatorError) -> ActuatorError {
        match e {
            ActuatorError::Range { .. } => {}
            ActuatorError::Transport(TransportError::Cancelled) => self.health = Health::Unknown,
            ActuatorError::Transport(_) => self.health = Health::Degraded,
        }
        error!("CTRL: {} failed: {}", what, e);
        e
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::actuator::testing::SnapDevice;
    use crate::adapters::time::ManualClock;
    use crate::transport::Register;

    fn ctrl(dev: SnapDevice) -> (ActuatorController<SnapDevice, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            ActuatorController::new(
                dev,
                clock.clone(),
                WindowConfig::default(),
                ShutdownSignal::new(),
            ),
            clock,
        )
    }

    #[test]
    fn automatic_open_commits_state() {
        let (mut c, _) = ctrl(SnapDevice::closed());
        assert_eq!(c.set_window_position(true, false), Ok(true));
        let s = c.state();
        assert!(s.is_open);
        assert!(!s.is_locked);
        assert!((s.current_angle - 120.0).abs() < 0.05);
        assert!(!s.manual_mode);
        assert!(s.last_command_time.is_some());
    }

    #[test]
    fn automatic_request_for_current_state_is_noop() {
        let (mut c, _) = ctrl(SnapDevice::closed());
        assert_eq!(c.set_window_position(false, false), Ok(false));
        assert!(c.port().log.is_empty());
    }

    #[test]
    fn manual_request_reexecutes_and_enters_manual_mode() {
        let (mut c, _) = ctrl(SnapDevice::closed());
        assert_eq!(c.set_window_position(false, true), Ok(true));
        assert_eq!(
            c.port().writes(),
            vec![Register::WindowSetpoint, Register::LockSetpoint]
        );
        assert!(c.state().manual_mode);
        assert!(!c.auto_control_enabled());
    }

    #[test]
    fn second_command_inside_cooldown_touches_nothing() {
        let (mut c, clock) = ctrl(SnapDevice::closed());
        assert_eq!(c.set_window_position(true, true), Ok(true));
        let writes = c.port().writes().len();
        clock.advance(Duration::from_secs(1));
        assert_eq!(c.set_window_position(false, true), Ok(false));
        assert_eq!(c.port().writes().len(), writes);
        assert!(c.state().is_open);
    }

    #[test]
    fn automatic_ignored_while_manual() {
        let (mut c, clock) = ctrl(SnapDevice::closed());
        c.disable_auto_control();
        clock.advance(Duration::from_secs(60));
        assert_eq!(c.set_window_position(true, false), Ok(false));
        assert!(c.port().log.is_empty());
        assert!(c.enable_auto_control());
        assert_eq!(c.set_window_position(true, false), Ok(true));
    }

    #[test]
    fn manual_timeout_resumes_automatic() {
        let clock = ManualClock::new();
        let cfg = WindowConfig {
            manual_timeout_secs: Some(60),
            ..WindowConfig::default()
        };
        let mut c =
            ActuatorController::new(SnapDevice::closed(), clock.clone(), cfg, ShutdownSignal::new());
        c.disable_auto_control();
        clock.advance(Duration::from_secs(59));
        assert_eq!(c.set_window_position(true, false), Ok(false));
        clock.advance(Duration::from_secs(1));
        assert_eq!(c.set_window_position(true, false), Ok(true));
        assert!(!c.state().manual_mode);
    }

    #[test]
    fn stuck_leaf_times_out_and_keeps_state() {
        let (mut c, clock) = ctrl(SnapDevice::closed());
        assert_eq!(c.set_window_position(true, true), Ok(true));
        clock.advance(Duration::from_secs(6));
        let before = c.state();

        c.port.stuck_window = true;
        c.port.regs[Register::WindowReadback.address() as usize] = 900;
        c.port.log.clear();

        let err = c.set_window_position(false, true).unwrap_err();
        assert!(matches!(
            err,
            ActuatorError::Transport(TransportError::Timeout {
                register: Register::WindowReadback,
                last: Some(_),
                ..
            })
        ));
        assert_eq!(c.state(), before);
        assert_eq!(c.health(), Health::Degraded);
        assert!(!c.port().writes().contains(&Register::LockSetpoint));
    }

    /// Device whose leaf never moves and which raises `cancel` on the
    /// fifth leaf readback.
    struct CancelOnPoll {
        dev: SnapDevice,
        cancel: ShutdownSignal,
        readbacks: usize,
    }

    impl RegisterPort for CancelOnPoll {
        fn write_register(&mut self, register: Register, value: u16) -> Result<(), TransportError> {
            self.dev.write_register(register, value)
        }

        fn read_register(&mut self, register: Register) -> Result<u16, TransportError> {
            if register == Register::WindowReadback {
                self.readbacks += 1;
                if self.readbacks == 5 {
                    self.cancel.raise();
                }
            }
            self.dev.read_register(register)
        }
    }

    #[test]
    fn cancel_during_leaf_poll_leaves_state_and_marks_unknown() {
        let cancel = ShutdownSignal::new();
        let port = CancelOnPoll {
            dev: SnapDevice {
                stuck_window: true,
                ..SnapDevice::closed()
            },
            cancel: cancel.clone(),
            readbacks: 0,
        };
        let mut c =
            ActuatorController::new(port, ManualClock::new(), WindowConfig::default(), cancel);
        let before = c.state();

        let err = c.set_window_position(true, true).unwrap_err();
        assert_eq!(err, ActuatorError::Transport(TransportError::Cancelled));
        assert_eq!(c.state(), before);
        assert!(!c.state().is_open);
        assert!(!c.state().manual_mode);
        assert_eq!(c.health(), Health::Unknown);
        assert_eq!(c.port().readbacks, 5);
    }

    #[test]
    fn cancelled_motion_marks_health_unknown() {
        let clock = ManualClock::new();
        let cancel = ShutdownSignal::new();
        cancel.raise();
        let mut c = ActuatorController::new(
            SnapDevice::closed(),
            clock,
            WindowConfig::default(),
            cancel,
        );
        let err = c.set_window_position(true, true).unwrap_err();
        assert_eq!(err, ActuatorError::Transport(TransportError::Cancelled));
        assert_eq!(c.health(), Health::Unknown);
        assert!(!c.state().is_open);
        assert!(!c.state().manual_mode);
    }

    #[test]
    fn set_angle_range_checked_before_io() {
        let (mut c, _) = ctrl(SnapDevice::closed());
        assert!(c.set_window_angle(130.0, true).unwrap_err().is_rejected());
        assert!(c.set_window_angle(76.0, true).unwrap_err().is_rejected());
        assert!(c.port().log.is_empty());
    }

    #[test]
    fn set_angle_unlocks_only_when_locked() {
        let (mut c, clock) = ctrl(SnapDevice::closed());
        assert_eq!(c.set_window_angle(100.0, true), Ok(true));
        assert_eq!(
            c.port().writes(),
            vec![Register::LockSetpoint, Register::WindowSetpoint]
        );
        let s = c.state();
        assert!(s.is_open);
        assert!(!s.is_locked);

        clock.advance(Duration::from_secs(6));
        assert_eq!(c.set_window_angle(80.0, true), Ok(true));
        assert_eq!(c.port().writes().len(), 3);
        // 80 is within closed + 5, so the leaf counts as closed.
        assert!(!c.state().is_open);
    }

    #[test]
    fn lock_follows_idempotency_rules() {
        let (mut c, clock) = ctrl(SnapDevice::closed());
        assert_eq!(c.set_lock_position(true, false), Ok(false));
        assert_eq!(c.set_lock_position(false, true), Ok(true));
        assert!(!c.state().is_locked);
        clock.advance(Duration::from_secs(5));
        assert_eq!(c.set_lock_position(true, true), Ok(true));
        assert!(c.state().is_locked);
    }

    #[test]
    fn execute_maps_commands() {
        let (mut c, _) = ctrl(SnapDevice::closed());
        assert_eq!(c.execute(&Command::manual(CommandKind::Unlock)), Ok(true));
        assert_eq!(c.port().writes(), vec![Register::LockSetpoint]);
    }
}
