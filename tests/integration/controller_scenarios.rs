//! End-to-end scenarios: frames through `AppService`, commands through
//! `ActuatorController`, registers on a mock device, on virtual time.

use std::time::Duration;

use catwindow::actuator::controller::ActuatorController;
use catwindow::actuator::{ActuatorStatus, CommandOutcome, Health, OutcomeKind};
use catwindow::adapters::time::ManualClock;
use catwindow::app::commands::CommandKind;
use catwindow::app::ports::Clock;
use catwindow::app::service::AppService;
use catwindow::config::{SystemConfig, WindowConfig};
use catwindow::diagnostics::Telemetry;
use catwindow::error::{ActuatorError, TransportError};
use catwindow::presence::DetectionSample;
use catwindow::shutdown::ShutdownSignal;
use catwindow::transport::Register;

use super::mock_device::{MockDevice, RecordingSink};

const FRAME: Duration = Duration::from_millis(100);

struct Rig {
    clock: ManualClock,
    device: MockDevice,
    service: AppService,
    controller: ActuatorController<MockDevice, ManualClock>,
    status: ActuatorStatus,
    telemetry: Telemetry,
    sink: RecordingSink,
}

impl Rig {
    fn new() -> Self {
        let config = SystemConfig::default();
        let clock = ManualClock::new();
        let device = MockDevice::closed();
        let controller = ActuatorController::new(
            device.clone(),
            clock.clone(),
            config.window.clone(),
            ShutdownSignal::new(),
        );
        Self {
            status: ActuatorStatus::initial(&config.window),
            service: AppService::new(&config),
            clock,
            device,
            controller,
            telemetry: Telemetry::new(),
            sink: RecordingSink::default(),
        }
    }

    /// Run one frame; execute any command synchronously. Returns the
    /// virtual time at which a command was issued, with its kind.
    fn frame(&mut self, detections: &[DetectionSample]) -> Option<(Duration, CommandKind)> {
        let now = self.clock.now();
        let issued_at = self.clock.elapsed();
        let cmd = self.service.on_frame(
            detections,
            now,
            &self.status,
            &self.telemetry,
            &mut self.sink,
        );
        self.clock.advance(FRAME);
        let cmd = cmd?;
        let result = match self.controller.execute(&cmd) {
            Ok(true) => OutcomeKind::Executed,
            Ok(false) => OutcomeKind::Skipped,
            Err(_) => OutcomeKind::Failed,
        };
        self.status = ActuatorStatus {
            state: self.controller.state(),
            health: self.controller.health(),
            last_outcome: Some(CommandOutcome {
                seq: cmd.seq,
                kind: cmd.kind,
                result,
                at: self.clock.now(),
            }),
        };
        Some((issued_at, cmd.kind))
    }

    fn run(&mut self, secs: f32, detections: &[DetectionSample]) -> Vec<(Duration, CommandKind)> {
        let frames = (secs * 10.0).round() as usize;
        (0..frames).filter_map(|_| self.frame(detections)).collect()
    }
}

fn cat(confidence: f32) -> DetectionSample {
    // Center at 0.25 of the frame: inside the default ROI.
    DetectionSample::from_pixel_bbox("cat", confidence, 100.0, 220.0, 640)
}

#[test]
fn eleven_seconds_in_roi_opens_once_at_ten() {
    let mut rig = Rig::new();
    let cmds = rig.run(11.0, &[cat(0.75)]);
    assert_eq!(cmds.len(), 1);
    let (at, kind) = cmds[0];
    assert_eq!(kind, CommandKind::Open);
    assert!((at.as_secs_f32() - 10.0).abs() < 0.05, "opened at {:?}", at);
    assert!(rig.controller.state().is_open);
    assert!((rig.device.window_angle() - 120.0).abs() < 0.1);
    assert!((rig.device.lock_angle() - 90.0).abs() < 0.1);
}

#[test]
fn eight_seconds_of_presence_then_absence_issues_nothing() {
    let mut rig = Rig::new();
    // 5 s of detections hold presence through the 3 s filter window,
    // so the debounced presence lasts until just before t = 8 s.
    assert!(rig.run(5.0, &[cat(0.75)]).is_empty());
    assert!(rig.run(3.0, &[]).is_empty());
    assert!(rig.service.presence_state().detection_since.is_some());

    // Absence begins: the dwell timer resets.
    assert!(rig.run(1.0, &[]).is_empty());
    let state = rig.service.presence_state();
    assert_eq!(state.detection_since, None);
    assert!(state.absence_since.is_some());
    assert!(rig.device.writes().is_empty());

    // A fresh run of the same length still does not open.
    assert!(rig.run(5.0, &[cat(0.75)]).is_empty());
    assert!(rig.run(3.0, &[]).is_empty());
    assert!(rig.device.writes().is_empty());
}

#[test]
fn below_threshold_or_outside_roi_never_opens() {
    let mut rig = Rig::new();
    assert!(rig.run(15.0, &[cat(0.65)]).is_empty());
    let outside = DetectionSample::from_pixel_bbox("cat", 0.95, 500.0, 600.0, 640);
    assert!(rig.run(15.0, &[outside]).is_empty());
}

#[test]
fn presence_then_absence_opens_and_closes_once_each() {
    let mut rig = Rig::new();
    let opens = rig.run(12.0, &[cat(0.8)]);
    assert_eq!(opens.len(), 1);
    // 3 s filter window + 3 s absence, plus headroom.
    let closes = rig.run(10.0, &[]);
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].1, CommandKind::Close);
    assert!(!rig.controller.state().is_open);
    assert!(rig.controller.state().is_locked);
}

#[test]
fn second_command_within_cooldown_touches_no_wire() {
    let mut rig = Rig::new();
    assert_eq!(rig.controller.set_window_position(true, true), Ok(true));
    let writes_after_first = rig.device.writes().len();

    rig.clock.advance(Duration::from_secs(2));
    assert_eq!(rig.controller.set_window_position(false, true), Ok(false));
    assert_eq!(rig.device.writes().len(), writes_after_first);
    assert!(rig.controller.state().is_open);
}

#[test]
fn automatic_request_for_current_state_is_a_noop() {
    let mut rig = Rig::new();
    assert_eq!(rig.controller.set_window_position(false, false), Ok(false));
    assert!(rig.device.writes().is_empty());
    // Manual requests re-execute even when already closed.
    assert_eq!(rig.controller.set_window_position(false, true), Ok(true));
    assert!(!rig.device.writes().is_empty());
}

#[test]
fn close_stuck_at_ninety_times_out_and_keeps_state() {
    let mut rig = Rig::new();
    assert_eq!(rig.controller.set_window_position(true, true), Ok(true));
    rig.clock.advance(Duration::from_secs(6));
    let before = rig.controller.state();

    rig.device.stick_window_at(90.0);
    let t0 = rig.clock.elapsed();
    let err = rig.controller.set_window_position(false, true).unwrap_err();
    let waited = rig.clock.elapsed() - t0;

    match err {
        ActuatorError::Transport(TransportError::Timeout {
            register, target, last,
        }) => {
            assert_eq!(register, Register::WindowReadback);
            assert!((target - 77.0).abs() < 1e-3);
            assert_eq!(last, Some(90.0));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    let timeout = WindowConfig::default().move_timeout();
    assert!(waited >= timeout && waited < timeout + Duration::from_secs(1));
    assert_eq!(rig.controller.state(), before);
    assert_eq!(rig.controller.health(), Health::Degraded);
    // The lock was never driven while the leaf was unconfirmed.
    assert_eq!(
        rig.device.writes().last().map(|w| w.0),
        Some(Register::WindowSetpoint)
    );
}

#[test]
fn sequences_interlock_lock_and_leaf() {
    let mut rig = Rig::new();
    rig.controller.set_window_position(true, true).unwrap();
    let open: Vec<_> = rig.device.writes().into_iter().map(|w| w.0).collect();
    assert_eq!(open, vec![Register::LockSetpoint, Register::WindowSetpoint]);

    rig.device.clear_log();
    rig.clock.advance(Duration::from_secs(6));
    rig.controller.set_window_position(false, true).unwrap();
    let close: Vec<_> = rig.device.writes().into_iter().map(|w| w.0).collect();
    assert_eq!(close, vec![Register::WindowSetpoint, Register::LockSetpoint]);
}

#[test]
fn out_of_range_angle_rejected_before_io() {
    let mut rig = Rig::new();
    let err = rig.controller.set_window_angle(150.0, true).unwrap_err();
    assert!(err.is_rejected());
    assert!(rig.device.model().log.is_empty());
}

#[test]
fn manual_mode_blocks_automatic_until_reenabled() {
    let mut rig = Rig::new();
    rig.controller.set_window_position(true, true).unwrap();
    assert!(rig.controller.state().manual_mode);
    rig.status.state = rig.controller.state();

    // Automatic close is ignored while manual.
    rig.clock.advance(Duration::from_secs(6));
    assert_eq!(rig.controller.set_window_position(false, false), Ok(false));
    assert!(rig.run(10.0, &[]).is_empty());

    assert!(rig.controller.enable_auto_control());
    rig.status.state = rig.controller.state();
    let cmds = rig.run(5.0, &[]);
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].1, CommandKind::Close);
}
