//! The controller over the full byte-level stack:
//! `Session → ModbusConnection → codec → SlaveLink → DeviceModel`.

use std::time::Duration;

use catwindow::actuator::controller::ActuatorController;
use catwindow::actuator::sequence::Motion;
use catwindow::adapters::time::ManualClock;
use catwindow::config::{SerialConfig, WindowConfig};
use catwindow::error::{ActuatorError, ConnectionFault, TransportError};
use catwindow::shutdown::ShutdownSignal;
use catwindow::transport::link::LinkOpener;
use catwindow::transport::session::{Session, SessionPolicy};
use catwindow::transport::{Register, RegisterPort};

use super::mock_device::{Access, MockDevice, SlaveOpener};

type SlaveSession = Session<SlaveOpener, ManualClock>;

fn session(device: &MockDevice, clock: &ManualClock) -> SlaveSession {
    Session::new(
        SlaveOpener {
            device: device.clone(),
            opens: 0,
        },
        clock.clone(),
        SessionPolicy::from_config(&SerialConfig::default()),
    )
}

#[test]
fn registers_round_trip_over_the_wire() {
    let device = MockDevice::closed();
    let clock = ManualClock::new();
    let mut s = session(&device, &clock);

    s.write_angle(Register::LockSetpoint, 45.0).unwrap();
    assert_eq!(s.read_register(Register::LockReadback), Ok(450));
    assert_eq!(s.read_angle(Register::WindowReadback), Ok(77.0));
    assert_eq!(
        device.model().log[0],
        Access::Write(Register::LockSetpoint, 450)
    );
}

#[test]
fn open_and_close_sequences_over_modbus() {
    let device = MockDevice::closed();
    let clock = ManualClock::new();
    let cfg = WindowConfig::default();
    let mut ctrl = ActuatorController::new(
        session(&device, &clock),
        clock.clone(),
        cfg.clone(),
        ShutdownSignal::new(),
    );

    assert_eq!(ctrl.set_window_position(true, true), Ok(true));
    assert!((device.window_angle() - cfg.open_angle).abs() < 0.1);
    assert!((device.lock_angle() - cfg.lock_unlocked_angle).abs() < 0.1);

    clock.advance(Duration::from_secs(6));
    assert_eq!(ctrl.set_window_position(false, true), Ok(true));
    assert!((device.window_angle() - cfg.closed_angle).abs() < 0.1);
    assert!(ctrl.state().is_locked);
}

#[test]
fn unplugged_device_fails_then_reconnects() {
    let device = MockDevice::closed();
    let clock = ManualClock::new();
    let mut s = session(&device, &clock);
    s.connect().unwrap();

    device.set_offline(true);
    assert_eq!(
        s.read_register(Register::WindowReadback),
        Err(TransportError::Connection(ConnectionFault::Disconnected))
    );
    assert!(!s.is_connected());

    // Still unplugged: every retry fails and the session gives up.
    let err = s.read_register(Register::WindowReadback).unwrap_err();
    assert!(matches!(
        err,
        TransportError::Connection(ConnectionFault::RetriesExhausted { attempts: 5 })
    ));

    device.set_offline(false);
    assert_eq!(s.read_register(Register::WindowReadback), Ok(770));
    assert!(s.is_connected());
}

#[test]
fn unplugged_before_close_aborts_without_locking() {
    let device = MockDevice::closed();
    let clock = ManualClock::new();
    let cfg = WindowConfig::default();
    let mut s = session(&device, &clock);
    let cancel = ShutdownSignal::new();

    Motion::new(&mut s, &clock, &cancel, &cfg).open().unwrap();
    device.clear_log();

    device.set_offline(true);
    let err = Motion::new(&mut s, &clock, &cancel, &cfg)
        .close()
        .unwrap_err();
    assert!(matches!(
        err,
        ActuatorError::Transport(TransportError::Connection(_))
    ));
    assert!(device.model().log.is_empty());
    assert!((device.window_angle() - cfg.open_angle).abs() < 0.1);
}

#[test]
fn reconnect_opens_a_fresh_link() {
    let device = MockDevice::closed();
    let clock = ManualClock::new();
    let mut opener = SlaveOpener {
        device: device.clone(),
        opens: 0,
    };
    opener.open().unwrap();
    assert_eq!(opener.opens, 1);

    let mut s = session(&device, &clock);
    s.read_register(Register::WindowReadback).unwrap();
    s.close();
    s.read_register(Register::WindowReadback).unwrap();
    assert!(s.is_connected());
}
