//! The threaded runner: `Detector` on the frame side, `Worker` on its own
//! thread, both against the mock device.

use std::io::{BufRead, Cursor};
use std::sync::Arc;
use std::time::Duration;

use catwindow::actuator::controller::ActuatorController;
use catwindow::actuator::{ActuatorStatus, OutcomeKind, StatusHandle};
use catwindow::adapters::time::ManualClock;
use catwindow::app::commands::CommandKind;
use catwindow::app::events::AppEvent;
use catwindow::app::worker::{Worker, spawn_worker};
use catwindow::config::SystemConfig;
use catwindow::diagnostics::Telemetry;
use catwindow::presence::DetectionSample;
use catwindow::runner::{Detector, run_lines};
use catwindow::shutdown::ShutdownSignal;

use super::mock_device::{MockDevice, RecordingSink};

fn detector(
    device: &MockDevice,
    clock: &ManualClock,
    sink: &RecordingSink,
) -> Detector<RecordingSink, ManualClock> {
    let config = SystemConfig::default();
    let cancel = ShutdownSignal::new();
    let telemetry = Arc::new(Telemetry::new());
    let controller = ActuatorController::new(
        device.clone(),
        clock.clone(),
        config.window.clone(),
        cancel.clone(),
    );
    let worker = Worker::new(
        controller,
        clock.clone(),
        StatusHandle::new(ActuatorStatus::initial(&config.window)),
        telemetry.clone(),
        sink.clone(),
        cancel,
    );
    let handle = spawn_worker(worker).unwrap();
    Detector::new(&config, handle, telemetry, sink.clone(), clock.clone())
}

/// Poll in real time until `done` holds or two seconds pass.
fn wait_until(done: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn sustained_presence_opens_through_the_worker() {
    let device = MockDevice::closed();
    let clock = ManualClock::new();
    let sink = RecordingSink::default();
    let mut det = detector(&device, &clock, &sink);
    det.start();

    let cat = DetectionSample::from_pixel_bbox("cat", 0.8, 100.0, 220.0, 640);
    let mut issued = Vec::new();
    for _ in 0..120 {
        if let Some(cmd) = det.handle_frame(&[cat.clone()]) {
            issued.push(cmd.kind);
        }
        clock.advance(Duration::from_millis(100));
    }
    assert_eq!(issued, vec![CommandKind::Open]);

    assert!(wait_until(|| det
        .status()
        .last_outcome
        .is_some_and(|o| o.result == OutcomeKind::Executed)));
    assert!(det.status().state.is_open);
    assert!((device.window_angle() - 120.0).abs() < 0.1);
    assert_eq!(det.telemetry().snapshot().window_openings, 1);
    assert!(det.telemetry().snapshot().total_detections >= 100);

    det.shutdown();
    let events = sink.events();
    assert_eq!(events.first(), Some(&AppEvent::Started { auto: true }));
    assert_eq!(events.last(), Some(&AppEvent::Stopped));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, AppEvent::WindowOpened { .. }))
    );
}

#[test]
fn line_loop_counts_frames_controls_and_garbage() {
    let device = MockDevice::closed();
    let clock = ManualClock::new();
    let sink = RecordingSink::default();
    let mut det = detector(&device, &clock, &sink);
    det.start();

    let input = concat!(
        r#"{"width":640,"detections":[]}"#,
        "\n",
        "not json\n",
        "\n",
        r#"{"control":"angle"}"#,
        "\n",
        r#"{"control":"open"}"#,
        "\n",
    );
    let summary = run_lines(
        Cursor::new(input).lines(),
        &mut det,
        Duration::from_secs(60),
        &ShutdownSignal::new(),
    )
    .unwrap();
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.controls, 1);
    assert_eq!(summary.malformed, 2);
    assert_eq!(det.telemetry().snapshot().errors.detection, 2);

    assert!(wait_until(|| det.status().state.is_open));
    assert!(det.status().state.manual_mode);
    det.shutdown();

    let events = sink.events();
    assert!(events.contains(&AppEvent::ModeChanged { manual: true }));
}

#[test]
fn raised_stop_ends_the_loop_early() {
    let device = MockDevice::closed();
    let clock = ManualClock::new();
    let sink = RecordingSink::default();
    let mut det = detector(&device, &clock, &sink);

    let stop = ShutdownSignal::new();
    stop.raise();
    let summary = run_lines(
        Cursor::new("{\"width\":640}\n{\"width\":640}\n").lines(),
        &mut det,
        Duration::from_secs(60),
        &stop,
    )
    .unwrap();
    assert_eq!(summary.frames, 0);
    det.shutdown();
    assert!(device.writes().is_empty());
}
