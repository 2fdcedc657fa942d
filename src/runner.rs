//! Detection runner: JSON lines in, actuator commands out.
//!
//! Each input line is either a frame of detections from the inference
//! collaborator or an operator control:
//!
//! ```text
//! {"width":640,"detections":[{"label":"cat","confidence":0.82,"x_min":100,"x_max":220}]}
//! {"control":"open"}            open | close | lock | unlock | auto | manual
//! {"control":"angle","angle":100}
//! ```
//!
//! A detection may say `"normalized":true|false` outright. Without the flag,
//! a box with `x_max <= 1.0` inside a frame wider than one pixel is taken
//! as already normalized.
//! Events go out on stdout as JSON lines through the notifier thread and
//! are logged on stderr.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future::block_on;
use log::{info, warn};
use serde::Deserialize;

use crate::actuator::ActuatorStatus;
use crate::adapters::channel_sink::ChannelSink;
use crate::adapters::log_sink::LogEventSink;
use crate::adapters::notify::{JsonLinesNotifier, RetryingNotifier};
use crate::app::commands::{AppCommand, Command, CommandKind};
use crate::app::events::AppEvent;
use crate::app::ports::{Clock, ErrorKind, EventSink, TelemetryPort};
use crate::app::service::AppService;
use crate::app::worker::WorkerHandle;
use crate::config::{NotifyConfig, SystemConfig};
use crate::diagnostics::Telemetry;
use crate::presence::DetectionSample;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;

/// Notifier thread wake-up period while idle.
const NOTIFY_POLL: Duration = Duration::from_millis(50);

/// How often a waiting [`LineFeed`] checks the stop signal.
const INPUT_POLL: Duration = Duration::from_millis(50);

/// Lines buffered between the reader thread and the frame path.
const LINE_QUEUE_DEPTH: usize = 16;

// ───────────────────────────────────────────────────────────────
// Input records
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InputLine {
    Control {
        control: ControlVerb,
        #[serde(default)]
        angle: Option<f32>,
    },
    Frame(FrameRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlVerb {
    Open,
    Close,
    Angle,
    Lock,
    Unlock,
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameRecord {
    pub width: u32,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub x_min: f32,
    pub x_max: f32,
    #[serde(default)]
    pub normalized: Option<bool>,
}

impl RawDetection {
    /// Whether `x_min`/`x_max` are fractions of the frame rather than pixels.
    pub fn is_normalized(&self, frame_width: u32) -> bool {
        self.normalized.unwrap_or(frame_width > 1 && self.x_max <= 1.0)
    }

    pub fn to_sample(&self, frame_width: u32) -> DetectionSample {
        if self.is_normalized(frame_width) {
            let center_x = (self.x_min + self.x_max) / 2.0;
            DetectionSample::new(&self.label, self.confidence, center_x, frame_width)
        } else {
            DetectionSample::from_pixel_bbox(
                &self.label,
                self.confidence,
                self.x_min,
                self.x_max,
                frame_width,
            )
        }
    }
}

impl FrameRecord {
    pub fn samples(&self) -> Vec<DetectionSample> {
        self.detections
            .iter()
            .map(|d| d.to_sample(self.width))
            .collect()
    }
}

/// Map an operator control line onto a worker message.
pub fn control_command(verb: ControlVerb, angle: Option<f32>) -> Option<AppCommand> {
    let actuate = |kind| Some(AppCommand::Actuate(Command::manual(kind)));
    match verb {
        ControlVerb::Open => actuate(CommandKind::Open),
        ControlVerb::Close => actuate(CommandKind::Close),
        ControlVerb::Angle => angle.and_then(|a| actuate(CommandKind::SetAngle(a))),
        ControlVerb::Lock => actuate(CommandKind::Lock),
        ControlVerb::Unlock => actuate(CommandKind::Unlock),
        ControlVerb::Auto => Some(AppCommand::EnableAuto),
        ControlVerb::Manual => Some(AppCommand::DisableAuto),
    }
}

// ───────────────────────────────────────────────────────────────
// Detector: frame path glue
// ───────────────────────────────────────────────────────────────

pub struct Detector<S: EventSink, C: Clock> {
    service: AppService,
    worker: WorkerHandle,
    telemetry: Arc<Telemetry>,
    sink: S,
    clock: C,
}

impl<S: EventSink, C: Clock> Detector<S, C> {
    pub fn new(
        config: &SystemConfig,
        worker: WorkerHandle,
        telemetry: Arc<Telemetry>,
        sink: S,
        clock: C,
    ) -> Self {
        Self {
            service: AppService::new(config),
            worker,
            telemetry,
            sink,
            clock,
        }
    }

    pub fn start(&mut self) {
        let auto = !self.worker.status().state.manual_mode;
        self.service.start(auto, &mut self.sink);
    }

    /// Run one frame. Returns the command handed to the worker, if any.
    pub fn handle_frame(&mut self, detections: &[DetectionSample]) -> Option<Command> {
        let now = self.clock.now();
        let status = self.worker.status();
        let cmd = self
            .service
            .on_frame(detections, now, &status, &self.telemetry, &mut self.sink)?;
        if !self.worker.submit(AppCommand::Actuate(cmd)) {
            self.service.command_dropped(&cmd, now);
            return None;
        }
        Some(cmd)
    }

    pub fn submit(&self, msg: AppCommand) -> bool {
        self.worker.submit(msg)
    }

    pub fn status(&self) -> ActuatorStatus {
        self.worker.status()
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn service(&self) -> &AppService {
        &self.service
    }

    /// Stop the worker (cancelling any motion) and emit `Stopped`.
    pub fn shutdown(mut self) {
        self.worker.shutdown();
        self.sink.emit(&AppEvent::Stopped);
    }
}

// ───────────────────────────────────────────────────────────────
// Line loop
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub controls: u64,
    pub malformed: u64,
}

/// Consume `lines` until they end or `stop` is raised.
///
/// A malformed line is logged and counted as a detection error; it never
/// ends the loop.
pub fn run_lines<L, S, C>(
    lines: L,
    detector: &mut Detector<S, C>,
    stats_interval: Duration,
    stop: &ShutdownSignal,
) -> io::Result<RunSummary>
where
    L: IntoIterator<Item = io::Result<String>>,
    S: EventSink,
    C: Clock,
{
    let mut summary = RunSummary::default();
    let mut last_stats = detector.clock.now();

    for line in lines {
        if stop.is_raised() {
            info!("RUN: stop requested");
            break;
        }
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match serde_json::from_str::<InputLine>(text) {
            Ok(InputLine::Frame(frame)) => {
                summary.frames += 1;
                detector.handle_frame(&frame.samples());
            }
            Ok(InputLine::Control { control, angle }) => match control_command(control, angle) {
                Some(msg) => {
                    summary.controls += 1;
                    info!("RUN: operator {:?}", control);
                    detector.submit(msg);
                }
                None => {
                    summary.malformed += 1;
                    warn!("RUN: {:?} needs an angle", control);
                    detector.telemetry.record_error(ErrorKind::Detection);
                }
            },
            Err(e) => {
                summary.malformed += 1;
                warn!("RUN: skipping malformed line: {}", e);
                detector.telemetry.record_error(ErrorKind::Detection);
            }
        }

        let now = detector.clock.now();
        if now.saturating_duration_since(last_stats) >= stats_interval {
            log_stats(&detector.telemetry);
            last_stats = now;
        }
    }
    Ok(summary)
}

pub fn log_stats(telemetry: &Telemetry) {
    match serde_json::to_string(&telemetry.snapshot()) {
        Ok(json) => info!("STATS | {}", json),
        Err(e) => warn!("STATS | cannot encode: {}", e),
    }
}

// ───────────────────────────────────────────────────────────────
// Input thread
// ───────────────────────────────────────────────────────────────

enum InputMsg {
    Line(String),
    Failed(io::Error),
    Eof,
}

type LineQueue = Channel<CriticalSectionRawMutex, InputMsg, LINE_QUEUE_DEPTH>;

/// Lines read on a background thread, so a blocked read never keeps the
/// frame path from seeing a raised stop signal.
///
/// The reader thread is detached: it may stay parked in `read` until the
/// process exits.
pub struct LineFeed {
    queue: Arc<LineQueue>,
    stop: ShutdownSignal,
    finished: bool,
}

/// Start reading `reader` on its own thread.
pub fn spawn_line_feed<R>(reader: R, stop: ShutdownSignal) -> io::Result<LineFeed>
where
    R: BufRead + Send + 'static,
{
    let queue = Arc::new(LineQueue::new());
    let tx = queue.clone();
    thread::Builder::new().name("input".into()).spawn(move || {
        for line in reader.lines() {
            let msg = match line {
                Ok(text) => InputMsg::Line(text),
                Err(e) => InputMsg::Failed(e),
            };
            block_on(tx.send(msg));
        }
        block_on(tx.send(InputMsg::Eof));
    })?;
    Ok(LineFeed {
        queue,
        stop,
        finished: false,
    })
}

impl Iterator for LineFeed {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<io::Result<String>> {
        while !self.finished {
            if self.stop.is_raised() {
                return None;
            }
            match self.queue.try_receive() {
                Ok(InputMsg::Line(text)) => return Some(Ok(text)),
                Ok(InputMsg::Failed(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Ok(InputMsg::Eof) => self.finished = true,
                Err(_) => thread::sleep(INPUT_POLL),
            }
        }
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Notifier thread
// ───────────────────────────────────────────────────────────────

/// Drain `events` into the log and a retrying JSON-lines notifier on `out`
/// until `done` is raised and the queue is empty.
pub fn spawn_notifier<W, C>(
    events: ChannelSink,
    out: W,
    clock: C,
    cfg: &NotifyConfig,
    telemetry: Arc<Telemetry>,
    done: ShutdownSignal,
) -> io::Result<JoinHandle<()>>
where
    W: Write + Send + 'static,
    C: Clock + Send + 'static,
{
    let policy = RetryPolicy::from_config(cfg);
    thread::Builder::new().name("notifier".into()).spawn(move || {
        let mut log = LogEventSink::new();
        let mut notifier =
            RetryingNotifier::new(JsonLinesNotifier::new(out), clock.clone(), telemetry, policy);
        loop {
            let mut idle = true;
            while let Some(event) = events.try_next() {
                idle = false;
                log.emit(&event);
                notifier.emit(&event);
            }
            notifier.pump(clock.now());
            if idle && done.is_raised() {
                break;
            }
            if idle {
                clock.sleep(NOTIFY_POLL);
            }
        }
        if notifier.pending() > 0 {
            warn!("NOTIFY: {} undelivered events dropped at exit", notifier.pending());
        }
    })
}
