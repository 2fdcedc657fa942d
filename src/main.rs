//! catwindow: cat-flap window controller.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                       │
//! │                                                                  │
//! │  SerialOpener    SysfsUsbReset   JsonConfigFile   SystemClock    │
//! │  (Link)          (UsbReset)      (ConfigPort)     (Clock)        │
//! │  LogEventSink    RetryingNotifier<JsonLinesNotifier>             │
//! │                                                                  │
//! │  ──────────────── Port Trait Boundary ─────────────────────      │
//! │                                                                  │
//! │  stdin frames ──▶ AppService ──CommandQueue──▶ actuator worker   │
//! │                   filter · timer              controller · Modbus│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `run` reads detection frames as JSON lines on stdin until EOF; the other
//! subcommands drive the mechanism once and exit.

#![deny(unused_must_use)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use catwindow::actuator::controller::ActuatorController;
use catwindow::actuator::sequence::{Manoeuvre, Motion};
use catwindow::actuator::{ActuatorStatus, StatusHandle};
use catwindow::adapters::channel_sink::{ChannelSink, EventQueue};
use catwindow::adapters::config_file::JsonConfigFile;
use catwindow::adapters::serial::SerialOpener;
use catwindow::adapters::time::SystemClock;
use catwindow::adapters::usb_reset::SysfsUsbReset;
use catwindow::app::ports::ConfigPort;
use catwindow::app::worker::{Worker, spawn_worker};
use catwindow::config::SystemConfig;
use catwindow::diagnostics::Telemetry;
use catwindow::runner::{Detector, log_stats, run_lines, spawn_line_feed, spawn_notifier};
use catwindow::shutdown::ShutdownSignal;
use catwindow::transport::session::{Session, SessionPolicy};

// ── CLI ───────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "catwindow")]
#[command(author, version, about = "Presence-driven cat window controller")]
struct Cli {
    /// JSON configuration file (defaults apply when absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read detection frames from stdin and drive the window automatically
    Run,
    /// Unlock, then open the window
    Open,
    /// Close the window, then lock it
    Close,
    /// Move the leaf to an angle (degrees, closed..=max)
    SetWindowAngle { angle: f32 },
    /// Move the lock to an angle (degrees, within lock travel)
    SetLockAngle { angle: f32 },
    /// Engage the lock
    Lock,
    /// Release the lock
    Unlock,
    /// Print the current readbacks as JSON
    Status,
}

type SerialSession = Session<SerialOpener, SystemClock>;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    let config = load_config(cli.config.as_deref())?;
    let clock = SystemClock;

    // Motion cancel for the worker, and the input loop's stop.
    let cancel = ShutdownSignal::new();
    let stop = ShutdownSignal::new();
    install_signal_handler(&stop, &cancel)?;

    match cli.command {
        Commands::Run => run(&config, clock, &stop, &cancel),
        one_shot => {
            let mut session = open_session(&config, clock);
            session
                .connect()
                .context("cannot reach the actuator controller")?;
            let result = one_shot_command(&one_shot, &config, &mut session, clock, &cancel);
            session.close();
            result
        }
    }
}

/// SIGINT / SIGTERM: cancel any motion in progress and end the input loop.
fn install_signal_handler(stop: &ShutdownSignal, cancel: &ShutdownSignal) -> Result<()> {
    let (stop, cancel) = (stop.clone(), cancel.clone());
    ctrlc::set_handler(move || {
        warn!("SIGNAL: shutdown requested");
        cancel.raise();
        stop.raise();
    })
    .context("installing signal handler")
}

fn load_config(path: Option<&std::path::Path>) -> Result<SystemConfig> {
    let Some(path) = path else {
        info!("CONFIG: no file given, using defaults");
        return Ok(SystemConfig::default());
    };
    JsonConfigFile::new(path)
        .load()
        .with_context(|| format!("loading {}", path.display()))
}

fn open_session(config: &SystemConfig, clock: SystemClock) -> SerialSession {
    let session = Session::new(
        SerialOpener::from_config(&config.serial),
        clock,
        SessionPolicy::from_config(&config.serial),
    );
    if config.serial.usb_reset {
        session.with_usb_reset(Box::new(SysfsUsbReset::new(&config.serial.port, clock)))
    } else {
        session
    }
}

// ── One-shot commands ─────────────────────────────────────────

fn manoeuvre(command: &Commands) -> Option<Manoeuvre> {
    match *command {
        Commands::Open => Some(Manoeuvre::Open),
        Commands::Close => Some(Manoeuvre::Close),
        Commands::SetWindowAngle { angle } => Some(Manoeuvre::WindowAngle(angle)),
        Commands::SetLockAngle { angle } => Some(Manoeuvre::LockAngle(angle)),
        Commands::Lock => Some(Manoeuvre::Lock),
        Commands::Unlock => Some(Manoeuvre::Unlock),
        Commands::Run | Commands::Status => None,
    }
}

fn one_shot_command(
    command: &Commands,
    config: &SystemConfig,
    session: &mut SerialSession,
    clock: SystemClock,
    cancel: &ShutdownSignal,
) -> Result<()> {
    let mut motion = Motion::new(session, &clock, cancel, &config.window);
    let readback = match manoeuvre(command) {
        Some(m) => {
            let rb = motion.perform(m)?;
            info!(
                "{:?} done: window {:.1}°, lock {:.1}°",
                m, rb.window_angle, rb.lock_angle
            );
            rb
        }
        None => motion.readback()?,
    };
    if matches!(command, Commands::Status) {
        println!("{}", serde_json::to_string(&readback)?);
    }
    Ok(())
}

// ── Detection runner ──────────────────────────────────────────

fn run(
    config: &SystemConfig,
    clock: SystemClock,
    stop: &ShutdownSignal,
    cancel: &ShutdownSignal,
) -> Result<()> {
    let telemetry = Arc::new(Telemetry::new());
    let notifier_done = ShutdownSignal::new();

    let events = ChannelSink::new(Arc::new(EventQueue::new()));
    let notifier = spawn_notifier(
        events.clone(),
        io::stdout(),
        clock,
        &config.notify,
        telemetry.clone(),
        notifier_done.clone(),
    )
    .context("starting notifier thread")?;

    let mut session = open_session(config, clock);
    if let Err(e) = session.connect() {
        // The session reconnects on the first command.
        warn!("RUN: actuator not reachable yet: {}", e);
    }
    let controller =
        ActuatorController::new(session, clock, config.window.clone(), cancel.clone());
    let worker = Worker::new(
        controller,
        clock,
        StatusHandle::new(ActuatorStatus::initial(&config.window)),
        telemetry.clone(),
        events.clone(),
        cancel.clone(),
    );
    let worker = spawn_worker(worker).context("starting actuator worker")?;

    let mut detector = Detector::new(config, worker, telemetry.clone(), events, clock);
    detector.start();
    let lines = spawn_line_feed(io::BufReader::new(io::stdin()), stop.clone())
        .context("starting input thread")?;
    let summary = run_lines(lines, &mut detector, config.stats_interval(), stop);
    if stop.is_raised() {
        info!("RUN: stopped by signal, shutting down");
    } else {
        info!("RUN: input closed, shutting down");
    }
    detector.shutdown();

    notifier_done.raise();
    if notifier.join().is_err() {
        warn!("RUN: notifier thread panicked");
    }

    log_stats(&telemetry);
    if let Some(path) = &config.stats_path {
        telemetry
            .save(std::path::Path::new(path))
            .with_context(|| format!("writing stats to {}", path))?;
    }

    let summary = summary.context("reading stdin")?;
    info!(
        "RUN: {} frames, {} controls, {} malformed lines",
        summary.frames, summary.controls, summary.malformed
    );
    Ok(())
}
