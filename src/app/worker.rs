//! Actuator worker: the single owner of the controller and the serial link.
//!
//! ```text
//!  frame path ──try_send──▶ CommandQueue ──▶ worker thread ──▶ ActuatorController
//!       ▲                                        │
//!       └──────────── StatusHandle ◀─────────────┤ (state, health, last outcome)
//!                                                └──▶ EventSink / TelemetryPort
//! ```
//!
//! Commands run strictly one at a time in arrival order. The frame path
//! never blocks on the queue: a full queue drops the command and the
//! presence timer re-issues it after the command cooldown.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use futures_lite::future::block_on;
use log::{debug, info, warn};

use crate::actuator::controller::ActuatorController;
use crate::actuator::{ActuatorStatus, CommandOutcome, OutcomeKind, StatusHandle};
use crate::error::ActuatorError;
use crate::shutdown::ShutdownSignal;
use crate::transport::RegisterPort;

use super::commands::{AppCommand, Command, CommandKind};
use super::events::AppEvent;
use super::ports::{Clock, ErrorKind, EventSink, TelemetryPort};

/// Command queue depth.
pub const COMMAND_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerMsg {
    Command(AppCommand),
    Shutdown,
}

pub type CommandQueue = Channel<CriticalSectionRawMutex, WorkerMsg, COMMAND_QUEUE_DEPTH>;

// ───────────────────────────────────────────────────────────────
// Worker
// ───────────────────────────────────────────────────────────────

pub struct Worker<P, C, T, S>
where
    P: RegisterPort,
    C: Clock,
    T: TelemetryPort,
    S: EventSink,
{
    controller: ActuatorController<P, C>,
    clock: C,
    status: StatusHandle,
    telemetry: T,
    sink: S,
    cancel: ShutdownSignal,
}

impl<P, C, T, S> Worker<P, C, T, S>
where
    P: RegisterPort,
    C: Clock,
    T: TelemetryPort,
    S: EventSink,
{
    /// `cancel` must be the signal the controller was built with.
    pub fn new(
        controller: ActuatorController<P, C>,
        clock: C,
        status: StatusHandle,
        telemetry: T,
        sink: S,
        cancel: ShutdownSignal,
    ) -> Self {
        let worker = Self {
            controller,
            clock,
            status,
            telemetry,
            sink,
            cancel,
        };
        worker.publish(None);
        worker
    }

    pub fn controller(&self) -> &ActuatorController<P, C> {
        &self.controller
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one message to completion and publish the result.
    pub fn handle(&mut self, msg: AppCommand) {
        let was_manual = self.controller.state().manual_mode;
        let outcome = match msg {
            AppCommand::Actuate(cmd) => Some(self.actuate(&cmd)),
            AppCommand::EnableAuto => {
                self.controller.enable_auto_control();
                None
            }
            AppCommand::DisableAuto => {
                self.controller.disable_auto_control();
                None
            }
        };

        let manual = self.controller.state().manual_mode;
        if manual != was_manual {
            self.sink.emit(&AppEvent::ModeChanged { manual });
        }
        self.publish(outcome);
    }

    /// Consume the queue until [`WorkerMsg::Shutdown`].
    ///
    /// Once the shutdown signal is raised, remaining commands are reported
    /// as skipped without touching the link.
    pub fn run(mut self, queue: &CommandQueue) {
        info!("WORKER: started");
        loop {
            match block_on(queue.receive()) {
                WorkerMsg::Shutdown => break,
                WorkerMsg::Command(AppCommand::Actuate(cmd)) if self.cancel.is_raised() => {
                    debug!("WORKER: {} #{} dropped, shutting down", cmd.kind, cmd.seq);
                    self.publish(Some(self.outcome(&cmd, OutcomeKind::Skipped)));
                }
                WorkerMsg::Command(msg) => self.handle(msg),
            }
        }
        info!("WORKER: stopped");
    }

    fn actuate(&mut self, cmd: &Command) -> CommandOutcome {
        let before = self.controller.state();
        let result = match self.controller.execute(cmd) {
            Ok(true) => {
                self.report_success(cmd, before.is_open);
                OutcomeKind::Executed
            }
            Ok(false) => OutcomeKind::Skipped,
            Err(e) => {
                self.report_failure(cmd, &e);
                OutcomeKind::Failed
            }
        };
        self.outcome(cmd, result)
    }

    fn outcome(&self, cmd: &Command, result: OutcomeKind) -> CommandOutcome {
        CommandOutcome {
            seq: cmd.seq,
            kind: cmd.kind,
            result,
            at: self.clock.now(),
        }
    }

    fn report_success(&mut self, cmd: &Command, was_open: bool) {
        let state = self.controller.state();
        if state.is_open != was_open {
            self.telemetry.record_window_change(state.is_open);
        }
        let reason = cmd.origin;
        let held = cmd.trigger.map(|t| t.held_secs);
        let event = match cmd.kind {
            CommandKind::Open => AppEvent::WindowOpened {
                reason,
                dwell_secs: held,
                confidence: cmd.trigger.and_then(|t| t.confidence),
            },
            CommandKind::Close => AppEvent::WindowClosed {
                reason,
                absence_secs: held,
            },
            CommandKind::SetAngle(_) => AppEvent::AngleSet {
                angle: state.current_angle,
                open: state.is_open,
                reason,
            },
            CommandKind::Lock | CommandKind::Unlock => AppEvent::LockChanged {
                locked: state.is_locked,
                reason,
            },
        };
        self.sink.emit(&event);
    }

    fn report_failure(&mut self, cmd: &Command, e: &ActuatorError) {
        self.telemetry.record_error(ErrorKind::Window);
        self.sink
            .emit(&AppEvent::error(format!("{} #{} failed: {}", cmd.kind, cmd.seq, e)));
    }

    fn publish(&self, outcome: Option<CommandOutcome>) {
        let last_outcome = outcome.or(self.status.get().last_outcome);
        self.status.set(ActuatorStatus {
            state: self.controller.state(),
            health: self.controller.health(),
            last_outcome,
        });
    }
}

// ───────────────────────────────────────────────────────────────
// Thread handle
// ───────────────────────────────────────────────────────────────

/// Frame-side handle to a running worker thread.
pub struct WorkerHandle {
    queue: Arc<CommandQueue>,
    status: StatusHandle,
    cancel: ShutdownSignal,
    thread: Option<JoinHandle<()>>,
}

/// Start `worker` on its own thread.
pub fn spawn_worker<P, C, T, S>(worker: Worker<P, C, T, S>) -> io::Result<WorkerHandle>
where
    P: RegisterPort + Send + 'static,
    C: Clock + Send + 'static,
    T: TelemetryPort + Send + 'static,
    S: EventSink + Send + 'static,
{
    let queue = Arc::new(CommandQueue::new());
    let status = worker.status.clone();
    let cancel = worker.cancel.clone();
    let rx = queue.clone();
    let thread = thread::Builder::new()
        .name("actuator".into())
        .spawn(move || worker.run(&rx))?;
    Ok(WorkerHandle {
        queue,
        status,
        cancel,
        thread: Some(thread),
    })
}

impl WorkerHandle {
    /// Queue a message without blocking. Returns `false` if it was dropped.
    pub fn submit(&self, msg: AppCommand) -> bool {
        if self.cancel.is_raised() {
            return false;
        }
        match self.queue.try_send(WorkerMsg::Command(msg)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("WORKER: queue full, dropping {:?}", msg);
                false
            }
        }
    }

    pub fn status(&self) -> ActuatorStatus {
        self.status.get()
    }

    /// Cancel any in-flight motion, drain the queue and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.cancel.raise();
        block_on(self.queue.send(WorkerMsg::Shutdown));
        if thread.join().is_err() {
            warn!("WORKER: thread panicked");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
