//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each application event as one log
//! line. Always attached in the runner so events are visible even when the
//! notification channel is down.

use log::{error, info};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

fn secs(v: Option<f32>) -> String {
    v.map_or_else(|| "-".into(), |s| format!("{s:.1}s"))
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { auto } => {
                info!("START | auto_control={}", auto);
            }
            AppEvent::WindowOpened {
                reason,
                dwell_secs,
                confidence,
            } => {
                info!(
                    "WINDOW | opened ({:?}) | dwell={} | conf={}",
                    reason,
                    secs(*dwell_secs),
                    confidence.map_or_else(|| "-".into(), |c| format!("{c:.2}"))
                );
            }
            AppEvent::WindowClosed {
                reason,
                absence_secs,
            } => {
                info!(
                    "WINDOW | closed ({:?}) | absence={}",
                    reason,
                    secs(*absence_secs)
                );
            }
            AppEvent::AngleSet {
                angle,
                open,
                reason,
            } => {
                info!("WINDOW | angle={:.1} open={} ({:?})", angle, open, reason);
            }
            AppEvent::LockChanged { locked, reason } => {
                info!(
                    "LOCK | {} ({:?})",
                    if *locked { "locked" } else { "unlocked" },
                    reason
                );
            }
            AppEvent::ModeChanged { manual } => {
                info!("MODE | {}", if *manual { "manual" } else { "automatic" });
            }
            AppEvent::CaptureRequested { confidence } => {
                info!("CAPTURE | conf={:.2}", confidence);
            }
            AppEvent::Error { message } => {
                error!("ERROR | {}", message);
            }
            AppEvent::Stopped => {
                info!("STOP | shutting down");
            }
        }
    }
}
