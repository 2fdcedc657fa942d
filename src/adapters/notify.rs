//! Notification adapters.
//!
//! - [`JsonLinesNotifier`]: writes each event as one JSON object per line
//!   to any writer (stdout in the runner), for a messaging bridge to pick up.
//! - [`RetryingNotifier`]: wraps any [`Notifier`] as an [`EventSink`];
//!   failed deliveries go into a [`RetryQueue`] and are re-sent by
//!   [`pump`](RetryingNotifier::pump) with exponential backoff.

use std::io::Write;
use std::time::Instant;

use log::{debug, error, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{Clock, ErrorKind, EventSink, Notifier, NotifyError, TelemetryPort};
use crate::retry::{RetryPolicy, RetryQueue};

/// Undelivered events kept for retry.
const PENDING_CAPACITY: usize = 32;

// ───────────────────────────────────────────────────────────────
// JSON lines
// ───────────────────────────────────────────────────────────────

pub struct JsonLinesNotifier<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesNotifier<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Notifier for JsonLinesNotifier<W> {
    fn send(&mut self, event: &AppEvent) -> Result<(), NotifyError> {
        let line = serde_json::to_string(event).map_err(|_| NotifyError::Encoding)?;
        writeln!(self.out, "{line}").map_err(|_| NotifyError::Unavailable)?;
        self.out.flush().map_err(|_| NotifyError::Unavailable)
    }
}

// ───────────────────────────────────────────────────────────────
// Retrying wrapper
// ───────────────────────────────────────────────────────────────

pub struct RetryingNotifier<N: Notifier, C: Clock, T: TelemetryPort> {
    inner: N,
    clock: C,
    telemetry: T,
    pending: RetryQueue<AppEvent, PENDING_CAPACITY>,
}

impl<N: Notifier, C: Clock, T: TelemetryPort> RetryingNotifier<N, C, T> {
    pub fn new(inner: N, clock: C, telemetry: T, policy: RetryPolicy) -> Self {
        Self {
            inner,
            clock,
            telemetry,
            pending: RetryQueue::new(policy),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut N {
        &mut self.inner
    }

    /// Re-send every event whose backoff has elapsed.
    pub fn pump(&mut self, now: Instant) {
        while let Some(entry) = self.pending.pop_due(now) {
            match self.inner.send(&entry.task) {
                Ok(()) => debug!("NOTIFY: delivered after {} retries", entry.attempts + 1),
                Err(e) => {
                    self.telemetry.record_error(ErrorKind::Network);
                    let attempt = entry.attempts + 1;
                    if let Err(event) = self.pending.retry_later(entry, now) {
                        error!("NOTIFY: dropping {:?} after {} retries: {}", event, attempt, e);
                    } else {
                        warn!("NOTIFY: retry {} failed: {}", attempt, e);
                    }
                }
            }
        }
    }
}

impl<N: Notifier, C: Clock, T: TelemetryPort> EventSink for RetryingNotifier<N, C, T> {
    fn emit(&mut self, event: &AppEvent) {
        match self.inner.send(event) {
            Ok(()) => {}
            Err(NotifyError::Encoding) => {
                error!("NOTIFY: cannot encode {:?}", event);
            }
            Err(e) => {
                self.telemetry.record_error(ErrorKind::Network);
                warn!("NOTIFY: send failed ({}), queued for retry", e);
                if !self.pending.push(event.clone(), self.clock.now()) {
                    error!("NOTIFY: retries disabled, {:?} lost", event);
                }
            }
        }
    }
}
