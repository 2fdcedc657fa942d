//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService / ActuatorController (domain)
//! ```
//!
//! Driven adapters (serial link, clocks, event sinks, config files) implement
//! these traits. The domain core consumes them via generics, so it never
//! touches a device node or the wall clock directly.
//!
//! ## Notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **TelemetryPort** methods take `&self` so the frame path and the
//!   actuator worker can share one instance.
//! - The register-level actuator port lives in [`crate::transport::RegisterPort`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SystemConfig;

use super::events::AppEvent;

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time source. `sleep` lets tests substitute virtual time.
pub trait Clock: Clone {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / notification)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port. Adapters
/// decide where they go (log, JSON lines for a messaging bridge, channel
/// to another thread). `emit` must not block on the network.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &AppEvent) {
        (**self).emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Notification port (driven adapter: events → external messaging)
// ───────────────────────────────────────────────────────────────

/// A single delivery attempt to the external messaging collaborator.
/// Retries are layered on top by
/// [`RetryingNotifier`](crate::adapters::notify::RetryingNotifier).
pub trait Notifier {
    fn send(&mut self, event: &AppEvent) -> Result<(), NotifyError>;
}

// ───────────────────────────────────────────────────────────────
// Telemetry port
// ───────────────────────────────────────────────────────────────

/// Error buckets counted by telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Detection,
    Window,
    Network,
}

/// Fire-and-forget counters.
pub trait TelemetryPort {
    fn record_detection(&self, confidence: f32);

    fn record_window_change(&self, open: bool);

    fn record_image_capture(&self);

    fn record_error(&self, kind: ErrorKind);
}

impl<T: TelemetryPort + ?Sized> TelemetryPort for Arc<T> {
    fn record_detection(&self, confidence: f32) {
        (**self).record_detection(confidence);
    }

    fn record_window_change(&self, open: bool) {
        (**self).record_window_change(open);
    }

    fn record_image_capture(&self) {
        (**self).record_image_capture();
    }

    fn record_error(&self, kind: ErrorKind) {
        (**self).record_error(kind);
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting and after
/// loading. Invalid ranges are rejected with
/// [`ConfigError::ValidationFailed`], never silently clamped.
pub trait ConfigPort {
    /// Load configuration.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed to deserialize.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` names the field.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`Notifier`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// The collaborator could not be reached; worth retrying.
    Unavailable,
    /// The event could not be encoded; retrying will not help.
    Encoding,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "notification channel unavailable"),
            Self::Encoding => write!(f, "event encoding failed"),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for NotifyError {}
