//! Runtime telemetry counters.
//!
//! One [`Telemetry`] instance is shared (behind `Arc`) by the frame path and
//! the actuator worker; every counter is an atomic so recording never
//! blocks. [`Telemetry::snapshot`] produces a serde-serialisable view for
//! the periodic log line and the on-shutdown stats file.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::app::ports::{ErrorKind, TelemetryPort};

/// Confidences are kept in thousandths to stay in integer atomics.
const CONF_SCALE: f32 = 1000.0;

pub struct Telemetry {
    started: Instant,
    detections: AtomicU64,
    confidence_sum: AtomicU64,
    confidence_min: AtomicU32,
    confidence_max: AtomicU32,
    openings: AtomicU64,
    closings: AtomicU64,
    captures: AtomicU64,
    errors_detection: AtomicU64,
    errors_window: AtomicU64,
    errors_network: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub detection: u64,
    pub window: u64,
    pub network: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub uptime_secs: u64,
    pub total_detections: u64,
    pub avg_confidence: Option<f32>,
    pub min_confidence: Option<f32>,
    pub max_confidence: Option<f32>,
    pub window_openings: u64,
    pub window_closings: u64,
    pub images_captured: u64,
    pub errors: ErrorCounts,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            detections: AtomicU64::new(0),
            confidence_sum: AtomicU64::new(0),
            confidence_min: AtomicU32::new(u32::MAX),
            confidence_max: AtomicU32::new(0),
            openings: AtomicU64::new(0),
            closings: AtomicU64::new(0),
            captures: AtomicU64::new(0),
            errors_detection: AtomicU64::new(0),
            errors_window: AtomicU64::new(0),
            errors_network: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let detections = self.detections.load(Ordering::Relaxed);
        let (avg, min, max) = if detections == 0 {
            (None, None, None)
        } else {
            let sum = self.confidence_sum.load(Ordering::Relaxed) as f32;
            (
                Some(sum / detections as f32 / CONF_SCALE),
                Some(self.confidence_min.load(Ordering::Relaxed) as f32 / CONF_SCALE),
                Some(self.confidence_max.load(Ordering::Relaxed) as f32 / CONF_SCALE),
            )
        };
        TelemetrySnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            total_detections: detections,
            avg_confidence: avg,
            min_confidence: min,
            max_confidence: max,
            window_openings: self.openings.load(Ordering::Relaxed),
            window_closings: self.closings.load(Ordering::Relaxed),
            images_captured: self.captures.load(Ordering::Relaxed),
            errors: ErrorCounts {
                detection: self.errors_detection.load(Ordering::Relaxed),
                window: self.errors_window.load(Ordering::Relaxed),
                network: self.errors_network.load(Ordering::Relaxed),
            },
        }
    }

    /// Write the snapshot as pretty JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, &self.snapshot()).map_err(io::Error::other)
    }
}

impl TelemetryPort for Telemetry {
    fn record_detection(&self, confidence: f32) {
        if confidence.is_nan() {
            return;
        }
        let milli = (confidence.clamp(0.0, 1.0) * CONF_SCALE).round() as u32;
        self.detections.fetch_add(1, Ordering::Relaxed);
        self.confidence_sum
            .fetch_add(u64::from(milli), Ordering::Relaxed);
        self.confidence_min.fetch_min(milli, Ordering::Relaxed);
        self.confidence_max.fetch_max(milli, Ordering::Relaxed);
    }

    fn record_window_change(&self, open: bool) {
        if open {
            self.openings.fetch_add(1, Ordering::Relaxed);
        } else {
            self.closings.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_image_capture(&self) {
        self.captures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::Detection => &self.errors_detection,
            ErrorKind::Window => &self.errors_window,
            ErrorKind::Network => &self.errors_network,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
