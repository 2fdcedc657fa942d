//! Presence detection: per-frame samples in, open / close commands out.
//!
//! ```text
//!   DetectionSample[] ──▶ PresenceFilter ──▶ present? ──▶ PresenceTimer ──▶ Command
//!                               │
//!                               └──▶ CaptureGate ──▶ CaptureRequested
//! ```
//!
//! Everything here runs on the frame path: no I/O, no allocation, no
//! waiting on the actuator.

pub mod capture;
pub mod filter;
pub mod timer;

use std::time::Instant;

/// Maximum label length kept per detection.
pub const LABEL_CAPACITY: usize = 32;

pub type Label = heapless::String<LABEL_CAPACITY>;

/// Build a [`Label`], truncating at a char boundary when too long.
pub fn label(text: &str) -> Label {
    let mut out = Label::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// One object detection on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSample {
    pub label: Label,
    /// 0.0–1.0.
    pub confidence: f32,
    /// Bounding-box center, normalized to frame width.
    pub center_x: f32,
    pub frame_width: u32,
}

impl DetectionSample {
    pub fn new(label_text: &str, confidence: f32, center_x: f32, frame_width: u32) -> Self {
        Self {
            label: label(label_text),
            confidence,
            center_x,
            frame_width,
        }
    }

    /// Build from a pixel-space bounding box.
    ///
    /// A zero frame width yields a NaN center, which never lies in any ROI.
    pub fn from_pixel_bbox(
        label_text: &str,
        confidence: f32,
        x_min: f32,
        x_max: f32,
        frame_width: u32,
    ) -> Self {
        let center_x = if frame_width == 0 {
            f32::NAN
        } else {
            (x_min + x_max) / 2.0 / frame_width as f32
        };
        Self::new(label_text, confidence, center_x, frame_width)
    }
}

/// Dwell / absence timers. At most one is set at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceState {
    pub detection_since: Option<Instant>,
    pub absence_since: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// Nothing seen and the window is closed.
    AbsentIdle,
    /// Present, dwell timer running, window still closed.
    PresentCounting,
    /// Present and the window is open.
    PresentConfirmed,
    /// Absent, absence timer running, window still open.
    AbsentCounting,
}

impl PresenceState {
    /// Phase given whether the window currently reads open.
    pub fn phase(&self, window_open: bool) -> TimerPhase {
        match (self.detection_since, self.absence_since, window_open) {
            (Some(_), _, true) => TimerPhase::PresentConfirmed,
            (Some(_), _, false) => TimerPhase::PresentCounting,
            (None, Some(_), true) => TimerPhase::AbsentCounting,
            (None, _, _) => TimerPhase::AbsentIdle,
        }
    }
}
