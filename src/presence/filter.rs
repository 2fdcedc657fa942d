//! ROI check, adaptive threshold and sliding-window debounce.
//!
//! A frame *qualifies* when it holds a target-label detection inside the
//! region of interest at or above the effective threshold. The filter keeps
//! the timestamps of qualifying frames from the last `filter_window` and
//! reports presence while that window is non-empty, so a dropout shorter
//! than the window does not break presence.

use std::time::{Duration, Instant};

use heapless::Deque;

use super::{DetectionSample, Label, label};
use crate::config::DetectionConfig;

/// Timestamps retained; at 30 fps this covers over 8 s of qualifying frames.
const WINDOW_CAPACITY: usize = 256;

pub struct PresenceFilter {
    target: Label,
    min_confidence: f32,
    open_factor: f32,
    left: f32,
    right: f32,
    window_len: Duration,
    window: Deque<Instant, WINDOW_CAPACITY>,
    last_confidence: Option<f32>,
    any_confidence: Option<f32>,
}

impl PresenceFilter {
    pub fn new(cfg: &DetectionConfig) -> Self {
        Self {
            target: label(&cfg.target_label),
            min_confidence: cfg.min_confidence,
            open_factor: cfg.open_threshold_factor,
            left: cfg.left_boundary,
            right: cfg.right_boundary,
            window_len: cfg.filter_window(),
            window: Deque::new(),
            last_confidence: None,
            any_confidence: None,
        }
    }

    /// Threshold in force: relaxed while the window is open so a cat
    /// standing in the opening is not lost to a slightly worse angle.
    pub fn effective_threshold(&self, window_open: bool) -> f32 {
        if window_open {
            self.min_confidence * self.open_factor
        } else {
            self.min_confidence
        }
    }

    pub fn in_roi(&self, center_x: f32) -> bool {
        center_x >= self.left && center_x <= self.right
    }

    /// Feed one frame. Returns the debounced presence.
    pub fn update(&mut self, detections: &[DetectionSample], now: Instant, window_open: bool) -> bool {
        let threshold = self.effective_threshold(window_open);
        let mut best_roi: Option<f32> = None;
        let mut best_any: Option<f32> = None;

        for d in detections.iter().filter(|d| d.label == self.target) {
            if d.confidence.is_nan() {
                continue;
            }
            best_any = Some(best_any.map_or(d.confidence, |b| b.max(d.confidence)));
            if d.confidence >= threshold && self.in_roi(d.center_x) {
                best_roi = Some(best_roi.map_or(d.confidence, |b| b.max(d.confidence)));
            }
        }

        self.prune(now);
        if best_roi.is_some() {
            if self.window.is_full() {
                self.window.pop_front();
            }
            // Cannot fail: a slot was just freed if needed.
            let _ = self.window.push_back(now);
        }
        self.last_confidence = best_roi;
        self.any_confidence = best_any;

        !self.window.is_empty()
    }

    /// Best qualifying in-ROI confidence on the last frame.
    pub fn last_confidence(&self) -> Option<f32> {
        self.last_confidence
    }

    /// Best target confidence on the last frame, threshold and ROI ignored.
    pub fn any_confidence(&self) -> Option<f32> {
        self.any_confidence
    }

    pub fn is_present(&self) -> bool {
        !self.window.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.window.front() {
            if now.saturating_duration_since(oldest) > self.window_len {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}
