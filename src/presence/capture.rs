//! Capture gate: at most one image capture per cooldown.

use std::time::{Duration, Instant};

use crate::config::CaptureConfig;

pub struct CaptureGate {
    enabled: bool,
    min_confidence: f32,
    cooldown: Duration,
    last: Option<Instant>,
}

impl CaptureGate {
    pub fn new(cfg: &CaptureConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            min_confidence: cfg.min_confidence,
            cooldown: Duration::from_secs(u64::from(cfg.cooldown_secs)),
            last: None,
        }
    }

    /// Whether this frame's best target confidence warrants a capture.
    pub fn should_capture(&mut self, confidence: Option<f32>, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(c) = confidence else {
            return false;
        };
        if c.is_nan() || c < self.min_confidence {
            return false;
        }
        if self
            .last
            .is_some_and(|t| now.saturating_duration_since(t) < self.cooldown)
        {
            return false;
        }
        self.last = Some(now);
        true
    }
}
