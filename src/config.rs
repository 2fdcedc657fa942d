//! System configuration parameters
//!
//! All tunable parameters for the window controller. Values are loaded from
//! a JSON file through [`ConfigPort`](crate::app::ports::ConfigPort); any
//! field missing from the file takes its default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub detection: DetectionConfig,
    pub capture: CaptureConfig,
    pub window: WindowConfig,
    pub serial: SerialConfig,
    pub notify: NotifyConfig,
    /// Where the runner writes its telemetry snapshot on shutdown.
    pub stats_path: Option<String>,
    /// Telemetry summary log interval for the runner (seconds).
    pub stats_interval_secs: u32,
}

// --- Detection ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detection label that counts as presence.
    pub target_label: String,
    /// Minimum confidence while the window is closed.
    pub min_confidence: f32,
    /// Threshold multiplier applied while the window is open.
    pub open_threshold_factor: f32,
    /// Continuous presence needed before opening (seconds).
    pub required_detection_secs: u32,
    /// Continuous absence needed before closing (seconds).
    pub required_no_detection_secs: u32,
    /// Sliding debounce window (milliseconds).
    pub filter_window_ms: u32,
    /// Region of interest, normalized horizontal bounds.
    pub left_boundary: f32,
    pub right_boundary: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            target_label: "cat".into(),
            min_confidence: 0.7,
            open_threshold_factor: 0.8,
            required_detection_secs: 10,
            required_no_detection_secs: 3,
            filter_window_ms: 3000,
            left_boundary: 0.0,
            right_boundary: 0.5,
        }
    }
}

impl DetectionConfig {
    pub fn required_detection(&self) -> Duration {
        Duration::from_secs(u64::from(self.required_detection_secs))
    }

    pub fn required_no_detection(&self) -> Duration {
        Duration::from_secs(u64::from(self.required_no_detection_secs))
    }

    pub fn filter_window(&self) -> Duration {
        Duration::from_millis(u64::from(self.filter_window_ms))
    }
}

// --- Capture ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub min_confidence: f32,
    pub cooldown_secs: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.7,
            cooldown_secs: 30,
        }
    }
}

// --- Window / lock mechanics ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Leaf angle when fully closed (degrees).
    pub closed_angle: f32,
    /// Leaf angle used by the open sequence.
    pub open_angle: f32,
    /// Mechanical limit of the leaf; direct CLI moves may go up to here.
    pub max_angle: f32,
    pub lock_locked_angle: f32,
    pub lock_unlocked_angle: f32,
    /// Minimum spacing between two executed commands (seconds).
    pub command_cooldown_secs: u32,
    /// Pause between the leaf and lock stages (milliseconds).
    pub settle_ms: u32,
    /// Leaf readback tolerance (degrees).
    pub window_tolerance: f32,
    /// Lock readback tolerance (degrees).
    pub lock_tolerance: f32,
    pub move_timeout_secs: u32,
    pub poll_interval_ms: u32,
    /// Leave manual mode automatically after this long. `None` stays manual
    /// until auto control is re-enabled.
    pub manual_timeout_secs: Option<u32>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            closed_angle: 77.0,
            open_angle: 120.0,
            max_angle: 135.0,
            lock_locked_angle: 0.0,
            lock_unlocked_angle: 90.0,
            command_cooldown_secs: 5,
            settle_ms: 1000,
            window_tolerance: 0.1,
            lock_tolerance: 5.0,
            move_timeout_secs: 30,
            poll_interval_ms: 100, // 10 Hz
            manual_timeout_secs: None,
        }
    }
}

impl WindowConfig {
    pub fn command_cooldown(&self) -> Duration {
        Duration::from_secs(u64::from(self.command_cooldown_secs))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(u64::from(self.settle_ms))
    }

    pub fn move_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.move_timeout_secs))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    pub fn manual_timeout(&self) -> Option<Duration> {
        self.manual_timeout_secs
            .map(|s| Duration::from_secs(u64::from(s)))
    }

    /// Lock travel bounds as `(min, max)` whichever way round the lock is fitted.
    pub fn lock_limits(&self) -> (f32, f32) {
        let (a, b) = (self.lock_locked_angle, self.lock_unlocked_angle);
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Angle above which the leaf counts as open.
    pub fn open_hysteresis_angle(&self) -> f32 {
        self.closed_angle + 5.0
    }
}

// --- Serial link ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub slave_id: u8,
    pub response_timeout_ms: u32,
    pub connect_retries: u8,
    pub retry_delay_ms: u32,
    /// Try a sysfs USB unbind/rebind between connect attempts.
    pub usb_reset: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyCAT".into(),
            baud_rate: 115_200,
            slave_id: 1,
            response_timeout_ms: 2000,
            connect_retries: 5,
            retry_delay_ms: 2000,
            usb_reset: true,
        }
    }
}

impl SerialConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.response_timeout_ms))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.retry_delay_ms))
    }
}

// --- Notifications ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u32,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 2,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            capture: CaptureConfig::default(),
            window: WindowConfig::default(),
            serial: SerialConfig::default(),
            notify: NotifyConfig::default(),
            stats_path: None,
            stats_interval_secs: 300, // 5 min
        }
    }
}

impl SystemConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.stats_interval_secs.max(1)))
    }

    /// Reject configurations that could drive the mechanism unsafely.
    ///
    /// Out-of-range values are refused, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if d.target_label.is_empty() || d.target_label.len() > crate::presence::LABEL_CAPACITY {
            return Err(ConfigError::ValidationFailed("detection.target_label"));
        }
        if !(0.0..=1.0).contains(&d.min_confidence) {
            return Err(ConfigError::ValidationFailed("detection.min_confidence"));
        }
        if !(d.open_threshold_factor > 0.0 && d.open_threshold_factor <= 1.0) {
            return Err(ConfigError::ValidationFailed("detection.open_threshold_factor"));
        }
        if !(0.0..=1.0).contains(&d.left_boundary)
            || !(0.0..=1.0).contains(&d.right_boundary)
            || d.left_boundary > d.right_boundary
        {
            return Err(ConfigError::ValidationFailed("detection.boundaries"));
        }
        if d.filter_window_ms == 0 {
            return Err(ConfigError::ValidationFailed("detection.filter_window_ms"));
        }
        if !(0.0..=1.0).contains(&self.capture.min_confidence) {
            return Err(ConfigError::ValidationFailed("capture.min_confidence"));
        }

        let w = &self.window;
        if !(w.closed_angle >= 0.0 && w.closed_angle < w.open_angle && w.open_angle <= w.max_angle)
        {
            return Err(ConfigError::ValidationFailed("window angles"));
        }
        // Register values are tenths of a degree in a u16.
        if w.max_angle * 10.0 > f32::from(u16::MAX) {
            return Err(ConfigError::ValidationFailed("window.max_angle"));
        }
        let (lock_min, lock_max) = w.lock_limits();
        if lock_min < 0.0 || lock_max * 10.0 > f32::from(u16::MAX) || lock_max - lock_min < f32::EPSILON {
            return Err(ConfigError::ValidationFailed("lock angles"));
        }
        if !(w.window_tolerance > 0.0) || !(w.lock_tolerance > 0.0) {
            return Err(ConfigError::ValidationFailed("window tolerances"));
        }
        if w.poll_interval_ms == 0 || w.move_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed("window polling"));
        }

        let s = &self.serial;
        if s.port.is_empty() || s.baud_rate == 0 {
            return Err(ConfigError::ValidationFailed("serial.port"));
        }
        if s.slave_id == 0 || s.slave_id > 247 {
            return Err(ConfigError::ValidationFailed("serial.slave_id"));
        }
        if s.connect_retries == 0 {
            return Err(ConfigError::ValidationFailed("serial.connect_retries"));
        }
        Ok(())
    }
}
