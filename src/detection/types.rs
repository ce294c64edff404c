//! Data types shared by the detector, the event loop and the probe trace.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{Config, DetectionConfig};

/// Milliseconds since navigation start
pub type OffsetMs = f64;

/// Result of banner detection for one page load.
///
/// Created once by the detector and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerObservation {
    pub detected: bool,
    pub selector: Option<String>,
    pub render_offset_ms: OffsetMs,
    pub visible_offset_ms: OffsetMs,
    /// Zero when no actionable control was ever seen
    pub interactive_offset_ms: OffsetMs,
    pub layout_shift_delta: f64,
    pub viewport_coverage_percent: f64,
}

impl BannerObservation {
    /// Observation for a page where no candidate ever rendered
    pub fn not_detected() -> Self {
        Self {
            detected: false,
            selector: None,
            render_offset_ms: 0.0,
            visible_offset_ms: 0.0,
            interactive_offset_ms: 0.0,
            layout_shift_delta: 0.0,
            viewport_coverage_percent: 0.0,
        }
    }

    /// Whether the offsets satisfy the ordering guarantees of a finished observation
    pub fn is_consistent(&self) -> bool {
        if !self.detected {
            return self.selector.is_none()
                && self.render_offset_ms == 0.0
                && self.visible_offset_ms == 0.0
                && self.interactive_offset_ms == 0.0;
        }
        self.render_offset_ms <= self.visible_offset_ms
            && (self.interactive_offset_ms == 0.0
                || self.interactive_offset_ms >= self.render_offset_ms)
    }
}

/// CSS `visibility` of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    Collapse,
}

/// Axis-aligned box in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Area of the part of this box that lies inside `viewport`
    pub fn visible_area(&self, viewport: &Viewport) -> f64 {
        let left = self.x.max(0.0);
        let top = self.y.max(0.0);
        let right = (self.x + self.width).min(viewport.width);
        let bottom = (self.y + self.height).min(viewport.height);
        (right - left).max(0.0) * (bottom - top).max(0.0)
    }
}

/// Browser viewport size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

impl Viewport {
    /// Share of the viewport covered by `rect`, clamped to the visible region
    pub fn coverage_percent(&self, rect: &Rect) -> f64 {
        let total = self.width * self.height;
        if total <= 0.0 {
            return 0.0;
        }
        (rect.visible_area(self) / total * 100.0).clamp(0.0, 100.0)
    }
}

/// Actionable descendant of a banner (button, link, role=button, onclick)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ControlSnapshot {
    pub rect: Rect,
    /// False once the control has been detached from layout
    #[serde(default = "default_true")]
    pub connected: bool,
}

fn default_true() -> bool {
    true
}

impl ControlSnapshot {
    pub fn is_actionable(&self) -> bool {
        self.connected && self.rect.has_area()
    }
}

/// Computed state of a candidate banner element at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub rect: Rect,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub display_none: bool,
    pub opacity: f64,
    #[serde(default)]
    pub controls: Vec<ControlSnapshot>,
}

impl ElementSnapshot {
    /// Laid out with a non-zero box and not force-hidden
    pub fn is_rendered(&self) -> bool {
        self.rect.has_area() && !self.display_none && self.visibility == Visibility::Visible
    }

    pub fn is_visible(&self, threshold: f64) -> bool {
        self.is_rendered() && self.opacity >= threshold
    }

    pub fn is_interactive(&self) -> bool {
        self.is_rendered() && self.controls.iter().any(ControlSnapshot::is_actionable)
    }
}

/// Time-indexed view of the page DOM.
///
/// `query` returns the state of the first element matching `selector` at
/// `at_ms`, or `None` when nothing matches.
pub trait DomView {
    fn query(&self, selector: &str, at_ms: OffsetMs) -> Option<ElementSnapshot>;

    fn viewport(&self) -> Viewport {
        Viewport::default()
    }
}

/// Tunables handed to both the Rust detector and the in-page probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorSettings {
    pub selectors: Vec<String>,
    pub poll_interval_ms: f64,
    pub timeout_ms: f64,
    pub visibility_threshold: f64,
}

impl DetectorSettings {
    pub fn new(selectors: Vec<String>, detection: &DetectionConfig) -> Self {
        Self {
            selectors,
            poll_interval_ms: duration_ms(detection.poll_interval),
            timeout_ms: duration_ms(detection.timeout),
            visibility_threshold: detection.visibility_threshold,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cookie_banner.selectors.clone(), &config.detection)
    }
}

pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
