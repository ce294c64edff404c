//! Core data types for per-iteration metrics.

use serde::{Deserialize, Serialize};

use crate::detection::{BannerObservation, ProbeTrace};
use crate::network::NetworkCapture;

/// Core Web Vitals and navigation timing as reported by the page.
///
/// `None` means the browser never reported the metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsSnapshot {
    pub time_to_first_byte_ms: Option<f64>,
    pub dom_content_loaded_ms: Option<f64>,
    pub dom_complete_ms: Option<f64>,
    pub load_event_ms: Option<f64>,
    pub first_paint_ms: Option<f64>,
    pub first_contentful_paint_ms: Option<f64>,
    pub largest_contentful_paint_ms: Option<f64>,
    pub cumulative_layout_shift: Option<f64>,
    pub total_blocking_time_ms: Option<f64>,
    pub interaction_to_next_paint_ms: Option<f64>,
}

/// A `resource` performance entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTimingEntry {
    pub name: String,
    #[serde(default)]
    pub initiator_type: String,
    /// Bytes over the wire; zero for cached or opaque cross-origin entries
    #[serde(default)]
    pub transfer_size: f64,
    #[serde(default)]
    pub encoded_body_size: f64,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub duration: f64,
}

impl ResourceTimingEntry {
    /// Best available byte count
    pub fn size_bytes(&self) -> f64 {
        if self.transfer_size > 0.0 {
            self.transfer_size
        } else {
            self.encoded_body_size.max(0.0)
        }
    }
}

/// Everything collected from one page load, before aggregation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationCapture {
    /// URL of the page under test; its host decides first vs third party
    #[serde(default)]
    pub page_url: String,
    #[serde(default)]
    pub vitals: VitalsSnapshot,
    #[serde(default)]
    pub trace: ProbeTrace,
    #[serde(default)]
    pub resources: Vec<ResourceTimingEntry>,
    #[serde(default)]
    pub network: NetworkCapture,
}

/// Resource category used for size breakdowns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Script,
    Stylesheet,
    Image,
    Font,
    Other,
}

impl ResourceKind {
    /// Classify a resource-timing entry by initiator and file extension
    pub fn classify(entry: &ResourceTimingEntry) -> Self {
        let path = entry
            .name
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let ext = path.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();

        match ext {
            "js" | "mjs" | "cjs" => return ResourceKind::Script,
            "css" => return ResourceKind::Stylesheet,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => return ResourceKind::Font,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico" => {
                return ResourceKind::Image
            }
            _ => {}
        }

        match entry.initiator_type.as_str() {
            "script" => ResourceKind::Script,
            "css" => ResourceKind::Stylesheet,
            "img" | "image" => ResourceKind::Image,
            _ => ResourceKind::Other,
        }
    }
}

/// Timing block of an iteration record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingMetrics {
    pub time_to_first_byte_ms: Option<f64>,
    pub dom_content_loaded_ms: Option<f64>,
    pub dom_complete_ms: Option<f64>,
    pub load_event_ms: Option<f64>,
    pub first_paint_ms: Option<f64>,
    pub first_contentful_paint_ms: Option<f64>,
    pub largest_contentful_paint_ms: Option<f64>,
    pub cumulative_layout_shift: f64,
    pub total_blocking_time_ms: f64,
    pub interaction_to_next_paint_ms: Option<f64>,
    /// Heuristic: latest readiness signal plus a fixed buffer
    pub time_to_interactive_ms: f64,
    /// Approximation: banner render minus TTFB, may be negative
    pub regulatory_friction_delay_ms: Option<f64>,
}

/// Size block of an iteration record, all in KiB
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeMetrics {
    pub total_kb: f64,
    /// First-party script bytes
    pub bundled_kb: f64,
    pub third_party_kb: f64,
    pub scripts_kb: f64,
    pub stylesheets_kb: f64,
    pub images_kb: f64,
    pub fonts_kb: f64,
    pub other_kb: f64,
    /// Bytes seen by request interception, for cross-checking
    pub network_observed_kb: f64,
}

/// One resource loaded during the iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub name: String,
    pub kind: ResourceKind,
    pub size_kb: f64,
    pub duration_ms: f64,
    pub start_ms: f64,
    pub is_third_party: bool,
    pub is_banner_vendor: bool,
}

/// Banner block: the observation reshaped for reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerMetrics {
    pub detected: bool,
    pub selector: Option<String>,
    pub render_time_ms: f64,
    pub visible_time_ms: f64,
    pub interactive_time_ms: f64,
    /// Visible minus render: time spent fading in
    pub fade_in_ms: f64,
    pub layout_shift: f64,
    pub viewport_coverage_percent: f64,
}

impl From<&BannerObservation> for BannerMetrics {
    fn from(obs: &BannerObservation) -> Self {
        Self {
            detected: obs.detected,
            selector: obs.selector.clone(),
            render_time_ms: obs.render_offset_ms,
            visible_time_ms: obs.visible_offset_ms,
            interactive_time_ms: obs.interactive_offset_ms,
            fade_in_ms: (obs.visible_offset_ms - obs.render_offset_ms).max(0.0),
            layout_shift: obs.layout_shift_delta,
            viewport_coverage_percent: obs.viewport_coverage_percent,
        }
    }
}

/// Request count, bytes and time for one traffic class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTotals {
    pub requests: u64,
    pub size_kb: f64,
    pub duration_ms: f64,
}

impl TrafficTotals {
    pub fn add(&mut self, size_kb: f64, duration_ms: f64) {
        self.requests += 1;
        self.size_kb += size_kb;
        self.duration_ms += duration_ms;
    }
}

/// Third-party block: banner vendor traffic vs everything else off-origin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThirdPartyMetrics {
    pub banner_vendor: TrafficTotals,
    pub other: TrafficTotals,
}

impl ThirdPartyMetrics {
    pub fn total_requests(&self) -> u64 {
        self.banner_vendor.requests + self.other.requests
    }
}

/// Canonical per-iteration output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    /// 1-based position in the run
    pub iteration: u32,
    pub timing: TimingMetrics,
    pub size: SizeMetrics,
    pub resources: Vec<ResourceRecord>,
    pub banner: BannerMetrics,
    pub third_party: ThirdPartyMetrics,
}

impl IterationRecord {
    pub fn request_count(&self) -> usize {
        self.resources.len()
    }

    pub fn script_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Script)
            .count()
    }
}
