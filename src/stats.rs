//! Cross-iteration statistical reduction.
//!
//! Each metric is reduced with an outlier-trimmed mean so a single cold-start
//! iteration cannot dominate a small sample. Stability is judged by the
//! coefficient of variation; instability is reported, never fatal.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::StatsConfig;
use crate::metrics::IterationRecord;

/// Errors from reduction
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error("Cannot reduce a run with zero iterations")]
    NoIterations,
}

/// Metrics reduced across iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    TimeToFirstByte,
    FirstPaint,
    FirstContentfulPaint,
    LargestContentfulPaint,
    CumulativeLayoutShift,
    TotalBlockingTime,
    InteractionToNextPaint,
    TimeToInteractive,
    DomContentLoaded,
    DomComplete,
    LoadEvent,
    RegulatoryFrictionDelay,
    BannerRender,
    BannerVisible,
    BannerInteractive,
    BannerLayoutShift,
    BannerViewportCoverage,
    TotalSize,
    BundledSize,
    ThirdPartySize,
    BannerVendorSize,
    BannerVendorRequests,
    OtherThirdPartyRequests,
    RequestCount,
}

impl MetricKey {
    pub const ALL: [MetricKey; 24] = [
        MetricKey::TimeToFirstByte,
        MetricKey::FirstPaint,
        MetricKey::FirstContentfulPaint,
        MetricKey::LargestContentfulPaint,
        MetricKey::CumulativeLayoutShift,
        MetricKey::TotalBlockingTime,
        MetricKey::InteractionToNextPaint,
        MetricKey::TimeToInteractive,
        MetricKey::DomContentLoaded,
        MetricKey::DomComplete,
        MetricKey::LoadEvent,
        MetricKey::RegulatoryFrictionDelay,
        MetricKey::BannerRender,
        MetricKey::BannerVisible,
        MetricKey::BannerInteractive,
        MetricKey::BannerLayoutShift,
        MetricKey::BannerViewportCoverage,
        MetricKey::TotalSize,
        MetricKey::BundledSize,
        MetricKey::ThirdPartySize,
        MetricKey::BannerVendorSize,
        MetricKey::BannerVendorRequests,
        MetricKey::OtherThirdPartyRequests,
        MetricKey::RequestCount,
    ];

    /// Value of this metric in one iteration.
    ///
    /// `None` when the browser never reported it, or for banner metrics
    /// when the banner was not detected in that iteration.
    pub fn extract(&self, record: &IterationRecord) -> Option<f64> {
        let t = &record.timing;
        let banner = &record.banner;
        let detected = |v: f64| banner.detected.then_some(v);
        match self {
            MetricKey::TimeToFirstByte => t.time_to_first_byte_ms,
            MetricKey::FirstPaint => t.first_paint_ms,
            MetricKey::FirstContentfulPaint => t.first_contentful_paint_ms,
            MetricKey::LargestContentfulPaint => t.largest_contentful_paint_ms,
            MetricKey::CumulativeLayoutShift => Some(t.cumulative_layout_shift),
            MetricKey::TotalBlockingTime => Some(t.total_blocking_time_ms),
            MetricKey::InteractionToNextPaint => t.interaction_to_next_paint_ms,
            MetricKey::TimeToInteractive => Some(t.time_to_interactive_ms),
            MetricKey::DomContentLoaded => t.dom_content_loaded_ms,
            MetricKey::DomComplete => t.dom_complete_ms,
            MetricKey::LoadEvent => t.load_event_ms,
            MetricKey::RegulatoryFrictionDelay => t.regulatory_friction_delay_ms,
            MetricKey::BannerRender => detected(banner.render_time_ms),
            MetricKey::BannerVisible => detected(banner.visible_time_ms),
            MetricKey::BannerInteractive => {
                detected(banner.interactive_time_ms).filter(|v| *v > 0.0)
            }
            MetricKey::BannerLayoutShift => detected(banner.layout_shift),
            MetricKey::BannerViewportCoverage => detected(banner.viewport_coverage_percent),
            MetricKey::TotalSize => Some(record.size.total_kb),
            MetricKey::BundledSize => Some(record.size.bundled_kb),
            MetricKey::ThirdPartySize => Some(record.size.third_party_kb),
            MetricKey::BannerVendorSize => Some(record.third_party.banner_vendor.size_kb),
            MetricKey::BannerVendorRequests => {
                Some(record.third_party.banner_vendor.requests as f64)
            }
            MetricKey::OtherThirdPartyRequests => Some(record.third_party.other.requests as f64),
            MetricKey::RequestCount => Some(record.request_count() as f64),
        }
    }
}

/// Calculate mean of a slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Calculate median of a slice
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Percentile of a slice, taking the sample at `round(p/100 * (n-1))` in
/// sorted order. No interpolation between neighbours.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Mean after discarding `trim_percent` of samples from each tail.
///
/// With two or fewer samples, or a zero trim, this is the plain mean.
/// Otherwise at least one sample is dropped per tail and at least one
/// sample always survives. A constant slice returns its value exactly.
pub fn trimmed_mean(values: &[f64], trim_percent: f64) -> f64 {
    let n = values.len();
    let sorted = sorted(values);
    if n > 0 && sorted[0] == sorted[n - 1] {
        return sorted[0];
    }
    if n <= 2 || trim_percent <= 0.0 {
        return mean(values);
    }
    let by_percent = (n as f64 * trim_percent / 100.0).floor() as usize;
    let trim = by_percent.max(1).min((n - 1) / 2);
    mean(&sorted[trim..n - trim])
}

/// Coefficient of variation in percent; zero when the mean is zero
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    std_dev(values) * 100.0 / m.abs()
}

/// A metric is stable when its CV is strictly below the threshold
pub fn is_stable(cv_percent: f64, threshold_percent: f64) -> bool {
    cv_percent < threshold_percent
}

/// Reduced statistics for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub samples: usize,
    pub mean: f64,
    pub trimmed_mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    pub p99: f64,
    pub cv_percent: f64,
    pub stable: bool,
}

impl MetricSummary {
    pub fn from_values(values: &[f64], config: &StatsConfig) -> Self {
        let cv = coefficient_of_variation(values);
        Self {
            samples: values.len(),
            mean: mean(values),
            trimmed_mean: trimmed_mean(values, config.trim_percent),
            median: median(values),
            std_dev: std_dev(values),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            p95: percentile(values, 95.0),
            p99: percentile(values, 99.0),
            cv_percent: cv,
            stable: values.len() <= 1 || is_stable(cv, config.stability_threshold),
        }
    }
}

/// Reducer output over a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub iterations: usize,
    pub metrics: BTreeMap<MetricKey, MetricSummary>,
    /// Fraction of iterations in which the banner was detected
    pub banner_detection_rate: f64,
    pub unstable_metrics: Vec<MetricKey>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn get(&self, key: MetricKey) -> Option<&MetricSummary> {
        self.metrics.get(&key)
    }

    /// Trimmed mean of a metric, `None` if it was never reported
    pub fn value(&self, key: MetricKey) -> Option<f64> {
        self.get(key).map(|m| m.trimmed_mean)
    }

    /// Banner counts as present when detected in more than half the iterations
    pub fn banner_detected(&self) -> bool {
        self.banner_detection_rate > 0.5
    }

    /// Collapse the run into the averages the scoring engine consumes
    pub fn averages(&self) -> AggregateMetrics {
        let or_zero = |key| self.value(key).unwrap_or(0.0);
        let detected = self.banner_detected();
        let banner = |key| if detected { or_zero(key) } else { 0.0 };

        AggregateMetrics {
            first_contentful_paint_ms: self.value(MetricKey::FirstContentfulPaint),
            largest_contentful_paint_ms: self.value(MetricKey::LargestContentfulPaint),
            cumulative_layout_shift: or_zero(MetricKey::CumulativeLayoutShift),
            total_blocking_time_ms: or_zero(MetricKey::TotalBlockingTime),
            time_to_interactive_ms: or_zero(MetricKey::TimeToInteractive),
            time_to_first_byte_ms: self.value(MetricKey::TimeToFirstByte),
            regulatory_friction_delay_ms: self.value(MetricKey::RegulatoryFrictionDelay),
            banner_detected: detected,
            banner_render_ms: banner(MetricKey::BannerRender),
            banner_visible_ms: banner(MetricKey::BannerVisible),
            banner_interactive_ms: banner(MetricKey::BannerInteractive),
            banner_layout_shift: banner(MetricKey::BannerLayoutShift),
            banner_viewport_coverage_percent: banner(MetricKey::BannerViewportCoverage),
            total_size_kb: or_zero(MetricKey::TotalSize),
            bundled_size_kb: or_zero(MetricKey::BundledSize),
            third_party_size_kb: or_zero(MetricKey::ThirdPartySize),
            banner_vendor_size_kb: or_zero(MetricKey::BannerVendorSize),
            banner_vendor_requests: or_zero(MetricKey::BannerVendorRequests),
            other_third_party_requests: or_zero(MetricKey::OtherThirdPartyRequests),
            request_count: or_zero(MetricKey::RequestCount),
        }
    }
}

/// Run-level averages fed to the scoring engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    pub first_contentful_paint_ms: Option<f64>,
    pub largest_contentful_paint_ms: Option<f64>,
    pub cumulative_layout_shift: f64,
    pub total_blocking_time_ms: f64,
    pub time_to_interactive_ms: f64,
    pub time_to_first_byte_ms: Option<f64>,
    pub regulatory_friction_delay_ms: Option<f64>,
    pub banner_detected: bool,
    pub banner_render_ms: f64,
    pub banner_visible_ms: f64,
    pub banner_interactive_ms: f64,
    pub banner_layout_shift: f64,
    pub banner_viewport_coverage_percent: f64,
    pub total_size_kb: f64,
    pub bundled_size_kb: f64,
    pub third_party_size_kb: f64,
    pub banner_vendor_size_kb: f64,
    pub banner_vendor_requests: f64,
    pub other_third_party_requests: f64,
    pub request_count: f64,
}

/// Reduce the ordered iteration records of a run
pub fn reduce(
    records: &[IterationRecord],
    config: &StatsConfig,
) -> Result<RunSummary, ReduceError> {
    if records.is_empty() {
        return Err(ReduceError::NoIterations);
    }

    let mut metrics = BTreeMap::new();
    let mut unstable_metrics = Vec::new();
    let mut warnings = Vec::new();

    for key in MetricKey::ALL {
        let values: Vec<f64> = records.iter().filter_map(|r| key.extract(r)).collect();
        if values.is_empty() {
            continue;
        }

        let summary = MetricSummary::from_values(&values, config);
        if summary.samples > 1 && summary.cv_percent >= config.warning_threshold {
            let message = format!(
                "{:?} is unstable: CV {:.1}% over {} samples (mean {:.2}, trimmed {:.2})",
                key, summary.cv_percent, summary.samples, summary.mean, summary.trimmed_mean
            );
            warn!("{}", message);
            warnings.push(message);
        } else if !summary.stable {
            info!(
                "{:?} varies across iterations: CV {:.1}%",
                key, summary.cv_percent
            );
        }
        if !summary.stable {
            unstable_metrics.push(key);
        }
        metrics.insert(key, summary);
    }

    let detected = records.iter().filter(|r| r.banner.detected).count();
    let banner_detection_rate = detected as f64 / records.len() as f64;
    if detected > 0 && detected < records.len() {
        let message = format!(
            "Banner detected in only {} of {} iterations",
            detected,
            records.len()
        );
        warn!("{}", message);
        warnings.push(message);
    }

    Ok(RunSummary {
        iterations: records.len(),
        metrics,
        banner_detection_rate,
        unstable_metrics,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_mean_constant_array() {
        for value in [42.5, 0.1, 0.3, 1.1, 33.3, -7.7] {
            for n in 1..=12 {
                let values = vec![value; n];
                for trim in [0.0, 5.0, 10.0, 25.0, 49.0] {
                    assert_eq!(
                        trimmed_mean(&values, trim),
                        value,
                        "value={} n={} trim={}",
                        value,
                        n,
                        trim
                    );
                }
            }
        }
    }

    #[test]
    fn test_trimmed_mean_drops_outlier() {
        let values = [100.0, 100.0, 100.0, 100.0, 10_000.0];
        assert_eq!(trimmed_mean(&values, 10.0), 100.0);
        assert_eq!(mean(&values), 2080.0);
    }

    #[test]
    fn test_trimmed_mean_small_samples_untrimmed() {
        assert_eq!(trimmed_mean(&[10.0, 30.0], 10.0), 20.0);
        assert_eq!(trimmed_mean(&[7.0], 10.0), 7.0);
        assert_eq!(trimmed_mean(&[], 10.0), 0.0);
    }

    #[test]
    fn test_trimmed_mean_larger_trim() {
        // 20 samples at 10% trims two from each tail
        let mut values: Vec<f64> = (1..=20).map(f64::from).collect();
        values[0] = -1000.0;
        values[19] = 1000.0;
        let expected = (3..=18).map(f64::from).sum::<f64>() / 16.0;
        assert_eq!(trimmed_mean(&values, 10.0), expected);
    }

    #[test]
    fn test_stability_boundary_is_strict() {
        // mean 100, population stddev 15 -> CV exactly 15%
        let at_threshold = [85.0, 115.0];
        let cv = coefficient_of_variation(&at_threshold);
        assert_eq!(cv, 15.0);
        assert!(!is_stable(cv, 15.0));

        let below = [86.0, 114.0];
        let cv = coefficient_of_variation(&below);
        assert_eq!(cv, 14.0);
        assert!(is_stable(cv, 15.0));
    }

    #[test]
    fn test_percentiles_and_median() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(median(&values), 50.5);
        assert_eq!(percentile(&values, 95.0), 95.0);
        assert_eq!(percentile(&values, 99.0), 99.0);
        assert_eq!(percentile(&[3.0], 99.0), 3.0);
    }

    #[test]
    fn test_percentile_rounds_linear_index() {
        let values = [40.0, 10.0, 30.0, 20.0];
        // index round(0.5 * 3) = 2, where nearest rank would give 20
        assert_eq!(percentile(&values, 50.0), 30.0);
        // index round(0.25 * 3) = 1
        assert_eq!(percentile(&values, 25.0), 20.0);
        assert_eq!(percentile(&values, 0.0), 10.0);
        assert_eq!(percentile(&values, 100.0), 40.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_single_value_summary_is_stable() {
        let summary = MetricSummary::from_values(&[1234.0], &StatsConfig::default());
        assert_eq!(summary.trimmed_mean, 1234.0);
        assert_eq!(summary.std_dev, 0.0);
        assert!(summary.stable);
        assert_eq!(summary.min, 1234.0);
        assert_eq!(summary.max, 1234.0);
    }

    #[test]
    fn test_reduce_requires_iterations() {
        assert!(matches!(
            reduce(&[], &StatsConfig::default()),
            Err(ReduceError::NoIterations)
        ));
    }

    #[test]
    fn test_cv_zero_mean() {
        assert_eq!(coefficient_of_variation(&[0.0, 0.0, 0.0]), 0.0);
    }
}
