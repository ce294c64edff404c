//! Capture-to-artifact pipeline.
//!
//! Each captured page load is replayed through the detector and aggregated
//! into an [`IterationRecord`]; the records are reduced and scored into one
//! [`BenchmarkArtifact`].

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{Config, TechStackConfig};
use crate::detection::{replay_trace, DetectorSettings};
use crate::metrics::{
    aggregate, AggregatorInput, AggregatorSettings, IterationCapture, IterationRecord,
};
use crate::network::hostname_of;
use crate::scoring::{self, AppMetadata, ScoreReport};
use crate::stats::{self, AggregateMetrics, ReduceError, RunSummary};

/// Run-level metadata stored in the artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub name: String,
    /// Iterations that produced a record
    pub iterations: usize,
    pub requested_iterations: u32,
    /// RFC 3339
    pub timestamp: String,
    pub baseline: bool,
    pub tech_stack: TechStackConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
}

/// One JSON document per run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkArtifact {
    pub metadata: ArtifactMetadata,
    pub iterations: Vec<IterationRecord>,
    pub summary: RunSummary,
    pub averages: AggregateMetrics,
    pub score: ScoreReport,
}

/// Turn one captured page load into its iteration record
pub fn process_capture(
    iteration: u32,
    capture: &IterationCapture,
    detector: &DetectorSettings,
    settings: &AggregatorSettings,
) -> IterationRecord {
    let banner = replay_trace(detector.clone(), &capture.trace);
    debug!(
        "Iteration {}: banner detected={} selector={:?} render={:.0}ms",
        iteration, banner.detected, banner.selector, banner.render_offset_ms
    );

    let page_host = hostname_of(&capture.page_url).unwrap_or_else(|| {
        warn!(
            "Iteration {}: page URL '{}' has no hostname, every request counts as third-party",
            iteration, capture.page_url
        );
        String::new()
    });
    let input = AggregatorInput {
        iteration,
        page_host: &page_host,
        vitals: &capture.vitals,
        banner: &banner,
        network: &capture.network,
        resources: &capture.resources,
    };
    aggregate(&input, settings)
}

/// Reduce and score finished iteration records
pub fn build_artifact(
    config: &Config,
    records: Vec<IterationRecord>,
    page_url: Option<String>,
) -> Result<BenchmarkArtifact, ReduceError> {
    let summary = stats::reduce(&records, &config.stats)?;
    let averages = summary.averages();
    let meta = AppMetadata::from_config(config);
    let score = scoring::score(&averages, &meta);

    info!(
        "Scored {}: {}/100 ({}) over {} iterations",
        config.name,
        score.total_score,
        score.grade,
        records.len()
    );

    Ok(BenchmarkArtifact {
        metadata: ArtifactMetadata {
            name: config.name.clone(),
            iterations: records.len(),
            requested_iterations: config.iterations,
            timestamp: Utc::now().to_rfc3339(),
            baseline: config.baseline,
            tech_stack: config.tech_stack.clone(),
            page_url,
        },
        iterations: records,
        summary,
        averages,
        score,
    })
}

/// Full offline pipeline over previously captured telemetry
pub fn process_captures(
    config: &Config,
    captures: &[IterationCapture],
) -> Result<BenchmarkArtifact, ReduceError> {
    let detector = DetectorSettings::from_config(config);
    let settings = AggregatorSettings::from_config(config);

    let records: Vec<IterationRecord> = captures
        .iter()
        .zip(1u32..)
        .map(|(capture, iteration)| process_capture(iteration, capture, &detector, &settings))
        .collect();

    let page_url = captures
        .iter()
        .map(|c| c.page_url.as_str())
        .find(|u| !u.is_empty())
        .map(str::to_string);
    build_artifact(config, records, page_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CookieBannerConfig, DetectionConfig, RunnerConfig, SourceConfig, StatsConfig,
    };
    use crate::detection::{CheckTrigger, ElementSnapshot, ProbeSample, Rect, Visibility};
    use crate::metrics::VitalsSnapshot;
    use crate::scoring::{Category, Grade};
    use std::collections::BTreeMap;

    fn config(baseline: bool) -> Config {
        Config {
            name: "example-app".to_string(),
            iterations: 2,
            baseline,
            cookie_banner: CookieBannerConfig {
                selectors: vec!["#cookie-banner".to_string()],
                service_hosts: vec!["cdn.vendor.example".to_string()],
                service_name: Some("Vendor".to_string()),
            },
            tech_stack: TechStackConfig::default(),
            detection: DetectionConfig::default(),
            runner: RunnerConfig::default(),
            stats: StatsConfig::default(),
            company: None,
            source: SourceConfig::default(),
            remote: None,
        }
    }

    fn banner_capture(render_at: f64) -> IterationCapture {
        let element = ElementSnapshot {
            rect: Rect {
                x: 0.0,
                y: 620.0,
                width: 1280.0,
                height: 100.0,
            },
            visibility: Visibility::Visible,
            display_none: false,
            opacity: 1.0,
            controls: Vec::new(),
        };
        let mut capture = IterationCapture {
            page_url: "http://localhost:3000/".to_string(),
            vitals: VitalsSnapshot {
                time_to_first_byte_ms: Some(20.0),
                first_contentful_paint_ms: Some(90.0),
                ..Default::default()
            },
            ..Default::default()
        };
        capture.trace.samples = vec![
            ProbeSample {
                at_ms: 0.0,
                trigger: CheckTrigger::Ready,
                elements: BTreeMap::new(),
            },
            ProbeSample {
                at_ms: render_at,
                trigger: CheckTrigger::Mutation,
                elements: BTreeMap::from([("#cookie-banner".to_string(), element)]),
            },
        ];
        capture
    }

    #[test]
    fn test_process_captures_numbers_iterations() {
        let captures = vec![banner_capture(60.0), banner_capture(80.0)];
        let artifact = process_captures(&config(false), &captures).unwrap();
        assert_eq!(artifact.metadata.iterations, 2);
        assert_eq!(artifact.iterations[0].iteration, 1);
        assert_eq!(artifact.iterations[1].iteration, 2);
        assert!(artifact.averages.banner_detected);
        assert_eq!(artifact.averages.banner_render_ms, 70.0);
        assert_eq!(artifact.metadata.page_url.as_deref(), Some("http://localhost:3000/"));
        assert!(chrono::DateTime::parse_from_rfc3339(&artifact.metadata.timestamp).is_ok());
    }

    #[test]
    fn test_no_captures_is_an_error() {
        let err = process_captures(&config(false), &[]).unwrap_err();
        assert!(matches!(err, ReduceError::NoIterations));
    }

    #[test]
    fn test_missing_banner_scores_zero_ux() {
        let captures = vec![IterationCapture::default(), IterationCapture::default()];
        let artifact = process_captures(&config(false), &captures).unwrap();
        assert!(!artifact.averages.banner_detected);
        let ux = artifact.score.category(Category::UserExperience).unwrap();
        assert_eq!(ux.score, 0.0);
    }

    #[test]
    fn test_page_host_decides_first_party_sizes() {
        let mut capture = banner_capture(60.0);
        capture.resources = vec![crate::metrics::ResourceTimingEntry {
            name: "http://localhost:3000/app.js".to_string(),
            initiator_type: "script".to_string(),
            transfer_size: 2048.0,
            ..Default::default()
        }];
        let detector = DetectorSettings::from_config(&config(false));
        let settings = AggregatorSettings::from_config(&config(false));

        let record = process_capture(1, &capture, &detector, &settings);
        assert_eq!(record.size.third_party_kb, 0.0);

        // Without a page host nothing can match, so the same script is third-party
        capture.page_url.clear();
        let record = process_capture(1, &capture, &detector, &settings);
        assert_eq!(record.size.third_party_kb, 2.0);
    }

    #[test]
    fn test_baseline_artifact() {
        let captures = vec![IterationCapture::default()];
        let artifact = process_captures(&config(true), &captures).unwrap();
        assert!(artifact.metadata.baseline);
        assert_eq!(artifact.score.total_score, 100);
        assert_eq!(artifact.score.grade, Grade::Excellent);
    }
}
