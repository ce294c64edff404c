//! Weighted scoring of reduced metrics.
//!
//! Five categories are each scored out of 100 and combined with fixed
//! weights into a 0–100 total and a letter grade. Scoring is a pure
//! function: identical inputs always give identical reports.

pub mod categories;
pub mod insights;
pub mod open_source;
pub mod types;

pub use open_source::{detect_open_source, OpenSourceRule, OpenSourceVerdict};
pub use types::*;

use crate::config::{BundleType, CompanyConfig, Config};
use crate::stats::AggregateMetrics;

/// Static metadata about the app under test
#[derive(Debug, Clone)]
pub struct AppMetadata {
    pub name: String,
    pub is_baseline: bool,
    pub bundle_type: BundleType,
    pub service_name: Option<String>,
    pub company: Option<CompanyConfig>,
    pub tech_stack_disclosed: bool,
    pub has_repository: bool,
    pub open_source: OpenSourceVerdict,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_baseline: false,
            bundle_type: BundleType::default(),
            service_name: None,
            company: None,
            tech_stack_disclosed: false,
            has_repository: false,
            open_source: detect_open_source("", &Default::default()),
        }
    }
}

impl AppMetadata {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.name.clone(),
            is_baseline: config.baseline,
            bundle_type: config.tech_stack.bundle_type,
            service_name: config.cookie_banner.service_name.clone(),
            company: config.company.clone(),
            tech_stack_disclosed: config.tech_stack.is_disclosed(),
            has_repository: config
                .source
                .repository
                .as_deref()
                .is_some_and(open_source::is_repository_link),
            open_source: detect_open_source(&config.name, &config.source),
        }
    }
}

/// The reference run: every category at full marks, by definition
fn baseline_report(meta: &AppMetadata) -> ScoreReport {
    let categories = Category::ALL
        .iter()
        .map(|&category| {
            CategoryScore::new(
                category,
                vec![SubMetricScore {
                    name: "Baseline".to_string(),
                    value: None,
                    unit: String::new(),
                    points: 100.0,
                    max_points: 100.0,
                    reason: "reference run, not judged".to_string(),
                }],
            )
        })
        .collect();

    ScoreReport {
        app_name: meta.name.clone(),
        is_baseline: true,
        total_score: 100,
        grade: Grade::Excellent,
        categories,
        open_source: meta.open_source.clone(),
        insights: vec![
            "Baseline reference run: scores of other runs are compared against this page".to_string(),
        ],
        recommendations: Vec::new(),
    }
}

/// Score a run
pub fn score(metrics: &AggregateMetrics, meta: &AppMetadata) -> ScoreReport {
    if meta.is_baseline {
        return baseline_report(meta);
    }

    let categories = vec![
        categories::score_performance(metrics),
        categories::score_bundle_strategy(metrics, meta),
        categories::score_network_impact(metrics),
        categories::score_transparency(meta),
        categories::score_user_experience(metrics),
    ];

    let weighted: f64 = categories.iter().map(CategoryScore::weighted).sum();
    let total_score = weighted.round().clamp(0.0, 100.0) as u32;
    let advice = insights::generate(&categories, metrics, meta);

    ScoreReport {
        app_name: meta.name.clone(),
        is_baseline: false,
        total_score,
        grade: Grade::from_score(total_score),
        categories,
        open_source: meta.open_source.clone(),
        insights: advice.insights,
        recommendations: advice.recommendations,
    }
}
