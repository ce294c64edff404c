//! Per-category scoring against fixed threshold bands.
//!
//! Every sub-metric awards a fraction of its maximum points according to
//! the first band its value falls into; values past the last band get the
//! floor (zero). Missing inputs score zero but never fail scoring.

use crate::config::BundleType;
use crate::stats::AggregateMetrics;

use super::types::{Category, CategoryScore, SubMetricScore};
use super::AppMetadata;

/// Upper bound (inclusive), fraction of max points, qualitative reason
type Band = (f64, f64, &'static str);

const FCP_BANDS: &[Band] = &[
    (100.0, 1.0, "excellent first paint"),
    (300.0, 0.85, "fast first paint"),
    (600.0, 0.65, "acceptable first paint"),
    (1000.0, 0.4, "slow first paint"),
    (1800.0, 0.2, "very slow first paint"),
];

const LCP_BANDS: &[Band] = &[
    (100.0, 1.0, "excellent largest paint"),
    (300.0, 0.85, "fast largest paint"),
    (600.0, 0.65, "acceptable largest paint"),
    (1200.0, 0.4, "slow largest paint"),
    (2500.0, 0.2, "very slow largest paint"),
];

const CLS_BANDS: &[Band] = &[
    (0.01, 1.0, "stable layout"),
    (0.05, 0.8, "minor layout shift"),
    (0.1, 0.6, "noticeable layout shift"),
    (0.25, 0.3, "poor layout stability"),
];

const TBT_BANDS: &[Band] = &[
    (10.0, 1.0, "main thread free"),
    (50.0, 0.8, "little blocking"),
    (100.0, 0.6, "some blocking"),
    (300.0, 0.3, "heavy blocking"),
];

// TTI already carries the fixed readiness buffer
const TTI_BANDS: &[Band] = &[
    (1100.0, 1.0, "interactive almost immediately"),
    (1500.0, 0.8, "interactive quickly"),
    (2000.0, 0.6, "interactive with some delay"),
    (3000.0, 0.3, "slow to become interactive"),
];

const VENDOR_REQUEST_BANDS: &[Band] = &[
    (0.0, 1.0, "no runtime vendor requests"),
    (1.0, 0.7, "single runtime vendor request"),
    (3.0, 0.4, "several runtime vendor requests"),
    (f64::INFINITY, 0.1, "many runtime vendor requests"),
];

const TOTAL_SIZE_BANDS: &[Band] = &[
    (100.0, 1.0, "very light page"),
    (250.0, 0.8, "light page"),
    (500.0, 0.6, "moderate page weight"),
    (1000.0, 0.35, "heavy page"),
    (2000.0, 0.15, "very heavy page"),
];

const THIRD_PARTY_SIZE_BANDS: &[Band] = &[
    (0.0, 1.0, "no third-party bytes"),
    (20.0, 0.8, "minimal third-party bytes"),
    (50.0, 0.6, "moderate third-party bytes"),
    (100.0, 0.35, "heavy third-party bytes"),
    (250.0, 0.15, "very heavy third-party bytes"),
];

const VENDOR_SIZE_BANDS: &[Band] = &[
    (0.0, 1.0, "nothing loaded from the banner vendor"),
    (10.0, 0.8, "small vendor payload"),
    (30.0, 0.6, "moderate vendor payload"),
    (60.0, 0.35, "large vendor payload"),
    (120.0, 0.15, "very large vendor payload"),
];

const REQUEST_COUNT_BANDS: &[Band] = &[
    (10.0, 1.0, "few requests"),
    (20.0, 0.8, "modest request count"),
    (35.0, 0.6, "many requests"),
    (60.0, 0.3, "excessive requests"),
];

const BANNER_VISIBLE_BANDS: &[Band] = &[
    (100.0, 1.0, "banner readable immediately"),
    (300.0, 0.8, "banner readable quickly"),
    (600.0, 0.6, "banner readable with some delay"),
    (1000.0, 0.35, "banner slow to become readable"),
    (2000.0, 0.15, "banner very slow to become readable"),
];

const BANNER_INTERACTIVE_BANDS: &[Band] = &[
    (150.0, 1.0, "controls usable immediately"),
    (400.0, 0.8, "controls usable quickly"),
    (800.0, 0.6, "controls usable with some delay"),
    (1500.0, 0.3, "controls slow to become usable"),
];

const BANNER_SHIFT_BANDS: &[Band] = &[
    (0.0, 1.0, "banner causes no layout shift"),
    (0.01, 0.8, "banner causes negligible shift"),
    (0.05, 0.5, "banner shifts content"),
    (0.1, 0.25, "banner shifts content noticeably"),
];

const COVERAGE_BANDS: &[Band] = &[
    (15.0, 1.0, "unobtrusive banner"),
    (25.0, 0.75, "moderately sized banner"),
    (40.0, 0.5, "large banner"),
    (60.0, 0.25, "banner dominates the viewport"),
];

/// Lower-is-better scoring of `value` against `bands`
fn banded(
    name: &str,
    value: Option<f64>,
    unit: &str,
    max_points: f64,
    bands: &[Band],
) -> SubMetricScore {
    let Some(v) = value else {
        return SubMetricScore {
            name: name.to_string(),
            value: None,
            unit: unit.to_string(),
            points: 0.0,
            max_points,
            reason: "not reported".to_string(),
        };
    };

    let (points, reason) = bands
        .iter()
        .find(|(upto, _, _)| v <= *upto)
        .map(|(_, fraction, reason)| (max_points * fraction, *reason))
        .unwrap_or((0.0, "beyond acceptable range"));

    SubMetricScore {
        name: name.to_string(),
        value: Some(v),
        unit: unit.to_string(),
        points,
        max_points,
        reason: reason.to_string(),
    }
}

fn fixed(
    name: &str,
    value: Option<f64>,
    unit: &str,
    points: f64,
    max_points: f64,
    reason: &str,
) -> SubMetricScore {
    SubMetricScore {
        name: name.to_string(),
        value,
        unit: unit.to_string(),
        points,
        max_points,
        reason: reason.to_string(),
    }
}

pub fn score_performance(m: &AggregateMetrics) -> CategoryScore {
    CategoryScore::new(
        Category::Performance,
        vec![
            banded("First Contentful Paint", m.first_contentful_paint_ms, "ms", 20.0, FCP_BANDS),
            banded(
                "Largest Contentful Paint",
                m.largest_contentful_paint_ms,
                "ms",
                30.0,
                LCP_BANDS,
            ),
            banded("Cumulative Layout Shift", Some(m.cumulative_layout_shift), "", 20.0, CLS_BANDS),
            banded("Total Blocking Time", Some(m.total_blocking_time_ms), "ms", 15.0, TBT_BANDS),
            banded("Time to Interactive", Some(m.time_to_interactive_ms), "ms", 15.0, TTI_BANDS),
        ],
    )
}

pub fn score_bundle_strategy(m: &AggregateMetrics, meta: &AppMetadata) -> CategoryScore {
    let (fraction, reason) = match meta.bundle_type {
        BundleType::Bundled => (1.0, "banner compiled into the app bundle"),
        BundleType::Esm => (0.9, "banner shipped as a first-party ES module"),
        BundleType::Iife => (0.8, "banner shipped as a first-party script"),
        BundleType::Hybrid => (0.5, "first-party loader with vendor runtime"),
        BundleType::External => (0.2, "banner loaded from vendor servers"),
    };
    let bundle_type = fixed("Bundle Type", None, "", 40.0 * fraction, 40.0, reason);

    let vendor_requests = banded(
        "Runtime Vendor Requests",
        Some(m.banner_vendor_requests),
        "requests",
        30.0,
        VENDOR_REQUEST_BANDS,
    );

    let script_total = m.bundled_size_kb + m.banner_vendor_size_kb;
    let first_party_share = if script_total > 0.0 {
        m.bundled_size_kb / script_total
    } else {
        1.0
    };
    let (share_fraction, share_reason) = match first_party_share {
        s if s >= 0.9 => (1.0, "scripts almost entirely first-party"),
        s if s >= 0.7 => (0.8, "scripts mostly first-party"),
        s if s >= 0.5 => (0.6, "scripts split between app and vendor"),
        s if s >= 0.25 => (0.3, "scripts mostly from the vendor"),
        _ => (0.0, "scripts dominated by the vendor"),
    };
    let share = fixed(
        "First-Party Script Share",
        Some(first_party_share * 100.0),
        "%",
        30.0 * share_fraction,
        30.0,
        share_reason,
    );

    CategoryScore::new(Category::BundleStrategy, vec![bundle_type, vendor_requests, share])
}

pub fn score_network_impact(m: &AggregateMetrics) -> CategoryScore {
    CategoryScore::new(
        Category::NetworkImpact,
        vec![
            banded("Total Size", Some(m.total_size_kb), "KB", 30.0, TOTAL_SIZE_BANDS),
            banded(
                "Third-Party Size",
                Some(m.third_party_size_kb),
                "KB",
                25.0,
                THIRD_PARTY_SIZE_BANDS,
            ),
            banded(
                "Banner Vendor Size",
                Some(m.banner_vendor_size_kb),
                "KB",
                25.0,
                VENDOR_SIZE_BANDS,
            ),
            banded("Request Count", Some(m.request_count), "requests", 20.0, REQUEST_COUNT_BANDS),
        ],
    )
}

pub fn score_transparency(meta: &AppMetadata) -> CategoryScore {
    let verdict = &meta.open_source;
    let open_source = if verdict.is_open_source {
        fixed("Open Source", None, "", 50.0, 50.0, "source is openly available")
    } else {
        fixed("Open Source", None, "", 0.0, 50.0, "no evidence of open source")
    };

    let company = match &meta.company {
        Some(c) if !c.name.trim().is_empty() && c.website.is_some() => {
            fixed("Company Disclosure", None, "", 20.0, 20.0, "company and website disclosed")
        }
        Some(c) if !c.name.trim().is_empty() => {
            fixed("Company Disclosure", None, "", 15.0, 20.0, "company disclosed without website")
        }
        _ => fixed("Company Disclosure", None, "", 0.0, 20.0, "company not disclosed"),
    };

    let tech_stack = if meta.tech_stack_disclosed {
        fixed("Tech Stack Disclosure", None, "", 15.0, 15.0, "tech stack disclosed")
    } else {
        fixed("Tech Stack Disclosure", None, "", 0.0, 15.0, "tech stack not disclosed")
    };

    let repository = if meta.has_repository {
        fixed("Source Repository", None, "", 15.0, 15.0, "public repository linked")
    } else {
        fixed("Source Repository", None, "", 0.0, 15.0, "no repository linked")
    };

    CategoryScore::new(
        Category::Transparency,
        vec![open_source, company, tech_stack, repository],
    )
}

pub fn score_user_experience(m: &AggregateMetrics) -> CategoryScore {
    if !m.banner_detected {
        let missing = |name: &str, unit: &str, max: f64| {
            fixed(name, None, unit, 0.0, max, "banner not detected")
        };
        return CategoryScore::new(
            Category::UserExperience,
            vec![
                missing("Banner Visibility", "ms", 35.0),
                missing("Banner Interactivity", "ms", 25.0),
                missing("Banner Layout Shift", "", 20.0),
                missing("Viewport Coverage", "%", 20.0),
            ],
        );
    }

    let interactive = (m.banner_interactive_ms > 0.0).then_some(m.banner_interactive_ms);
    CategoryScore::new(
        Category::UserExperience,
        vec![
            banded(
                "Banner Visibility",
                Some(m.banner_visible_ms),
                "ms",
                35.0,
                BANNER_VISIBLE_BANDS,
            ),
            banded("Banner Interactivity", interactive, "ms", 25.0, BANNER_INTERACTIVE_BANDS),
            banded(
                "Banner Layout Shift",
                Some(m.banner_layout_shift),
                "",
                20.0,
                BANNER_SHIFT_BANDS,
            ),
            banded(
                "Viewport Coverage",
                Some(m.banner_viewport_coverage_percent),
                "%",
                20.0,
                COVERAGE_BANDS,
            ),
        ],
    )
}
