//! Advisory text generated from category scores and averages.
//!
//! Every check is independent and additive; none of them feeds back into
//! the numeric score.

use crate::config::BundleType;
use crate::stats::AggregateMetrics;

use super::types::{Category, CategoryScore};
use super::AppMetadata;

#[derive(Debug, Default)]
pub struct Advice {
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

fn score_of(categories: &[CategoryScore], category: Category) -> f64 {
    categories
        .iter()
        .find(|c| c.category == category)
        .map(|c| c.score)
        .unwrap_or(0.0)
}

pub fn generate(categories: &[CategoryScore], m: &AggregateMetrics, meta: &AppMetadata) -> Advice {
    let mut advice = Advice::default();
    let performance = score_of(categories, Category::Performance);
    let bundle = score_of(categories, Category::BundleStrategy);
    let network = score_of(categories, Category::NetworkImpact);
    let transparency = score_of(categories, Category::Transparency);
    let vendor = meta.service_name.as_deref().unwrap_or("the banner vendor");

    if performance >= 90.0 {
        advice
            .insights
            .push("Excellent core performance: the banner adds little paint or blocking cost".to_string());
    } else if performance < 60.0 {
        let lcp = m
            .largest_contentful_paint_ms
            .map(|v| format!("{:.0}ms", v))
            .unwrap_or_else(|| "not reported".to_string());
        advice
            .insights
            .push(format!("Page rendering is measurably delayed (LCP {})", lcp));
        advice.recommendations.push(
            "Defer non-essential scripts so the banner does not compete with the main content paint"
                .to_string(),
        );
    }

    if m.total_blocking_time_ms > 100.0 {
        advice.recommendations.push(format!(
            "Break up long tasks: {:.0}ms of main-thread blocking after first paint",
            m.total_blocking_time_ms
        ));
    }

    if bundle >= 80.0 {
        advice
            .insights
            .push("Banner code ships with the application bundle".to_string());
    } else if bundle < 50.0 {
        advice.insights.push(format!(
            "Banner depends on {:.0} runtime request(s) to {}",
            m.banner_vendor_requests, vendor
        ));
        if meta.bundle_type == BundleType::External || meta.bundle_type == BundleType::Hybrid {
            advice.recommendations.push(format!(
                "Bundle the consent banner with the application instead of loading it from {}",
                vendor
            ));
        }
    }

    if network < 60.0 {
        advice.recommendations.push(format!(
            "Reduce transferred bytes: {:.0}KB total, {:.0}KB from third parties",
            m.total_size_kb, m.third_party_size_kb
        ));
    }
    if m.banner_vendor_size_kb > 30.0 {
        advice.insights.push(format!(
            "{:.0}KB is downloaded from {} on every page load",
            m.banner_vendor_size_kb, vendor
        ));
    }

    if transparency < 50.0 {
        advice.recommendations.push(
            "Publish licensing, source repository and company details for the banner implementation"
                .to_string(),
        );
    }
    if meta.open_source.is_open_source {
        advice
            .insights
            .push("Implementation is open source and can be audited".to_string());
    }

    if !m.banner_detected {
        advice
            .insights
            .push("No banner was detected with the configured selectors before the timeout".to_string());
        advice.recommendations.push(
            "Verify cookieBanner.selectors match the rendered banner element".to_string(),
        );
    } else {
        if m.banner_visible_ms > 1000.0 {
            advice.recommendations.push(format!(
                "Render the banner earlier: it becomes readable only after {:.0}ms",
                m.banner_visible_ms
            ));
        }
        if m.banner_visible_ms - m.banner_render_ms > 300.0 {
            advice.insights.push(format!(
                "Banner spends {:.0}ms fading in before it is readable",
                m.banner_visible_ms - m.banner_render_ms
            ));
        }
        if m.banner_layout_shift > 0.05 {
            advice.recommendations.push(
                "Reserve space for the banner or use fixed positioning to avoid layout shift"
                    .to_string(),
            );
        }
        if m.banner_viewport_coverage_percent > 40.0 {
            advice.recommendations.push(format!(
                "Banner covers {:.0}% of the viewport; consider a less intrusive layout",
                m.banner_viewport_coverage_percent
            ));
        }
    }

    if let Some(delay) = m.regulatory_friction_delay_ms.filter(|d| *d > 500.0) {
        advice.insights.push(format!(
            "Banner renders {:.0}ms after the first byte (regulatory friction delay, approximate)",
            delay
        ));
    }

    advice
}
