//! Merges the raw telemetry of one page load into an [`IterationRecord`].
//!
//! Aggregation is a pure function of its inputs and must only run once the
//! page reached network idle, otherwise late resources are under-counted.

use crate::config::Config;
use crate::detection::types::duration_ms;
use crate::detection::BannerObservation;
use crate::network::{hostname_of, is_third_party, matches_service_host, NetworkCapture};

use super::types::*;

const BYTES_PER_KB: f64 = 1024.0;

/// Static settings the aggregator needs from the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorSettings {
    pub tti_buffer_ms: f64,
    pub service_hosts: Vec<String>,
}

impl AggregatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tti_buffer_ms: duration_ms(config.runner.tti_buffer),
            service_hosts: config
                .cookie_banner
                .service_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }
}

/// Inputs for one aggregation
#[derive(Debug, Clone, Copy)]
pub struct AggregatorInput<'a> {
    pub iteration: u32,
    /// Hostname of the page under test
    pub page_host: &'a str,
    pub vitals: &'a VitalsSnapshot,
    pub banner: &'a BannerObservation,
    pub network: &'a NetworkCapture,
    pub resources: &'a [ResourceTimingEntry],
}

/// `max(FCP, domComplete, banner interactive) + buffer`.
///
/// None of the three alone proves the main thread is free, so this is a
/// conservative heuristic rather than a measurement.
pub fn derive_tti(vitals: &VitalsSnapshot, banner: &BannerObservation, buffer_ms: f64) -> f64 {
    let fcp = vitals.first_contentful_paint_ms.unwrap_or(0.0);
    let dom_complete = vitals.dom_complete_ms.unwrap_or(0.0);
    fcp.max(dom_complete).max(banner.interactive_offset_ms) + buffer_ms
}

/// Banner render minus TTFB, only when both are positive.
///
/// Approximates how much of the banner's delay is not server latency.
/// Pre-rendered banners can produce negative values; they are kept as-is.
pub fn derive_friction_delay(vitals: &VitalsSnapshot, banner: &BannerObservation) -> Option<f64> {
    let ttfb = vitals.time_to_first_byte_ms.filter(|t| *t > 0.0)?;
    if banner.render_offset_ms > 0.0 {
        Some(banner.render_offset_ms - ttfb)
    } else {
        None
    }
}

/// Build the canonical record for one iteration
pub fn aggregate(input: &AggregatorInput<'_>, settings: &AggregatorSettings) -> IterationRecord {
    let resources = collect_resources(input, settings);

    let mut size = SizeMetrics {
        network_observed_kb: input.network.totals.total_bytes() as f64 / BYTES_PER_KB,
        ..Default::default()
    };
    let mut third_party = ThirdPartyMetrics::default();

    for resource in &resources {
        match resource.kind {
            ResourceKind::Script => size.scripts_kb += resource.size_kb,
            ResourceKind::Stylesheet => size.stylesheets_kb += resource.size_kb,
            ResourceKind::Image => size.images_kb += resource.size_kb,
            ResourceKind::Font => size.fonts_kb += resource.size_kb,
            ResourceKind::Other => size.other_kb += resource.size_kb,
        }

        if resource.is_third_party {
            size.third_party_kb += resource.size_kb;
        } else if resource.kind == ResourceKind::Script {
            size.bundled_kb += resource.size_kb;
        }

        if resource.is_banner_vendor {
            third_party
                .banner_vendor
                .add(resource.size_kb, resource.duration_ms);
        } else if resource.is_third_party {
            third_party.other.add(resource.size_kb, resource.duration_ms);
        }
    }
    size.total_kb =
        size.scripts_kb + size.stylesheets_kb + size.images_kb + size.fonts_kb + size.other_kb;

    let vitals = input.vitals;
    let timing = TimingMetrics {
        time_to_first_byte_ms: vitals.time_to_first_byte_ms,
        dom_content_loaded_ms: vitals.dom_content_loaded_ms,
        dom_complete_ms: vitals.dom_complete_ms,
        load_event_ms: vitals.load_event_ms,
        first_paint_ms: vitals.first_paint_ms,
        first_contentful_paint_ms: vitals.first_contentful_paint_ms,
        largest_contentful_paint_ms: vitals.largest_contentful_paint_ms,
        cumulative_layout_shift: vitals.cumulative_layout_shift.unwrap_or(0.0).max(0.0),
        total_blocking_time_ms: vitals.total_blocking_time_ms.unwrap_or(0.0).max(0.0),
        interaction_to_next_paint_ms: vitals.interaction_to_next_paint_ms,
        time_to_interactive_ms: derive_tti(vitals, input.banner, settings.tti_buffer_ms),
        regulatory_friction_delay_ms: derive_friction_delay(vitals, input.banner),
    };

    IterationRecord {
        iteration: input.iteration,
        timing,
        size,
        resources,
        banner: BannerMetrics::from(input.banner),
        third_party,
    }
}

/// Scripts come from interception (exact bodies); everything else, and
/// scripts when nothing was intercepted, from resource timing.
fn collect_resources(
    input: &AggregatorInput<'_>,
    settings: &AggregatorSettings,
) -> Vec<ResourceRecord> {
    let is_vendor = |url: &str| {
        hostname_of(url).is_some_and(|host| matches_service_host(&host, &settings.service_hosts))
    };
    let intercepted_scripts = !input.network.samples.is_empty();

    let mut resources: Vec<ResourceRecord> = input
        .network
        .samples
        .iter()
        .map(|sample| ResourceRecord {
            name: sample.url.clone(),
            kind: ResourceKind::Script,
            size_kb: sample.size_kb.max(0.0),
            duration_ms: sample.duration_ms.max(0.0),
            start_ms: sample.start_offset_ms,
            is_third_party: sample.is_third_party,
            is_banner_vendor: is_vendor(&sample.url),
        })
        .collect();

    for entry in input.resources {
        let kind = ResourceKind::classify(entry);
        if kind == ResourceKind::Script && intercepted_scripts {
            continue;
        }
        resources.push(ResourceRecord {
            name: entry.name.clone(),
            kind,
            size_kb: entry.size_bytes() / BYTES_PER_KB,
            duration_ms: entry.duration.max(0.0),
            start_ms: entry.start_time,
            is_third_party: is_third_party(&entry.name, input.page_host),
            is_banner_vendor: is_vendor(&entry.name),
        });
    }

    resources.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));
    resources
}
