//! Replay of the in-page probe's sample trace.
//!
//! The probe only samples: at each ready/poll/mutation trigger it records
//! the computed state of every candidate selector. All detection decisions
//! are made here, by feeding those samples through [`BannerDetector`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::engine::{BannerDetector, CheckTrigger};
use super::scheduler::LayoutShiftEntry;
use super::types::{
    BannerObservation, DetectorSettings, DomView, ElementSnapshot, OffsetMs, Viewport,
};

/// One probe sample: candidate states at one trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSample {
    pub at_ms: OffsetMs,
    pub trigger: CheckTrigger,
    /// Selectors with no match are absent
    #[serde(default)]
    pub elements: BTreeMap<String, ElementSnapshot>,
}

/// Everything the probe recorded for the detector during one page load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeTrace {
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub samples: Vec<ProbeSample>,
    #[serde(default)]
    pub layout_shifts: Vec<LayoutShiftEntry>,
}

/// [`DomView`] over recorded samples: the DOM at `t` is the latest sample at or before `t`
pub struct TraceDom<'a> {
    trace: &'a ProbeTrace,
}

impl<'a> TraceDom<'a> {
    pub fn new(trace: &'a ProbeTrace) -> Self {
        Self { trace }
    }
}

impl DomView for TraceDom<'_> {
    fn query(&self, selector: &str, at_ms: OffsetMs) -> Option<ElementSnapshot> {
        self.trace
            .samples
            .iter()
            .filter(|s| s.at_ms <= at_ms)
            .max_by(|a, b| a.at_ms.total_cmp(&b.at_ms))
            .and_then(|s| s.elements.get(selector).cloned())
    }

    fn viewport(&self) -> Viewport {
        self.trace.viewport
    }
}

enum Replayed<'a> {
    Shift(&'a LayoutShiftEntry),
    Sample(&'a ProbeSample),
}

/// Rebuild the banner observation from a probe trace
pub fn replay_trace(settings: DetectorSettings, trace: &ProbeTrace) -> BannerObservation {
    let dom = TraceDom::new(trace);
    let mut detector = BannerDetector::new(settings);
    detector.arm();

    let mut events: Vec<(OffsetMs, u8, Replayed<'_>)> = trace
        .layout_shifts
        .iter()
        .map(|s| (s.at_ms, 0, Replayed::Shift(s)))
        .chain(trace.samples.iter().map(|s| (s.at_ms, 1, Replayed::Sample(s))))
        .collect();
    events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    for (_, _, event) in events {
        match event {
            Replayed::Shift(entry) => {
                if entry.at_ms <= detector.settings().timeout_ms {
                    detector.record_layout_shift(entry.value, entry.had_recent_input);
                }
            }
            Replayed::Sample(sample) => {
                detector.check(sample.at_ms, &dom, sample.trigger);
            }
        }
    }

    detector.expire();
    let observation = detector.finish();
    if !observation.detected && !trace.samples.is_empty() {
        log::debug!(
            "No banner matched in {} probe samples",
            trace.samples.len()
        );
    }
    observation
}
