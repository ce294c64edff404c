//! Banner detection state machine.
//!
//! The detector is driven from outside: the event loop (or a probe trace
//! replay) calls [`BannerDetector::check`] at each ready/poll/mutation
//! trigger and forwards layout-shift entries as they arrive. The detector
//! itself never waits or sleeps.

use serde::{Deserialize, Serialize};

use super::types::{BannerObservation, DetectorSettings, DomView, OffsetMs};

/// What caused a detection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckTrigger {
    /// DOM parsed; first attempt, before any poll tick
    Ready,
    Poll,
    Mutation,
    /// Scheduled continuation for a banner still fading in
    Recheck,
}

/// Lifecycle of one detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorPhase {
    Idle,
    /// Layout-shift observer installed, waiting for DOM ready
    Armed,
    Polling,
    Detected,
    Interactive,
    /// Timeout reached without detection
    Expired,
}

#[derive(Debug, Clone)]
pub struct BannerDetector {
    settings: DetectorSettings,
    phase: DetectorPhase,
    selector: Option<String>,
    render_at: Option<OffsetMs>,
    visible_at: Option<OffsetMs>,
    interactive_at: Option<OffsetMs>,
    cumulative_shift: f64,
    shift_before_detection: f64,
    coverage_percent: f64,
}

impl BannerDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            phase: DetectorPhase::Idle,
            selector: None,
            render_at: None,
            visible_at: None,
            interactive_at: None,
            cumulative_shift: 0.0,
            shift_before_detection: 0.0,
            coverage_percent: 0.0,
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    /// Install the layout-shift observer. Must happen before navigation.
    pub fn arm(&mut self) {
        if self.phase == DetectorPhase::Idle {
            self.phase = DetectorPhase::Armed;
        }
    }

    /// Feed one layout-shift entry. Shifts right after user input do not count.
    pub fn record_layout_shift(&mut self, value: f64, had_recent_input: bool) {
        if self.phase == DetectorPhase::Idle || had_recent_input || value <= 0.0 {
            return;
        }
        self.cumulative_shift += value;
    }

    /// Whether the banner is found and every milestone has been recorded
    pub fn is_settled(&self) -> bool {
        match self.phase {
            DetectorPhase::Expired => true,
            DetectorPhase::Interactive => self.visible_at.is_some(),
            _ => false,
        }
    }

    /// Detected but still below the opacity threshold
    pub fn awaiting_visibility(&self) -> bool {
        self.render_at.is_some() && self.visible_at.is_none()
    }

    /// Run one detection attempt against the DOM at `now`
    pub fn check(
        &mut self,
        now: OffsetMs,
        dom: &dyn DomView,
        trigger: CheckTrigger,
    ) -> DetectorPhase {
        match self.phase {
            DetectorPhase::Idle => return self.phase,
            DetectorPhase::Expired => return self.phase,
            DetectorPhase::Armed => {
                if trigger != CheckTrigger::Ready {
                    // Nothing happens before the readiness signal
                    return self.phase;
                }
                self.phase = DetectorPhase::Polling;
            }
            _ => {}
        }

        if now > self.settings.timeout_ms {
            return self.expire();
        }

        match self.selector.clone() {
            None => self.try_detect(now, dom, trigger),
            Some(selector) => self.track_milestones(now, dom, &selector),
        }
        self.phase
    }

    /// Stop looking. Called by the owner when the timeout fires.
    pub fn expire(&mut self) -> DetectorPhase {
        if matches!(
            self.phase,
            DetectorPhase::Idle | DetectorPhase::Armed | DetectorPhase::Polling
        ) {
            self.phase = DetectorPhase::Expired;
        }
        self.phase
    }

    fn try_detect(&mut self, now: OffsetMs, dom: &dyn DomView, trigger: CheckTrigger) {
        let found = self.settings.selectors.iter().find_map(|selector| {
            dom.query(selector, now)
                .filter(|el| el.is_rendered())
                .map(|el| (selector.clone(), el))
        });

        let Some((selector, element)) = found else {
            return;
        };

        log::debug!(
            "Banner '{}' rendered at {:.0}ms (trigger: {:?})",
            selector,
            now,
            trigger
        );
        self.selector = Some(selector.clone());
        self.render_at = Some(now);
        self.shift_before_detection = self.cumulative_shift;
        self.coverage_percent = dom.viewport().coverage_percent(&element.rect);
        self.phase = DetectorPhase::Detected;
        self.track_milestones(now, dom, &selector);
    }

    fn track_milestones(&mut self, now: OffsetMs, dom: &dyn DomView, selector: &str) {
        let Some(element) = dom.query(selector, now) else {
            return;
        };

        if self.visible_at.is_none() && element.is_visible(self.settings.visibility_threshold) {
            self.visible_at = Some(now);
            self.coverage_percent = dom.viewport().coverage_percent(&element.rect);
        }

        if self.interactive_at.is_none() && element.is_interactive() {
            self.interactive_at = Some(now);
            self.phase = DetectorPhase::Interactive;
        }
    }

    /// Consume the detector and produce the immutable observation
    pub fn finish(self) -> BannerObservation {
        let (Some(selector), Some(render)) = (self.selector, self.render_at) else {
            return BannerObservation::not_detected();
        };

        BannerObservation {
            detected: true,
            selector: Some(selector),
            render_offset_ms: render,
            visible_offset_ms: self.visible_at.unwrap_or(render).max(render),
            interactive_offset_ms: self.interactive_at.unwrap_or(0.0),
            layout_shift_delta: (self.cumulative_shift - self.shift_before_detection).max(0.0),
            viewport_coverage_percent: self.coverage_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{ControlSnapshot, ElementSnapshot, Rect};
    use std::collections::HashMap;

    /// DOM whose elements appear at fixed times and never change afterwards
    struct StaticDom {
        elements: HashMap<&'static str, (OffsetMs, ElementSnapshot)>,
    }

    impl DomView for StaticDom {
        fn query(&self, selector: &str, at_ms: OffsetMs) -> Option<ElementSnapshot> {
            self.elements
                .get(selector)
                .filter(|(from, _)| at_ms >= *from)
                .map(|(_, el)| el.clone())
        }
    }

    fn banner(opacity: f64, with_button: bool) -> ElementSnapshot {
        ElementSnapshot {
            rect: Rect {
                x: 0.0,
                y: 620.0,
                width: 1280.0,
                height: 100.0,
            },
            opacity,
            controls: if with_button {
                vec![ControlSnapshot {
                    rect: Rect {
                        x: 10.0,
                        y: 630.0,
                        width: 80.0,
                        height: 30.0,
                    },
                    connected: true,
                }]
            } else {
                Vec::new()
            },
            ..Default::default()
        }
    }

    fn settings(selectors: &[&str]) -> DetectorSettings {
        DetectorSettings {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            poll_interval_ms: 100.0,
            timeout_ms: 10_000.0,
            visibility_threshold: 0.5,
        }
    }

    #[test]
    fn test_checks_ignored_before_ready() {
        let dom = StaticDom {
            elements: HashMap::from([(".banner", (0.0, banner(1.0, true)))]),
        };
        let mut detector = BannerDetector::new(settings(&[".banner"]));
        detector.arm();
        assert_eq!(
            detector.check(10.0, &dom, CheckTrigger::Poll),
            DetectorPhase::Armed
        );
        assert_eq!(
            detector.check(20.0, &dom, CheckTrigger::Ready),
            DetectorPhase::Interactive
        );
    }

    #[test]
    fn test_first_selector_in_config_order_wins() {
        let dom = StaticDom {
            elements: HashMap::from([
                ("#second", (0.0, banner(1.0, true))),
                ("#first", (0.0, banner(1.0, false))),
            ]),
        };
        let mut detector = BannerDetector::new(settings(&["#first", "#second"]));
        detector.arm();
        detector.check(30.0, &dom, CheckTrigger::Ready);
        let obs = detector.finish();
        assert_eq!(obs.selector.as_deref(), Some("#first"));
        // #first has no controls, and #second is never tried after detection
        assert_eq!(obs.interactive_offset_ms, 0.0);
    }

    #[test]
    fn test_layout_shift_delta_counts_only_after_detection() {
        let dom = StaticDom {
            elements: HashMap::from([(".banner", (200.0, banner(1.0, true)))]),
        };
        let mut detector = BannerDetector::new(settings(&[".banner"]));
        detector.arm();
        detector.record_layout_shift(0.05, false);
        detector.check(100.0, &dom, CheckTrigger::Ready);
        detector.check(200.0, &dom, CheckTrigger::Poll);
        detector.record_layout_shift(0.12, false);
        detector.record_layout_shift(0.3, true);
        let obs = detector.finish();
        assert!((obs.layout_shift_delta - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_expired_detector_never_detects() {
        let dom = StaticDom {
            elements: HashMap::from([(".banner", (20_000.0, banner(1.0, true)))]),
        };
        let mut detector = BannerDetector::new(settings(&[".banner"]));
        detector.arm();
        detector.check(50.0, &dom, CheckTrigger::Ready);
        detector.expire();
        assert!(detector.is_settled());
        detector.check(20_000.0, &dom, CheckTrigger::Poll);
        assert_eq!(detector.finish(), BannerObservation::not_detected());
    }

    #[test]
    fn test_visible_falls_back_to_render() {
        let dom = StaticDom {
            elements: HashMap::from([(".banner", (40.0, banner(0.0, false)))]),
        };
        let mut detector = BannerDetector::new(settings(&[".banner"]));
        detector.arm();
        detector.check(40.0, &dom, CheckTrigger::Ready);
        assert!(detector.awaiting_visibility());
        detector.expire();
        let obs = detector.finish();
        assert!(obs.detected);
        assert_eq!(obs.render_offset_ms, 40.0);
        assert_eq!(obs.visible_offset_ms, 40.0);
        assert!(obs.is_consistent());
    }
}
