//! Cooperative event loop for the detector.
//!
//! Models the page's single-threaded host loop: readiness, poll ticks,
//! mutation notifications, layout-shift entries and the overall timeout
//! are timers in one queue, processed in time order. Waiting for a banner
//! to finish fading in is a scheduled recheck, never a blocking delay.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use super::engine::{BannerDetector, CheckTrigger};
use super::types::{BannerObservation, DetectorSettings, DomView, OffsetMs};

/// Delay before re-checking a banner that rendered below the opacity threshold
pub const VISIBILITY_RECHECK_MS: OffsetMs = 100.0;

/// A `layout-shift` performance entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutShiftEntry {
    pub at_ms: OffsetMs,
    pub value: f64,
    #[serde(default)]
    pub had_recent_input: bool,
}

/// Page-level signals that drive the loop besides the poll timer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSignals {
    /// DOMContentLoaded offset
    pub ready_at: OffsetMs,
    #[serde(default)]
    pub mutations: Vec<OffsetMs>,
    #[serde(default)]
    pub layout_shifts: Vec<LayoutShiftEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LoopEvent {
    LayoutShift(LayoutShiftEntry),
    Ready,
    Mutation,
    Poll,
    Recheck,
    Timeout,
}

impl LoopEvent {
    /// Tie-break for events due at the same instant
    fn rank(&self) -> u8 {
        match self {
            LoopEvent::LayoutShift(_) => 0,
            LoopEvent::Ready => 1,
            LoopEvent::Mutation => 2,
            LoopEvent::Poll => 3,
            LoopEvent::Recheck => 4,
            LoopEvent::Timeout => 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    at: OffsetMs,
    seq: u64,
    event: LoopEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .total_cmp(&other.at)
            .then(self.event.rank().cmp(&other.event.rank()))
            .then(self.seq.cmp(&other.seq))
    }
}

/// Drives one [`BannerDetector`] over a time-indexed DOM
pub struct DetectionLoop<'a> {
    detector: BannerDetector,
    dom: &'a dyn DomView,
    queue: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
    recheck_pending: bool,
}

impl<'a> DetectionLoop<'a> {
    pub fn new(settings: DetectorSettings, dom: &'a dyn DomView) -> Self {
        let mut detector = BannerDetector::new(settings);
        // Observers go in before navigation so the earliest shifts are seen
        detector.arm();
        Self {
            detector,
            dom,
            queue: BinaryHeap::new(),
            seq: 0,
            recheck_pending: false,
        }
    }

    fn schedule(&mut self, at: OffsetMs, event: LoopEvent) {
        self.seq += 1;
        self.queue.push(Reverse(Scheduled {
            at,
            seq: self.seq,
            event,
        }));
    }

    /// Process every event until the detector settles or times out
    pub fn run(mut self, signals: &PageSignals) -> BannerObservation {
        let timeout = self.detector.settings().timeout_ms;
        let interval = self.detector.settings().poll_interval_ms;

        for shift in &signals.layout_shifts {
            self.schedule(shift.at_ms, LoopEvent::LayoutShift(*shift));
        }
        for &at in signals.mutations.iter().filter(|&&at| at >= signals.ready_at) {
            self.schedule(at, LoopEvent::Mutation);
        }
        self.schedule(signals.ready_at, LoopEvent::Ready);
        self.schedule(timeout, LoopEvent::Timeout);

        while let Some(Reverse(next)) = self.queue.pop() {
            let now = next.at;
            match next.event {
                LoopEvent::LayoutShift(entry) => {
                    self.detector
                        .record_layout_shift(entry.value, entry.had_recent_input);
                    continue;
                }
                LoopEvent::Timeout => {
                    self.detector.expire();
                    break;
                }
                LoopEvent::Ready => {
                    self.detector.check(now, self.dom, CheckTrigger::Ready);
                    if interval > 0.0 {
                        self.schedule(now + interval, LoopEvent::Poll);
                    }
                }
                LoopEvent::Poll => {
                    self.detector.check(now, self.dom, CheckTrigger::Poll);
                    if !self.detector.is_settled() && now + interval <= timeout {
                        self.schedule(now + interval, LoopEvent::Poll);
                    }
                }
                LoopEvent::Mutation => {
                    self.detector.check(now, self.dom, CheckTrigger::Mutation);
                }
                LoopEvent::Recheck => {
                    self.recheck_pending = false;
                    self.detector.check(now, self.dom, CheckTrigger::Recheck);
                }
            }

            if self.detector.awaiting_visibility() && !self.recheck_pending {
                self.recheck_pending = true;
                self.schedule(now + VISIBILITY_RECHECK_MS, LoopEvent::Recheck);
            }

            if self.detector.is_settled() {
                break;
            }
        }

        // Shifts already queued before settling still belong to the page load
        while let Some(Reverse(rest)) = self.queue.pop() {
            if let LoopEvent::LayoutShift(entry) = rest.event {
                if entry.at_ms <= timeout {
                    self.detector
                        .record_layout_shift(entry.value, entry.had_recent_input);
                }
            }
        }

        self.detector.finish()
    }
}

/// Run detection over `dom` with the given page signals
pub fn run_detection(
    settings: DetectorSettings,
    dom: &dyn DomView,
    signals: &PageSignals,
) -> BannerObservation {
    DetectionLoop::new(settings, dom).run(signals)
}
