//! Banner detection: locating the consent banner and timestamping its
//! render, visibility and interactive milestones.
//!
//! - [`engine`]: the detector state machine
//! - [`scheduler`]: cooperative event loop driving the detector over a DOM
//! - [`trace`]: replay of samples recorded by the in-page probe
//! - [`PROBE_SCRIPT`]: the init script that records those samples

pub mod engine;
pub mod scheduler;
pub mod trace;
pub mod types;

pub use engine::{BannerDetector, CheckTrigger, DetectorPhase};
pub use scheduler::{run_detection, DetectionLoop, LayoutShiftEntry, PageSignals};
pub use trace::{replay_trace, ProbeSample, ProbeTrace, TraceDom};
pub use types::*;

/// Init script source. Called with the serialized [`DetectorSettings`].
pub const PROBE_SCRIPT: &str = include_str!("probe.js");

/// Expression evaluated once after the page settles to read the probe's state
pub const COLLECT_EXPRESSION: &str = "window.__cookieBenchCollect()";
