//! # CookieBench - performance cost of cookie consent banners
//!
//! This library measures how a cookie consent banner affects page load and
//! turns repeated measurements into a weighted score.
//!
//! ## Overview
//!
//! A run loads the same page several times. For every page load an in-page
//! probe samples the candidate banner selectors while a route handler
//! measures the scripts the page pulls in. The samples are replayed through
//! the banner detector, merged with the page's web vitals into one
//! per-iteration record, reduced across iterations with an outlier-trimmed
//! mean, and scored.
//!
//! ## Architecture
//!
//! - `config`: Configuration structures and validation
//! - `config_loader`: JSON/YAML configuration loading
//! - `automation`: Traits for the browser driver and the build-and-serve step
//! - `detection`: Banner detector, simulated event loop, probe trace replay
//! - `network`: First/third-party request classification
//! - `metrics`: Per-iteration aggregation
//! - `stats`: Cross-iteration reduction and stability
//! - `scoring`: Weighted category scoring, grades and advice
//! - `pipeline`: Capture-to-artifact processing
//! - `runner`: Iteration loop with retries against the automation traits
//! - `report`: JSON artifact and text report output
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use cookiebench::{config_loader, metrics::IterationCapture, pipeline, report};
//!
//! let config = config_loader::load_config(Path::new("bench.json"))?;
//! let captures: Vec<IterationCapture> =
//!     serde_json::from_str(&std::fs::read_to_string("captures.json")?)?;
//!
//! let artifact = pipeline::process_captures(&config, &captures)?;
//! report::write_artifact(&artifact, Path::new("results"))?;
//! report::print_summary(&artifact);
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```json
//! {
//!   "name": "c15t-nextjs",
//!   "iterations": 5,
//!   "cookieBanner": {
//!     "selectors": ["#c15t-banner"],
//!     "serviceHosts": ["c15t.dev"]
//!   },
//!   "techStack": { "frameworks": ["nextjs"], "bundleType": "bundled" },
//!   "detection": { "pollInterval": "100ms", "timeout": "10s" }
//! }
//! ```

pub mod automation;
pub mod config;
pub mod config_loader;
pub mod detection;
pub mod metrics;
pub mod network;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod scoring;
pub mod stats;

pub use config::Config;
pub use pipeline::{process_captures, BenchmarkArtifact};
pub use runner::{run_benchmark, RunError};
pub use scoring::{score, Grade, ScoreReport};
