use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default poll interval for the banner detector
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default overall detection timeout
pub const DEFAULT_DETECTION_TIMEOUT: Duration = Duration::from_secs(10);
/// Default opacity at which a rendered banner counts as visible
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 0.5;

/// How the consent banner code reaches the page
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BundleType {
    /// Compiled into the application's own bundle
    Bundled,
    /// ES module chunk served from the application origin
    Esm,
    /// Self-executing script served from the application origin
    Iife,
    /// Loaded from the vendor's servers at runtime
    #[default]
    External,
    /// Small first-party loader that pulls the rest from the vendor
    Hybrid,
}

/// Top-level benchmark configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub name: String,
    pub iterations: u32,
    /// Reference run against which all others are compared
    #[serde(default)]
    pub baseline: bool,
    pub cookie_banner: CookieBannerConfig,
    pub tech_stack: TechStackConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyConfig>,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "name cannot be empty".to_string(),
            ));
        }

        if self.iterations == 0 {
            return Err(ValidationError::InvalidGeneral(
                "iterations must be at least 1".to_string(),
            ));
        }

        if self.cookie_banner.selectors.is_empty() {
            return Err(ValidationError::InvalidBanner(
                "selectors must contain at least one candidate".to_string(),
            ));
        }
        if let Some(blank) = self.cookie_banner.selectors.iter().position(|s| s.trim().is_empty()) {
            return Err(ValidationError::InvalidBanner(format!(
                "selector at position {} is empty",
                blank
            )));
        }
        for host in &self.cookie_banner.service_hosts {
            if host.trim().is_empty() || host.contains('/') {
                return Err(ValidationError::InvalidBanner(format!(
                    "service host '{}' must be a bare hostname",
                    host
                )));
            }
        }

        self.detection.validate()?;
        self.stats.validate()?;

        if let Some(remote) = &self.remote {
            if remote.enabled {
                match remote.url.as_deref().map(str::trim) {
                    None | Some("") => {
                        return Err(ValidationError::InvalidRemote(
                            "remote mode is enabled but no url was given".to_string(),
                        ));
                    }
                    Some(raw) => {
                        url::Url::parse(raw).map_err(|e| {
                            ValidationError::InvalidRemote(format!("invalid url '{}': {}", raw, e))
                        })?;
                    }
                }
            }
        }

        Ok(())
    }

    /// URL to benchmark when running against a live deployment
    pub fn remote_url(&self) -> Option<&str> {
        self.remote
            .as_ref()
            .filter(|r| r.enabled)
            .and_then(|r| r.url.as_deref())
    }

    /// Extra headers sent with navigation in remote mode
    pub fn remote_headers(&self) -> BTreeMap<String, String> {
        self.remote
            .as_ref()
            .filter(|r| r.enabled)
            .map(|r| r.headers.clone())
            .unwrap_or_default()
    }
}

/// Banner selectors and the vendor hosts serving it
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CookieBannerConfig {
    /// Candidate selectors, tried in order
    pub selectors: Vec<String>,
    /// Hostnames belonging to the banner vendor
    #[serde(default)]
    pub service_hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

/// Declared technology stack of the app under test
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TechStackConfig {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundler: Option<String>,
    #[serde(default)]
    pub bundle_type: BundleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,
    #[serde(default)]
    pub typescript: bool,
}

impl TechStackConfig {
    /// Whether anything meaningful was disclosed about the stack
    pub fn is_disclosed(&self) -> bool {
        !self.languages.is_empty() || !self.frameworks.is_empty() || self.bundler.is_some()
    }
}

/// Company behind the banner implementation
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompanyConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Source-availability metadata used by open-source detection
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_source: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Benchmark a live URL instead of a locally built app
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Detector tunables
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub visibility_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_DETECTION_TIMEOUT,
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
        }
    }
}

impl DetectionConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval.is_zero() {
            return Err(ValidationError::InvalidDetection(
                "pollInterval must be greater than zero".to_string(),
            ));
        }
        if self.timeout < self.poll_interval {
            return Err(ValidationError::InvalidDetection(format!(
                "timeout {:?} is shorter than pollInterval {:?}",
                self.timeout, self.poll_interval
            )));
        }
        if !(0.0..=1.0).contains(&self.visibility_threshold) {
            return Err(ValidationError::InvalidDetection(format!(
                "visibilityThreshold {} must be within 0..=1",
                self.visibility_threshold
            )));
        }
        Ok(())
    }
}

/// Iteration scheduling and collection settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    /// Extra attempts per iteration after the first failure
    pub retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub iteration_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    /// Pause after network idle so in-page instrumentation can flush
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Added on top of the latest readiness signal when deriving TTI
    #[serde(with = "humantime_serde")]
    pub tti_buffer: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_backoff: Duration::from_millis(500),
            iteration_timeout: Duration::from_secs(60),
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(1),
            tti_buffer: Duration::from_millis(1000),
        }
    }
}

/// Statistical reduction settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsConfig {
    /// Percentage trimmed from each tail
    pub trim_percent: f64,
    /// CV (percent) at or above which a metric is noted as unstable
    pub stability_threshold: f64,
    /// CV (percent) at or above which instability is logged as a warning
    pub warning_threshold: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            trim_percent: 10.0,
            stability_threshold: 15.0,
            warning_threshold: 20.0,
        }
    }
}

impl StatsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..50.0).contains(&self.trim_percent) {
            return Err(ValidationError::InvalidStats(format!(
                "trimPercent {} must be within 0..50",
                self.trim_percent
            )));
        }
        if self.stability_threshold <= 0.0 || self.warning_threshold <= 0.0 {
            return Err(ValidationError::InvalidStats(
                "stability thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors that abort a run before anything is measured
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid cookie banner configuration: {0}")]
    InvalidBanner(String),
    #[error("Invalid detection configuration: {0}")]
    InvalidDetection(String),
    #[error("Invalid stats configuration: {0}")]
    InvalidStats(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidRemote(String),
}
