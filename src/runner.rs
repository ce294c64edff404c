//! Iteration runner.
//!
//! Drives the configured number of page loads against one browser, one after
//! another. Each iteration installs the probe and the network classifier on
//! a fresh page, waits for network idle plus the settle delay, collects the
//! probe telemetry and aggregates it. Failed iterations are retried with a
//! backoff and dropped after the last attempt; a run with no surviving
//! iteration is fatal.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::automation::{AppServer, Browser, LoadState, PageError, PageSession, ServeError};
use crate::config::{Config, ValidationError};
use crate::detection::{DetectorSettings, COLLECT_EXPRESSION, PROBE_SCRIPT};
use crate::metrics::{AggregatorSettings, IterationCapture, IterationRecord};
use crate::network::{hostname_of, NetworkClassifier};
use crate::pipeline::{self, BenchmarkArtifact};
use crate::stats::ReduceError;

/// Every request on the page goes through the classifier
const ROUTE_ALL: &str = "**/*";

/// Why a single iteration failed
#[derive(Debug, thiserror::Error)]
pub enum IterationError {
    #[error(transparent)]
    Page(#[from] PageError),

    #[error("Probe returned malformed telemetry: {0}")]
    Telemetry(#[from] serde_json::Error),

    #[error("Iteration exceeded its {limit:?} budget (took {elapsed:?})")]
    Timeout { limit: Duration, elapsed: Duration },
}

/// Fatal run outcomes
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ValidationError),

    #[error(transparent)]
    Serve(#[from] ServeError),

    #[error("Target URL '{0}' has no hostname")]
    InvalidTarget(String),

    #[error("All {attempted} iterations failed; last error: {last_error}")]
    AllIterationsFailed { attempted: u32, last_error: String },

    #[error(transparent)]
    Reduce(#[from] ReduceError),
}

/// Closes the browser on every exit path
struct BrowserGuard<'a> {
    browser: &'a mut dyn Browser,
}

impl Drop for BrowserGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.browser.close() {
            warn!("Failed to close browser: {}", e);
        }
    }
}

/// Shuts the local server down on every exit path
struct ServerGuard<'a> {
    server: Option<&'a mut dyn AppServer>,
}

impl Drop for ServerGuard<'_> {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
    }
}

/// Per-run state shared by every iteration
struct IterationContext<'a> {
    config: &'a Config,
    target: &'a str,
    page_host: String,
    detector: DetectorSettings,
    aggregator: AggregatorSettings,
}

/// Wall-clock budget shared by every automation call of one iteration
struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Time left, or a timeout once the budget is spent
    fn remaining(&self) -> Result<Duration, IterationError> {
        let elapsed = self.started.elapsed();
        match self.limit.checked_sub(elapsed) {
            Some(left) if !left.is_zero() => Ok(left),
            _ => Err(IterationError::Timeout {
                limit: self.limit,
                elapsed,
            }),
        }
    }

    /// A call timeout shortened to what is left of the budget
    fn bound(&self, timeout: Duration) -> Result<Duration, IterationError> {
        Ok(timeout.min(self.remaining()?))
    }
}

/// Load the page once and collect raw telemetry
fn capture_page(
    page: &mut dyn PageSession,
    ctx: &IterationContext<'_>,
    deadline: &Deadline,
) -> Result<IterationCapture, IterationError> {
    let runner = &ctx.config.runner;
    let classifier = NetworkClassifier::new(ctx.page_host.clone());

    page.add_init_script(PROBE_SCRIPT, &serde_json::to_value(&ctx.detector)?)?;
    page.route(ROUTE_ALL, Box::new(classifier.clone()))?;

    let headers = ctx.config.remote_headers();
    if !headers.is_empty() {
        page.set_extra_headers(&headers)?;
    }

    page.navigate(
        ctx.target,
        LoadState::NetworkIdle,
        deadline.bound(runner.navigation_timeout)?,
    )?;

    let selector_list = ctx.detector.selectors.join(", ");
    let selector_timeout = deadline.bound(ctx.config.detection.timeout)?;
    if !page.wait_for_selector(&selector_list, selector_timeout)? {
        debug!("No banner selector matched within {:?}", selector_timeout);
    }
    page.wait_for_load_state(
        LoadState::NetworkIdle,
        deadline.bound(runner.navigation_timeout)?,
    )?;

    if !runner.settle_delay.is_zero() {
        thread::sleep(deadline.bound(runner.settle_delay)?);
    }

    deadline.remaining()?;
    let raw = page.evaluate(COLLECT_EXPRESSION)?;
    let mut capture: IterationCapture = serde_json::from_value(raw)?;
    capture.page_url = ctx.target.to_string();
    capture.network = classifier.drain();
    Ok(capture)
}

fn run_iteration(
    browser: &mut dyn Browser,
    ctx: &IterationContext<'_>,
    iteration: u32,
) -> Result<IterationRecord, IterationError> {
    let deadline = Deadline::start(ctx.config.runner.iteration_timeout);
    let mut page = browser.new_page()?;

    let captured = capture_page(page.as_mut(), ctx, &deadline);
    if let Err(e) = page.close() {
        warn!("Failed to close page after iteration {}: {}", iteration, e);
    }
    let capture = captured?;

    // evaluate() has no timeout of its own
    deadline.remaining()?;

    Ok(pipeline::process_capture(
        iteration,
        &capture,
        &ctx.detector,
        &ctx.aggregator,
    ))
}

/// Run one iteration with bounded retries
fn run_with_retries(
    browser: &mut dyn Browser,
    ctx: &IterationContext<'_>,
    iteration: u32,
) -> Result<IterationRecord, IterationError> {
    let runner = &ctx.config.runner;
    let mut attempt = 0;
    loop {
        match run_iteration(browser, ctx, iteration) {
            Ok(record) => return Ok(record),
            Err(e) if attempt < runner.retries => {
                attempt += 1;
                warn!(
                    "Iteration {} failed (attempt {}/{}): {}",
                    iteration,
                    attempt,
                    runner.retries + 1,
                    e
                );
                let backoff = runner.retry_backoff * attempt;
                if !backoff.is_zero() {
                    thread::sleep(backoff);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Measure an app end to end and produce its artifact.
///
/// In remote mode the configured URL is used and `server` is left untouched;
/// otherwise the app is built and served locally first.
pub fn run_benchmark(
    config: &Config,
    browser: &mut dyn Browser,
    server: &mut dyn AppServer,
) -> Result<BenchmarkArtifact, RunError> {
    config.validate()?;

    let browser_guard = BrowserGuard { browser };
    let mut server_guard = ServerGuard { server: None };

    let target = match config.remote_url() {
        Some(url) => {
            info!("Benchmarking remote deployment {}", url);
            url.to_string()
        }
        None => {
            let url = server.build_and_serve(&config.name)?;
            server_guard.server = Some(server);
            info!("Serving {} at {}", config.name, url);
            url
        }
    };

    let page_host = hostname_of(&target).ok_or_else(|| RunError::InvalidTarget(target.clone()))?;
    let ctx = IterationContext {
        config,
        target: &target,
        page_host,
        detector: DetectorSettings::from_config(config),
        aggregator: AggregatorSettings::from_config(config),
    };

    let mut records = Vec::with_capacity(config.iterations as usize);
    let mut last_error = None;
    for iteration in 1..=config.iterations {
        info!("Iteration {}/{}", iteration, config.iterations);
        match run_with_retries(&mut *browser_guard.browser, &ctx, iteration) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Dropping iteration {} after retries: {}", iteration, e);
                last_error = Some(e.to_string());
            }
        }
    }

    if records.is_empty() {
        return Err(RunError::AllIterationsFailed {
            attempted: config.iterations,
            last_error: last_error.unwrap_or_default(),
        });
    }
    if records.len() < config.iterations as usize {
        warn!(
            "{} of {} iterations completed",
            records.len(),
            config.iterations
        );
    }

    let artifact = pipeline::build_artifact(config, records, Some(target.clone()))?;
    drop(server_guard);
    drop(browser_guard);
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{
        InterceptedRequest, ResourceType, RouteAction, RouteHandler, Upstream, UpstreamResponse,
    };
    use crate::config::{
        CookieBannerConfig, DetectionConfig, RemoteConfig, RunnerConfig, SourceConfig, StatsConfig,
        TechStackConfig,
    };
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        pages_opened: u32,
        pages_closed: u32,
        browser_closed: bool,
        server_shutdown: bool,
        navigations: Vec<String>,
        extra_headers: Vec<BTreeMap<String, String>>,
        init_args: Vec<serde_json::Value>,
        /// Navigations to fail, counted from the first
        fail_first: u32,
        /// Timeouts handed to navigate and the two waits, in call order
        timeouts: Vec<Duration>,
        /// Wall time each navigation takes
        navigate_delay: Duration,
    }

    struct FixedUpstream;

    impl Upstream for FixedUpstream {
        fn fetch(&mut self, _request: &InterceptedRequest) -> Result<UpstreamResponse, PageError> {
            Ok(UpstreamResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: vec![0; 2048],
                duration_ms: 12.0,
            })
        }
    }

    struct FakePage {
        recorder: Rc<RefCell<Recorder>>,
        handler: Option<Box<dyn RouteHandler>>,
    }

    impl PageSession for FakePage {
        fn add_init_script(
            &mut self,
            _script: &str,
            args: &serde_json::Value,
        ) -> Result<(), PageError> {
            self.recorder.borrow_mut().init_args.push(args.clone());
            Ok(())
        }

        fn route(
            &mut self,
            _pattern: &str,
            handler: Box<dyn RouteHandler>,
        ) -> Result<(), PageError> {
            self.handler = Some(handler);
            Ok(())
        }

        fn set_extra_headers(
            &mut self,
            headers: &BTreeMap<String, String>,
        ) -> Result<(), PageError> {
            self.recorder.borrow_mut().extra_headers.push(headers.clone());
            Ok(())
        }

        fn navigate(
            &mut self,
            url: &str,
            _wait_until: LoadState,
            timeout: Duration,
        ) -> Result<(), PageError> {
            {
                let mut rec = self.recorder.borrow_mut();
                rec.navigations.push(url.to_string());
                rec.timeouts.push(timeout);
                if !rec.navigate_delay.is_zero() {
                    thread::sleep(rec.navigate_delay);
                }
                if rec.fail_first > 0 {
                    rec.fail_first -= 1;
                    return Err(PageError::Navigation {
                        url: url.to_string(),
                        reason: "connection reset".to_string(),
                    });
                }
            }
            if let Some(handler) = self.handler.as_mut() {
                for (path, kind) in [
                    (format!("{}app.js", url), ResourceType::Script),
                    ("https://cdn.vendor.example/cmp.js".to_string(), ResourceType::Script),
                    (format!("{}logo.png", url), ResourceType::Image),
                ] {
                    let request = InterceptedRequest {
                        url: path,
                        method: "GET".to_string(),
                        resource_type: kind,
                        headers: BTreeMap::new(),
                        started_at_ms: 10.0,
                    };
                    let action = handler.handle(&request, &mut FixedUpstream);
                    assert!(matches!(action, RouteAction::Fulfill(_)));
                }
            }
            Ok(())
        }

        fn wait_for_load_state(
            &mut self,
            _state: LoadState,
            timeout: Duration,
        ) -> Result<(), PageError> {
            self.recorder.borrow_mut().timeouts.push(timeout);
            Ok(())
        }

        fn wait_for_selector(
            &mut self,
            _selector: &str,
            timeout: Duration,
        ) -> Result<bool, PageError> {
            self.recorder.borrow_mut().timeouts.push(timeout);
            Ok(true)
        }

        fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, PageError> {
            assert_eq!(expression, COLLECT_EXPRESSION);
            Ok(json!({
                "vitals": { "timeToFirstByteMs": 30.0, "firstContentfulPaintMs": 120.0 },
                "trace": {
                    "samples": [
                        { "atMs": 0.0, "trigger": "ready", "elements": {} },
                        {
                            "atMs": 200.0,
                            "trigger": "mutation",
                            "elements": {
                                "#banner": {
                                    "rect": { "x": 0.0, "y": 600.0, "width": 1280.0, "height": 120.0 },
                                    "opacity": 1.0,
                                    "controls": [
                                        { "rect": { "x": 10.0, "y": 610.0, "width": 80.0, "height": 30.0 } }
                                    ]
                                }
                            }
                        }
                    ]
                },
                "resources": []
            }))
        }

        fn close(&mut self) -> Result<(), PageError> {
            self.recorder.borrow_mut().pages_closed += 1;
            Ok(())
        }
    }

    struct FakeBrowser {
        recorder: Rc<RefCell<Recorder>>,
    }

    impl Browser for FakeBrowser {
        fn new_page(&mut self) -> Result<Box<dyn PageSession>, PageError> {
            self.recorder.borrow_mut().pages_opened += 1;
            Ok(Box::new(FakePage {
                recorder: Rc::clone(&self.recorder),
                handler: None,
            }))
        }

        fn close(&mut self) -> Result<(), PageError> {
            self.recorder.borrow_mut().browser_closed = true;
            Ok(())
        }
    }

    struct FakeServer {
        recorder: Rc<RefCell<Recorder>>,
        fail: bool,
    }

    impl AppServer for FakeServer {
        fn build_and_serve(&mut self, app_name: &str) -> Result<String, ServeError> {
            if self.fail {
                return Err(ServeError::Build(format!("{} failed to compile", app_name)));
            }
            Ok("http://localhost:3000/".to_string())
        }

        fn shutdown(&mut self) {
            self.recorder.borrow_mut().server_shutdown = true;
        }
    }

    fn config(iterations: u32) -> Config {
        Config {
            name: "example-app".to_string(),
            iterations,
            baseline: false,
            cookie_banner: CookieBannerConfig {
                selectors: vec!["#banner".to_string()],
                service_hosts: vec!["vendor.example".to_string()],
                service_name: None,
            },
            tech_stack: TechStackConfig::default(),
            detection: DetectionConfig::default(),
            runner: RunnerConfig {
                retries: 1,
                retry_backoff: Duration::ZERO,
                settle_delay: Duration::ZERO,
                ..RunnerConfig::default()
            },
            stats: StatsConfig::default(),
            company: None,
            source: SourceConfig::default(),
            remote: None,
        }
    }

    fn fakes(fail_first: u32) -> (Rc<RefCell<Recorder>>, FakeBrowser, FakeServer) {
        let recorder = Rc::new(RefCell::new(Recorder {
            fail_first,
            ..Default::default()
        }));
        let browser = FakeBrowser {
            recorder: Rc::clone(&recorder),
        };
        let server = FakeServer {
            recorder: Rc::clone(&recorder),
            fail: false,
        };
        (recorder, browser, server)
    }

    #[test]
    fn test_local_run_collects_every_iteration() {
        let (recorder, mut browser, mut server) = fakes(0);
        let artifact = run_benchmark(&config(3), &mut browser, &mut server).unwrap();

        assert_eq!(artifact.iterations.len(), 3);
        let record = &artifact.iterations[0];
        assert!(record.banner.detected);
        assert_eq!(record.banner.render_time_ms, 200.0);
        assert_eq!(record.third_party.banner_vendor.requests, 1);
        assert_eq!(record.size.network_observed_kb, 6.0);

        let rec = recorder.borrow();
        assert_eq!(rec.pages_opened, 3);
        assert_eq!(rec.pages_closed, 3);
        assert!(rec.browser_closed);
        assert!(rec.server_shutdown);
        assert_eq!(rec.init_args[0]["selectors"], json!(["#banner"]));
        assert_eq!(rec.init_args[0]["pollIntervalMs"], json!(100.0));
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let (recorder, mut browser, mut server) = fakes(1);
        let artifact = run_benchmark(&config(2), &mut browser, &mut server).unwrap();
        assert_eq!(artifact.iterations.len(), 2);
        assert_eq!(recorder.borrow().navigations.len(), 3);
    }

    #[test]
    fn test_exhausted_retries_drop_iteration() {
        // Iteration 1 fails both attempts, iteration 2 succeeds
        let (_, mut browser, mut server) = fakes(2);
        let artifact = run_benchmark(&config(2), &mut browser, &mut server).unwrap();
        assert_eq!(artifact.iterations.len(), 1);
        assert_eq!(artifact.iterations[0].iteration, 2);
        assert_eq!(artifact.metadata.requested_iterations, 2);
    }

    #[test]
    fn test_all_iterations_failing_is_fatal() {
        let (recorder, mut browser, mut server) = fakes(100);
        let err = run_benchmark(&config(2), &mut browser, &mut server).unwrap_err();
        assert!(matches!(err, RunError::AllIterationsFailed { attempted: 2, .. }));
        // Teardown still happens on the error path
        assert!(recorder.borrow().browser_closed);
        assert!(recorder.borrow().server_shutdown);
    }

    #[test]
    fn test_build_failure_is_fatal() {
        let (recorder, mut browser, _) = fakes(0);
        let mut server = FakeServer {
            recorder: Rc::clone(&recorder),
            fail: true,
        };
        let err = run_benchmark(&config(1), &mut browser, &mut server).unwrap_err();
        assert!(matches!(err, RunError::Serve(ServeError::Build(_))));
        assert_eq!(recorder.borrow().pages_opened, 0);
        assert!(recorder.borrow().browser_closed);
        assert!(!recorder.borrow().server_shutdown);
    }

    #[test]
    fn test_remote_mode_skips_server_and_sends_headers() {
        let (recorder, mut browser, mut server) = fakes(0);
        let mut cfg = config(1);
        cfg.remote = Some(RemoteConfig {
            enabled: true,
            url: Some("https://staging.example.com/".to_string()),
            headers: BTreeMap::from([("x-bench".to_string(), "1".to_string())]),
        });
        run_benchmark(&cfg, &mut browser, &mut server).unwrap();

        let rec = recorder.borrow();
        assert_eq!(rec.navigations, vec!["https://staging.example.com/".to_string()]);
        assert_eq!(rec.extra_headers[0].get("x-bench").map(String::as_str), Some("1"));
        assert!(!rec.server_shutdown);
    }

    #[test]
    fn test_invalid_config_aborts_before_browser_use() {
        let (recorder, mut browser, mut server) = fakes(0);
        let err = run_benchmark(&config(0), &mut browser, &mut server).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
        assert_eq!(recorder.borrow().pages_opened, 0);
    }

    #[test]
    fn test_iteration_budget_exceeded() {
        let (recorder, mut browser, mut server) = fakes(0);
        let mut cfg = config(1);
        cfg.runner.retries = 0;
        cfg.runner.iteration_timeout = Duration::ZERO;
        let err = run_benchmark(&cfg, &mut browser, &mut server).unwrap_err();
        assert!(err.to_string().contains("budget"));
        // Spent before the first navigation, and the page is still closed
        let rec = recorder.borrow();
        assert!(rec.navigations.is_empty());
        assert_eq!(rec.pages_closed, 1);
    }

    #[test]
    fn test_call_timeouts_never_exceed_iteration_budget() {
        let (recorder, mut browser, mut server) = fakes(0);
        let mut cfg = config(2);
        cfg.runner.iteration_timeout = Duration::from_secs(5);
        cfg.runner.navigation_timeout = Duration::from_secs(30);
        cfg.detection.timeout = Duration::from_secs(10);
        run_benchmark(&cfg, &mut browser, &mut server).unwrap();

        let rec = recorder.borrow();
        // navigate, wait_for_selector, wait_for_load_state per iteration
        assert_eq!(rec.timeouts.len(), 6);
        assert!(rec
            .timeouts
            .iter()
            .all(|t| *t <= Duration::from_secs(5) && !t.is_zero()));
    }

    #[test]
    fn test_short_call_timeouts_pass_through() {
        let (recorder, mut browser, mut server) = fakes(0);
        let mut cfg = config(1);
        cfg.runner.iteration_timeout = Duration::from_secs(600);
        cfg.runner.navigation_timeout = Duration::from_secs(30);
        run_benchmark(&cfg, &mut browser, &mut server).unwrap();

        let rec = recorder.borrow();
        assert_eq!(rec.timeouts[0], Duration::from_secs(30));
        assert_eq!(rec.timeouts[1], cfg.detection.timeout);
    }

    #[test]
    fn test_slow_navigation_spends_budget_before_selector_wait() {
        let (recorder, mut browser, mut server) = fakes(0);
        recorder.borrow_mut().navigate_delay = Duration::from_millis(40);
        let mut cfg = config(1);
        cfg.runner.retries = 0;
        cfg.runner.iteration_timeout = Duration::from_millis(20);
        let err = run_benchmark(&cfg, &mut browser, &mut server).unwrap_err();

        match err {
            RunError::AllIterationsFailed { last_error, .. } => {
                assert!(last_error.contains("budget"), "{}", last_error)
            }
            other => panic!("unexpected error {:?}", other),
        }
        let rec = recorder.borrow();
        // Only the navigation ran; the selector wait was never started
        assert_eq!(rec.timeouts.len(), 1);
        assert!(rec.timeouts[0] <= Duration::from_millis(20));
        assert!(rec.browser_closed);
    }
}
