//! Contracts for the external collaborators: the page-automation driver and
//! the build-and-serve step. Concrete browser bindings implement these traits;
//! the core only ever talks to them through this module.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors reported by an automation backend
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("Navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

/// Errors from building or serving the app under test
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("Build failed: {0}")]
    Build(String),

    #[error("Server did not become reachable: {0}")]
    Unreachable(String),
}

/// Page load condition to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    DomContentLoaded,
    Load,
    /// No network activity for a short quiet window
    NetworkIdle,
}

/// Resource type as reported by the browser's request interception
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Fetch,
    Xhr,
    Media,
    Other,
}

/// A request paused by route interception
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: String,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Offset from navigation start at which the request was issued
    pub started_at_ms: f64,
}

/// Response fetched on behalf of an intercepted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// Wall time of the upstream fetch
    pub duration_ms: f64,
}

/// Decision taken by a route handler
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    /// Answer the request with this response
    Fulfill(UpstreamResponse),
    /// Let the original request proceed untouched
    Continue,
}

/// Performs the real network fetch for a paused request
pub trait Upstream {
    fn fetch(&mut self, request: &InterceptedRequest) -> Result<UpstreamResponse, PageError>;
}

/// Inspects every matching request while the route is installed
pub trait RouteHandler: Send {
    fn handle(&mut self, request: &InterceptedRequest, upstream: &mut dyn Upstream) -> RouteAction;
}

/// One browser tab
pub trait PageSession {
    /// Run `script` (called with `args`) in the page before any page script
    fn add_init_script(&mut self, script: &str, args: &serde_json::Value) -> Result<(), PageError>;

    /// Route every request whose URL matches `pattern` through `handler`
    fn route(&mut self, pattern: &str, handler: Box<dyn RouteHandler>) -> Result<(), PageError>;

    fn set_extra_headers(&mut self, headers: &BTreeMap<String, String>) -> Result<(), PageError>;

    fn navigate(
        &mut self,
        url: &str,
        wait_until: LoadState,
        timeout: Duration,
    ) -> Result<(), PageError>;

    fn wait_for_load_state(&mut self, state: LoadState, timeout: Duration) -> Result<(), PageError>;

    /// Returns false when the selector did not appear within `timeout`
    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool, PageError>;

    fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, PageError>;

    fn close(&mut self) -> Result<(), PageError>;
}

/// A browser process able to open fresh pages
pub trait Browser {
    fn new_page(&mut self) -> Result<Box<dyn PageSession>, PageError>;

    /// Release the browser process
    fn close(&mut self) -> Result<(), PageError>;
}

/// Builds the app under test and serves it locally
pub trait AppServer {
    /// Returns the reachable base URL
    fn build_and_serve(&mut self, app_name: &str) -> Result<String, ServeError>;

    fn shutdown(&mut self);
}
