//! First/third-party request classification.
//!
//! Every request of a page load passes through [`NetworkClassifier`].
//! Script requests are fetched, measured and fulfilled with an added
//! `Timing-Allow-Origin` header so cross-origin timings become readable
//! in the page. Other requests only feed the byte totals.

use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::automation::{
    InterceptedRequest, ResourceType, RouteAction, RouteHandler, Upstream,
};

/// Header that exposes cross-origin resource timing to the page
pub const TIMING_ALLOW_ORIGIN: &str = "timing-allow-origin";

/// One completed script request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSample {
    pub url: String,
    pub size_kb: f64,
    pub duration_ms: f64,
    pub start_offset_ms: f64,
    pub is_third_party: bool,
}

/// Cumulative accounting across all intercepted requests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTotals {
    pub script_requests: u64,
    pub other_requests: u64,
    pub first_party_bytes: u64,
    pub third_party_bytes: u64,
    /// Requests that failed upstream and were continued unmodified
    pub failed_requests: u64,
}

impl RequestTotals {
    pub fn total_bytes(&self) -> u64 {
        self.first_party_bytes + self.third_party_bytes
    }
}

/// Frozen network data for one page load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCapture {
    pub samples: Vec<NetworkSample>,
    pub totals: RequestTotals,
}

/// Lower-cased hostname of `url`, or `None` for host-less URLs (data:, blob:)
pub fn hostname_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.trim_end_matches('.').to_ascii_lowercase())
}

/// Third-party means the request hostname differs from the page hostname.
///
/// Host-less URLs are inline content of the page itself.
pub fn is_third_party(request_url: &str, page_host: &str) -> bool {
    match hostname_of(request_url) {
        Some(host) => host != page_host.trim_end_matches('.').to_ascii_lowercase(),
        None => false,
    }
}

/// True when `host` is one of `service_hosts` or a subdomain of one
pub fn matches_service_host(host: &str, service_hosts: &[String]) -> bool {
    service_hosts.iter().any(|service| {
        let service = service.trim_end_matches('.').to_ascii_lowercase();
        host == service
            || host
                .strip_suffix(service.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

#[derive(Debug, Default)]
struct ClassifierState {
    samples: Vec<NetworkSample>,
    totals: RequestTotals,
}

/// Route handler that classifies and measures requests.
///
/// Clones share state, so the runner keeps one handle to [`drain`](Self::drain)
/// while the page owns the other.
#[derive(Debug, Clone)]
pub struct NetworkClassifier {
    page_host: String,
    state: Arc<Mutex<ClassifierState>>,
}

impl NetworkClassifier {
    /// `page_host` is the hostname of the target page, not of any frame
    pub fn new(page_host: impl Into<String>) -> Self {
        Self {
            page_host: page_host.into().to_ascii_lowercase(),
            state: Arc::new(Mutex::new(ClassifierState::default())),
        }
    }

    pub fn page_host(&self) -> &str {
        &self.page_host
    }

    fn lock(&self) -> MutexGuard<'_, ClassifierState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take everything recorded so far and reset for the next page load
    pub fn drain(&self) -> NetworkCapture {
        let mut state = self.lock();
        let taken = std::mem::take(&mut *state);
        NetworkCapture {
            samples: taken.samples,
            totals: taken.totals,
        }
    }
}

impl RouteHandler for NetworkClassifier {
    fn handle(&mut self, request: &InterceptedRequest, upstream: &mut dyn Upstream) -> RouteAction {
        let third_party = is_third_party(&request.url, &self.page_host);

        let mut response = match upstream.fetch(request) {
            Ok(response) => response,
            Err(e) => {
                warn!("Interception failed for {}, continuing unmodified: {}", request.url, e);
                self.lock().totals.failed_requests += 1;
                return RouteAction::Continue;
            }
        };

        let bytes = response.body.len() as u64;
        let mut state = self.lock();
        if third_party {
            state.totals.third_party_bytes += bytes;
        } else {
            state.totals.first_party_bytes += bytes;
        }

        if request.resource_type == ResourceType::Script {
            state.totals.script_requests += 1;
            state.samples.push(NetworkSample {
                url: request.url.clone(),
                size_kb: bytes as f64 / 1024.0,
                duration_ms: response.duration_ms,
                start_offset_ms: request.started_at_ms,
                is_third_party: third_party,
            });
            response
                .headers
                .insert(TIMING_ALLOW_ORIGIN.to_string(), "*".to_string());
        } else {
            state.totals.other_requests += 1;
        }

        RouteAction::Fulfill(response)
    }
}
