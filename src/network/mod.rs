//! Network request interception and first/third-party classification.

pub mod classifier;

pub use classifier::{
    hostname_of, is_third_party, matches_service_host, NetworkCapture, NetworkClassifier,
    NetworkSample, RequestTotals, TIMING_ALLOW_ORIGIN,
};
