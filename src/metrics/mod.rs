//! Per-iteration metric aggregation.

pub mod aggregator;
pub mod types;

pub use aggregator::{
    aggregate, derive_friction_delay, derive_tti, AggregatorInput, AggregatorSettings,
};
pub use types::*;
