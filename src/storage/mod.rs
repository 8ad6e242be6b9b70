//! Graph storage layer
//!
//! Provides the dense topology (distance + predecessor matrices) and Parquet persistence.

#[cfg(feature = "storage")]
pub mod parquet;
pub mod topology;

pub use topology::{GraphTopology, INF, NONE};
