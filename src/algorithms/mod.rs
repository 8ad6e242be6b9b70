//! CPU graph algorithms
//!
//! Sequential baselines for the accelerator kernels.

pub mod floyd_warshall;

pub use floyd_warshall::floyd_warshall;
