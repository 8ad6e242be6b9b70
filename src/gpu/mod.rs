//! GPU acceleration for the relaxation kernels
//!
//! Based on research from:
//! - **Harish & Narayanan** (`HiPC` 2007) - one thread per cell, one launch per pivot
//! - **Katz & Kider** (Graphics Hardware 2008) - tiled three-phase Floyd-Warshall
//! - **Lund & Smith** (2010) - workgroup-memory blocking for shortest paths
//!
//! # Architecture
//!
//! - `device`: GPU device initialization and management
//! - `buffer`: pitched D and P buffers, upload and readback
//! - `pipeline`: WGSL kernel templates and compute pipelines
//! - `accelerator`: [`GpuAccelerator`], the wgpu [`Accelerator`](crate::Accelerator)
//!
//! # Feature Flag
//!
//! This module is only available with the `gpu` feature flag:
//! ```bash
//! cargo build --features gpu
//! ```

mod accelerator;
mod buffer;
mod device;
mod pipeline;

pub use accelerator::{GpuAccelerator, GpuMirror};
pub use buffer::GpuMatrixBuffers;
pub use device::{GpuDevice, GpuDeviceError};
