//! trueno-apsp: accelerator-first all-pairs shortest paths
//!
//! # Overview
//!
//! trueno-apsp runs Floyd-Warshall on dense weighted digraphs over a massively
//! parallel accelerator: a grid of thread blocks with block-local memory and
//! in-block barriers. Two strategies are available:
//!
//! - **Naive**: one parallel step per pivot vertex, one thread per cell
//! - **Blocked**: tiles of `B × B` cells, three dependent phases per diagonal
//!   tile, inner pivots relaxed in block-local memory
//!
//! # Quick Start
//!
//! ```
//! use trueno_apsp::{solve, ApspConfig, GraphTopology, HostAccelerator, INF};
//!
//! # tokio_test::block_on(async {
//! let edges = [(0, 1, 3), (1, 2, 1), (2, 3, 2), (0, 3, 100)];
//! let mut topology = GraphTopology::from_edge_list(4, &edges).unwrap();
//!
//! let accelerator = HostAccelerator::new();
//! let report = solve(&accelerator, &mut topology, &ApspConfig::default()).await.unwrap();
//!
//! assert_eq!(topology.distance(0, 3), Some(6));
//! assert_eq!(topology.path(0, 3), Some(vec![0, 1, 2, 3]));
//! assert_eq!(topology.distances()[3 * 4], INF);
//! println!("{report}");
//! # });
//! ```
//!
//! # Architecture
//!
//! - **Storage**: dense row-major D and P matrices, Parquet persistence
//! - **Device**: the [`Accelerator`] trait, pitched device mirrors, launch geometry
//! - **Kernels**: naive and blocked relaxation on the host accelerator
//! - **Driver**: step planning, cancellation and run reports
//! - **GPU** (feature `gpu`): the same kernels as WGSL compute shaders on wgpu

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod algorithms;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod storage;

mod kernels;

// GPU acceleration (optional)
#[cfg(feature = "gpu")]
pub mod gpu;

// Re-export core types
pub use config::{ApspConfig, Strategy, DEFAULT_BLOCK_SIZE};
pub use device::{
    Accelerator, DeviceMemoryLimits, DeviceMirror, Dim2, HostAccelerator, HostMirror,
    KernelLaunch, LaunchGeometry, ParallelStep,
};
pub use driver::{schedule, solve, ApspSolver, CancelToken, RunReport};
pub use error::{ApspError, ApspResult};
pub use storage::{GraphTopology, INF, NONE};

#[cfg(feature = "gpu")]
pub use gpu::{GpuAccelerator, GpuDevice, GpuDeviceError};

// Error type for collaborator APIs (Parquet I/O)
pub use anyhow::{Error, Result};
