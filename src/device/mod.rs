//! Accelerator abstraction: device mirrors and parallel steps
//!
//! Based on the CUDA execution model (grids of synchronizable thread blocks
//! with block-local memory), as used by Harish & Narayanan (`HiPC` 2007) and
//! Katz & Kider (Graphics Hardware 2008) for Floyd-Warshall.
//!
//! # Architecture
//!
//! - `memory`: mirror sizing, row pitch and device memory limits
//! - `block`: lock-step thread block with block-local tiles (host emulation)
//! - `host`: [`HostAccelerator`], the always-available CPU emulation
//!
//! A [`KernelLaunch`] is one parallel step. Completion of a launch is the only
//! synchronization point between blocks, so every pivot (naive) and every
//! phase (blocked) is issued as its own launch.

pub(crate) mod block;
pub(crate) mod host;
mod memory;

pub use host::{HostAccelerator, HostMirror};
pub use memory::{row_pitch, DeviceMemoryLimits, PITCH_ALIGNMENT_BYTES};

use crate::error::ApspResult;
use crate::storage::GraphTopology;
use std::fmt;

/// Two-dimensional launch extent (grid of blocks, or threads per block)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim2 {
    /// Extent along x (columns)
    pub x: u32,
    /// Extent along y (rows)
    pub y: u32,
}

impl Dim2 {
    /// Create an extent
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Square extent `n × n`
    #[must_use]
    pub const fn square(n: u32) -> Self {
        Self { x: n, y: n }
    }

    /// Number of elements covered (`x · y`)
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.x as u64 * self.y as u64
    }
}

/// Grid and block dimensions of one parallel step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchGeometry {
    /// Number of blocks
    pub grid: Dim2,
    /// Threads per block
    pub block: Dim2,
}

impl LaunchGeometry {
    /// Create a launch geometry
    #[must_use]
    pub const fn new(grid: Dim2, block: Dim2) -> Self {
        Self { grid, block }
    }

    /// A grid with no blocks launches nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.grid.x == 0 || self.grid.y == 0
    }

    /// Threads in one block
    #[must_use]
    pub const fn threads_per_block(&self) -> u64 {
        self.block.count()
    }
}

/// Kernel executed by one parallel step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParallelStep {
    /// Naive relaxation of every cell through one pivot vertex
    NaivePivot {
        /// Pivot vertex `u`
        pivot: u32,
    },
    /// Blocked phase 1: the diagonal tile `(k, k)` in isolation
    Dependent {
        /// Diagonal tile index `k`
        round: u32,
    },
    /// Blocked phase 2: tiles of block-row `k` and block-column `k`
    PartiallyDependent {
        /// Diagonal tile index `k`
        round: u32,
    },
    /// Blocked phase 3: every tile outside block-row and block-column `k`
    Independent {
        /// Diagonal tile index `k`
        round: u32,
    },
}

impl fmt::Display for ParallelStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NaivePivot { pivot } => write!(f, "naive pivot {pivot}"),
            Self::Dependent { round } => write!(f, "dependent phase k={round}"),
            Self::PartiallyDependent { round } => write!(f, "partially-dependent phase k={round}"),
            Self::Independent { round } => write!(f, "independent phase k={round}"),
        }
    }
}

/// One parallel step together with its launch geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelLaunch {
    /// Kernel to run
    pub step: ParallelStep,
    /// Grid and block dimensions
    pub geometry: LaunchGeometry,
}

/// Map a block index onto tile indices `0..num_blocks` with the diagonal index skipped
///
/// Phases 2 and 3 launch `num_blocks - 1` blocks per dimension; block `b`
/// owns tile `b` below the diagonal and tile `b + 1` from the diagonal on.
#[must_use]
pub const fn tile_index_skipping(block_index: u32, round: u32) -> u32 {
    if block_index >= round {
        block_index + 1
    } else {
        block_index
    }
}

/// Device-resident copy of the distance and predecessor matrices
///
/// Owned by exactly one run; dropping it releases the device storage.
pub trait DeviceMirror {
    /// Number of vertices mirrored
    fn nvertex(&self) -> usize;

    /// Row stride in elements (≥ `nvertex`)
    fn pitch(&self) -> usize;

    /// Device bytes held by this mirror (both matrices)
    fn bytes(&self) -> u64;
}

/// A massively parallel accelerator able to run the relaxation kernels
///
/// Steps issued through [`Accelerator::launch`] execute in issue order: a step
/// starts only after every block of the previous step has finished and its
/// writes are visible. Blocks inside one step are unordered.
#[allow(async_fn_in_trait)]
pub trait Accelerator {
    /// Device mirror type produced by [`Accelerator::upload`]
    type Mirror: DeviceMirror;

    /// Human-readable accelerator name (for reports and logs)
    fn name(&self) -> String;

    /// Largest number of threads one block may hold
    fn max_threads_per_block(&self) -> u32;

    /// Allocate a padded mirror and copy the topology's D and P into it
    ///
    /// `block_width` is the tile width the run will use.
    ///
    /// # Errors
    ///
    /// `DeviceAllocation` if storage cannot be allocated, `MemoryTransfer` if the
    /// copy fails
    async fn upload(&self, topology: &GraphTopology, block_width: u32)
        -> ApspResult<Self::Mirror>;

    /// Issue one parallel step on the mirror
    ///
    /// # Errors
    ///
    /// `KernelLaunch` if the step cannot be issued
    async fn launch(&self, mirror: &mut Self::Mirror, launch: &KernelLaunch) -> ApspResult<()>;

    /// Wait until every issued step has completed
    ///
    /// # Errors
    ///
    /// `Synchronization` if the device reports an execution fault
    async fn synchronize(&self, mirror: &Self::Mirror) -> ApspResult<()>;

    /// Copy D and P back into the topology and release the mirror
    ///
    /// # Errors
    ///
    /// `MemoryTransfer` if the readback fails or the topology shape differs
    async fn download(&self, mirror: Self::Mirror, topology: &mut GraphTopology)
        -> ApspResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim2() {
        assert_eq!(Dim2::square(4), Dim2::new(4, 4));
        assert_eq!(Dim2::new(3, 5).count(), 15);
        assert_eq!(Dim2::square(u32::MAX).count(), u64::from(u32::MAX) * u64::from(u32::MAX));
    }

    #[test]
    fn test_launch_geometry_empty() {
        let geometry = LaunchGeometry::new(Dim2::new(0, 2), Dim2::square(32));
        assert!(geometry.is_empty());
        assert_eq!(geometry.threads_per_block(), 1024);

        let geometry = LaunchGeometry::new(Dim2::new(1, 1), Dim2::square(32));
        assert!(!geometry.is_empty());
    }

    #[test]
    fn test_tile_index_skipping() {
        // round 2 of 5 tiles: blocks 0..4 map to tiles 0, 1, 3, 4
        let tiles: Vec<u32> = (0..4).map(|b| tile_index_skipping(b, 2)).collect();
        assert_eq!(tiles, vec![0, 1, 3, 4]);

        let tiles: Vec<u32> = (0..3).map(|b| tile_index_skipping(b, 0)).collect();
        assert_eq!(tiles, vec![1, 2, 3]);
    }

    #[test]
    fn test_step_display() {
        assert_eq!(ParallelStep::NaivePivot { pivot: 7 }.to_string(), "naive pivot 7");
        assert_eq!(
            ParallelStep::PartiallyDependent { round: 1 }.to_string(),
            "partially-dependent phase k=1"
        );
    }
}
