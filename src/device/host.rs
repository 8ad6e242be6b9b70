//! Host accelerator: the execution model emulated on CPU cores
//!
//! Device memory is a pitched host allocation owned by the mirror, the blocks
//! of one parallel step run on the rayon pool, and threads inside a block run
//! in lock-step (see `block`). Each `launch` returns only after every block
//! has finished, which gives the same step-completion guarantee as a
//! synchronized kernel launch.

use super::memory::{row_pitch, DeviceMemoryLimits};
use super::{Accelerator, DeviceMirror, KernelLaunch, ParallelStep};
use crate::error::{ApspError, ApspResult};
use crate::kernels::{blocked, naive};
use crate::storage::GraphTopology;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Value written into the row padding; any kernel write there is a masking bug
const PADDING_POISON: i32 = i32::MIN;

/// Largest block the host emulation accepts (matches CUDA's 1024 threads)
const MAX_THREADS_PER_BLOCK: u32 = 1024;

/// Pitched device storage for D and P
#[derive(Debug)]
pub(crate) struct PitchedMatrices {
    nvertex: usize,
    pitch: usize,
    dist: Vec<i32>,
    pred: Vec<i32>,
}

impl PitchedMatrices {
    /// Allocate pitched storage and copy the topology into it
    pub(crate) fn from_topology(topology: &GraphTopology) -> ApspResult<Self> {
        let nvertex = topology.nvertex();
        let pitch = row_pitch(nvertex);
        let len = nvertex * pitch;

        let mut dist = allocate(len, nvertex)?;
        let mut pred = allocate(len, nvertex)?;

        for (row, (src_d, src_p)) in topology
            .distances()
            .chunks_exact(nvertex)
            .zip(topology.predecessors().chunks_exact(nvertex))
            .enumerate()
        {
            dist[row * pitch..row * pitch + nvertex].copy_from_slice(src_d);
            pred[row * pitch..row * pitch + nvertex].copy_from_slice(src_p);
        }

        Ok(Self {
            nvertex,
            pitch,
            dist,
            pred,
        })
    }

    /// Copy the unpadded matrices into the topology
    pub(crate) fn copy_into(&self, topology: &mut GraphTopology) -> ApspResult<()> {
        if topology.nvertex() != self.nvertex {
            return Err(ApspError::MemoryTransfer(format!(
                "mirror holds {} vertices, topology has {}",
                self.nvertex,
                topology.nvertex()
            )));
        }

        let (n, pitch) = (self.nvertex, self.pitch);
        let (dst_d, dst_p) = topology.matrices_mut();
        for (row, (out_d, out_p)) in dst_d
            .chunks_exact_mut(n)
            .zip(dst_p.chunks_exact_mut(n))
            .enumerate()
        {
            out_d.copy_from_slice(&self.dist[row * pitch..row * pitch + n]);
            out_p.copy_from_slice(&self.pred[row * pitch..row * pitch + n]);
        }
        Ok(())
    }

    pub(crate) const fn nvertex(&self) -> usize {
        self.nvertex
    }

    pub(crate) const fn pitch(&self) -> usize {
        self.pitch
    }

    fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(
            row < self.nvertex && col < self.nvertex,
            "device access ({row}, {col}) outside {n}x{n} matrix",
            n = self.nvertex
        );
        row * self.pitch + col
    }

    pub(crate) fn dist(&self, row: usize, col: usize) -> i32 {
        self.dist[self.index(row, col)]
    }

    pub(crate) fn pred(&self, row: usize, col: usize) -> i32 {
        self.pred[self.index(row, col)]
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, dist: i32, pred: i32) {
        let idx = self.index(row, col);
        self.dist[idx] = dist;
        self.pred[idx] = pred;
    }

    /// Raw pitched storage `(dist, pred)`; callers mask columns `≥ nvertex`
    pub(crate) fn storage_mut(&mut self) -> (&mut [i32], &mut [i32]) {
        (&mut self.dist, &mut self.pred)
    }

    /// Check that every padding cell still holds the poison value
    pub(crate) fn padding_untouched(&self) -> bool {
        let (n, pitch) = (self.nvertex, self.pitch);
        [&self.dist, &self.pred].iter().all(|storage| {
            storage
                .chunks_exact(pitch)
                .all(|row| row[n..].iter().all(|&v| v == PADDING_POISON))
        })
    }
}

fn allocate(len: usize, nvertex: usize) -> ApspResult<Vec<i32>> {
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(len)
        .map_err(|e| ApspError::DeviceAllocation {
            bytes: DeviceMemoryLimits::matrix_bytes(nvertex),
            reason: e.to_string(),
        })?;
    storage.resize(len, PADDING_POISON);
    Ok(storage)
}

/// Returns the mirror's bytes to the accelerator when dropped
#[derive(Debug)]
struct AllocationGuard {
    bytes: u64,
    in_use: Arc<AtomicU64>,
}

impl Drop for AllocationGuard {
    fn drop(&mut self) {
        self.in_use.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

/// Device mirror of the host accelerator
///
/// Dropping the mirror releases its storage, on success and failure paths alike.
#[derive(Debug)]
pub struct HostMirror {
    matrices: PitchedMatrices,
    block_width: usize,
    allocation: AllocationGuard,
}

impl HostMirror {
    /// Check that no kernel wrote past column `nvertex` into the row padding
    #[must_use]
    pub fn padding_untouched(&self) -> bool {
        self.matrices.padding_untouched()
    }
}

impl DeviceMirror for HostMirror {
    fn nvertex(&self) -> usize {
        self.matrices.nvertex()
    }

    fn pitch(&self) -> usize {
        self.matrices.pitch()
    }

    fn bytes(&self) -> u64 {
        self.allocation.bytes
    }
}

/// Accelerator emulated on the CPU
///
/// # Example
///
/// ```
/// use trueno_apsp::{solve, ApspConfig, GraphTopology, HostAccelerator};
///
/// # tokio_test::block_on(async {
/// let accelerator = HostAccelerator::new();
/// let mut topology = GraphTopology::from_edge_list(3, &[(0, 1, 2), (1, 2, 2)]).unwrap();
///
/// solve(&accelerator, &mut topology, &ApspConfig::default()).await.unwrap();
/// assert_eq!(topology.distance(0, 2), Some(4));
/// assert_eq!(accelerator.bytes_in_use(), 0);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct HostAccelerator {
    limits: DeviceMemoryLimits,
    in_use: Arc<AtomicU64>,
}

impl HostAccelerator {
    /// Create a host accelerator without a memory cap
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host accelerator that refuses mirrors larger than `capacity_bytes`
    #[must_use]
    pub fn with_memory_limit(capacity_bytes: u64) -> Self {
        Self {
            limits: DeviceMemoryLimits::with_capacity(capacity_bytes),
            in_use: Arc::default(),
        }
    }

    /// Memory limits applied to uploads
    #[must_use]
    pub const fn limits(&self) -> DeviceMemoryLimits {
        self.limits
    }

    /// Bytes currently held by live mirrors
    #[must_use]
    pub fn bytes_in_use(&self) -> u64 {
        self.in_use.load(Ordering::SeqCst)
    }

    fn check_geometry(mirror: &HostMirror, launch: &KernelLaunch) -> ApspResult<()> {
        let block = launch.geometry.block;
        if block.x != block.y || block.x == 0 {
            return Err(ApspError::KernelLaunch(format!(
                "{}: blocks must be square and non-empty, got {}x{}",
                launch.step, block.x, block.y
            )));
        }
        if block.count() > u64::from(MAX_THREADS_PER_BLOCK) {
            return Err(ApspError::KernelLaunch(format!(
                "{}: {} threads per block exceed the limit of {MAX_THREADS_PER_BLOCK}",
                launch.step,
                block.count()
            )));
        }
        let tiled = !matches!(launch.step, ParallelStep::NaivePivot { .. });
        if tiled && block.x as usize != mirror.block_width {
            return Err(ApspError::KernelLaunch(format!(
                "{}: block width {} does not match tile width {}",
                launch.step, block.x, mirror.block_width
            )));
        }
        Ok(())
    }
}

impl Accelerator for HostAccelerator {
    type Mirror = HostMirror;

    fn name(&self) -> String {
        format!("host ({} rayon threads)", rayon::current_num_threads())
    }

    fn max_threads_per_block(&self) -> u32 {
        MAX_THREADS_PER_BLOCK
    }

    async fn upload(&self, topology: &GraphTopology, block_width: u32) -> ApspResult<HostMirror> {
        topology.validate()?;
        let nvertex = topology.nvertex();
        let bytes = DeviceMemoryLimits::mirror_bytes(nvertex);

        if !self.limits.fits(nvertex) {
            return Err(ApspError::DeviceAllocation {
                bytes,
                reason: format!(
                    "exceeds device capacity of {} bytes",
                    self.limits.capacity_bytes
                ),
            });
        }

        let matrices = PitchedMatrices::from_topology(topology)?;
        self.in_use.fetch_add(bytes, Ordering::SeqCst);
        let allocation = AllocationGuard {
            bytes,
            in_use: Arc::clone(&self.in_use),
        };

        log::debug!(
            "Uploaded {nvertex}x{nvertex} topology to host mirror (pitch {}, {bytes} bytes)",
            matrices.pitch()
        );

        Ok(HostMirror {
            matrices,
            block_width: block_width as usize,
            allocation,
        })
    }

    async fn launch(&self, mirror: &mut HostMirror, launch: &KernelLaunch) -> ApspResult<()> {
        Self::check_geometry(mirror, launch)?;
        let geometry = &launch.geometry;
        let matrices = &mut mirror.matrices;

        let stats = match launch.step {
            ParallelStep::NaivePivot { pivot } => {
                naive::relax_pivot(matrices, pivot as usize, geometry)?
            }
            ParallelStep::Dependent { round } => {
                blocked::dependent_phase(matrices, round, geometry)?
            }
            ParallelStep::PartiallyDependent { round } => {
                blocked::partially_dependent_phase(matrices, round, geometry)?
            }
            ParallelStep::Independent { round } => {
                blocked::independent_phase(matrices, round, geometry)?
            }
        };

        log::trace!(
            "{}: {} blocks, {} barriers per block",
            launch.step,
            stats.blocks,
            stats.barriers_per_block
        );
        Ok(())
    }

    async fn synchronize(&self, _mirror: &HostMirror) -> ApspResult<()> {
        // Every host launch has completed when it returns
        Ok(())
    }

    async fn download(&self, mirror: HostMirror, topology: &mut GraphTopology) -> ApspResult<()> {
        mirror.matrices.copy_into(topology)?;
        log::debug!(
            "Downloaded {n}x{n} topology, releasing {} bytes",
            mirror.bytes(),
            n = mirror.nvertex()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Dim2, LaunchGeometry};
    use crate::storage::{INF, NONE};

    #[test]
    fn test_pitched_roundtrip() {
        let topology = GraphTopology::from_edge_list(5, &[(0, 4, 3), (4, 1, 2)]).unwrap();
        let matrices = PitchedMatrices::from_topology(&topology).unwrap();

        assert_eq!(matrices.pitch(), 64);
        assert_eq!(matrices.dist(0, 4), 3);
        assert_eq!(matrices.pred(4, 1), 4);
        assert_eq!(matrices.dist(1, 0), INF);
        assert!(matrices.padding_untouched());

        let mut copy = GraphTopology::new(5).unwrap();
        matrices.copy_into(&mut copy).unwrap();
        assert_eq!(copy, topology);
    }

    #[test]
    fn test_copy_into_shape_mismatch() {
        let topology = GraphTopology::new(3).unwrap();
        let matrices = PitchedMatrices::from_topology(&topology).unwrap();
        let mut other = GraphTopology::new(4).unwrap();
        assert!(matches!(
            matrices.copy_into(&mut other),
            Err(ApspError::MemoryTransfer(_))
        ));
    }

    #[test]
    fn test_padding_detects_stray_write() {
        let topology = GraphTopology::new(2).unwrap();
        let mut matrices = PitchedMatrices::from_topology(&topology).unwrap();
        let pitch = matrices.pitch();
        let (dist, _) = matrices.storage_mut();
        dist[pitch - 1] = 0;
        assert!(!matrices.padding_untouched());
    }

    #[tokio::test]
    async fn test_upload_tracks_and_releases_memory() {
        let accelerator = HostAccelerator::new();
        let topology = GraphTopology::new(33).unwrap();

        let mirror = accelerator.upload(&topology, 32).await.unwrap();
        assert_eq!(mirror.nvertex(), 33);
        assert_eq!(mirror.pitch(), 64);
        assert_eq!(mirror.bytes(), DeviceMemoryLimits::mirror_bytes(33));
        assert_eq!(accelerator.bytes_in_use(), mirror.bytes());

        drop(mirror);
        assert_eq!(accelerator.bytes_in_use(), 0);
    }

    #[tokio::test]
    async fn test_upload_over_limit() {
        let accelerator = HostAccelerator::with_memory_limit(1024);
        let topology = GraphTopology::new(16).unwrap();

        let err = accelerator.upload(&topology, 32).await.unwrap_err();
        assert!(err.is_device_memory_error());
        assert_eq!(accelerator.bytes_in_use(), 0);
    }

    #[tokio::test]
    async fn test_download_restores_topology() {
        let accelerator = HostAccelerator::new();
        let original = GraphTopology::from_edge_list(3, &[(2, 0, 7)]).unwrap();

        let mirror = accelerator.upload(&original, 32).await.unwrap();
        let mut result = GraphTopology::new(3).unwrap();
        accelerator.download(mirror, &mut result).await.unwrap();

        assert_eq!(result, original);
        assert_eq!(result.predecessors()[6], 2);
        assert_eq!(result.predecessors()[0], NONE);
        assert_eq!(accelerator.bytes_in_use(), 0);
    }

    #[tokio::test]
    async fn test_launch_rejects_bad_geometry() {
        let accelerator = HostAccelerator::new();
        let topology = GraphTopology::new(8).unwrap();
        let mut mirror = accelerator.upload(&topology, 4).await.unwrap();

        let rectangular = KernelLaunch {
            step: ParallelStep::NaivePivot { pivot: 0 },
            geometry: LaunchGeometry::new(Dim2::square(1), Dim2::new(8, 4)),
        };
        assert!(matches!(
            accelerator.launch(&mut mirror, &rectangular).await,
            Err(ApspError::KernelLaunch(_))
        ));

        let oversized = KernelLaunch {
            step: ParallelStep::NaivePivot { pivot: 0 },
            geometry: LaunchGeometry::new(Dim2::square(1), Dim2::square(64)),
        };
        assert!(accelerator.launch(&mut mirror, &oversized).await.is_err());

        let wrong_tile = KernelLaunch {
            step: ParallelStep::Dependent { round: 0 },
            geometry: LaunchGeometry::new(Dim2::square(1), Dim2::square(8)),
        };
        assert!(accelerator.launch(&mut mirror, &wrong_tile).await.is_err());
    }
}
