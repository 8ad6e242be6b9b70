//! wgpu implementation of [`Accelerator`]
//!
//! Every launch is its own queue submission, so a dispatch starts only after
//! the previous one has finished and its storage writes are visible. Device
//! errors are caught with error scopes around allocation, kernel compilation
//! and each submission.

use super::pipeline::{KernelParams, KernelPipelines};
use super::{GpuDevice, GpuDeviceError, GpuMatrixBuffers};
use crate::device::{Accelerator, DeviceMemoryLimits, DeviceMirror, Dim2, KernelLaunch, ParallelStep};
use crate::error::{ApspError, ApspResult};
use crate::storage::GraphTopology;

/// Bytes of workgroup memory one thread needs in the partially dependent phase
/// (two tiles of D and P, one i32 each)
const WORKGROUP_BYTES_PER_THREAD: u32 = 16;

/// Device mirror on a wgpu device
///
/// Dropping the mirror destroys its buffers.
#[derive(Debug)]
pub struct GpuMirror {
    matrices: GpuMatrixBuffers,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    pipelines: KernelPipelines,
    block_width: u32,
}

impl DeviceMirror for GpuMirror {
    fn nvertex(&self) -> usize {
        self.matrices.nvertex()
    }

    fn pitch(&self) -> usize {
        self.matrices.pitch()
    }

    fn bytes(&self) -> u64 {
        self.matrices.bytes()
    }
}

/// Accelerator backed by a wgpu device (Vulkan, Metal, DX12)
///
/// # Example
///
/// ```ignore
/// use trueno_apsp::gpu::GpuAccelerator;
/// use trueno_apsp::{solve, ApspConfig, GraphTopology};
///
/// let accelerator = GpuAccelerator::new().await?;
/// let mut topology = GraphTopology::from_edge_list(3, &[(0, 1, 2), (1, 2, 2)])?;
/// solve(&accelerator, &mut topology, &ApspConfig::default()).await?;
/// assert_eq!(topology.distance(0, 2), Some(4));
/// ```
#[derive(Debug)]
pub struct GpuAccelerator {
    device: GpuDevice,
    limits: DeviceMemoryLimits,
}

impl GpuAccelerator {
    /// Open the default GPU
    ///
    /// # Errors
    ///
    /// Returns `GpuDeviceError` if no adapter or device is available
    pub async fn new() -> Result<Self, GpuDeviceError> {
        Ok(Self::from_device(GpuDevice::new().await?))
    }

    /// Use an already opened device
    #[must_use]
    pub fn from_device(device: GpuDevice) -> Self {
        let limits = DeviceMemoryLimits::detect(&device);
        Self { device, limits }
    }

    /// Underlying device
    #[must_use]
    pub const fn device(&self) -> &GpuDevice {
        &self.device
    }

    /// Memory limits applied to uploads
    #[must_use]
    pub const fn limits(&self) -> DeviceMemoryLimits {
        self.limits
    }
}

const fn step_index(step: ParallelStep) -> u32 {
    match step {
        ParallelStep::NaivePivot { pivot } => pivot,
        ParallelStep::Dependent { round }
        | ParallelStep::PartiallyDependent { round }
        | ParallelStep::Independent { round } => round,
    }
}

impl Accelerator for GpuAccelerator {
    type Mirror = GpuMirror;

    fn name(&self) -> String {
        let info = self.device.info();
        format!("{} ({:?})", info.name, info.backend)
    }

    fn max_threads_per_block(&self) -> u32 {
        let limits = self.device.limits();
        let square_side = limits
            .max_compute_workgroup_size_x
            .min(limits.max_compute_workgroup_size_y);
        limits
            .max_compute_invocations_per_workgroup
            .min(square_side.saturating_mul(square_side))
            .min(limits.max_compute_workgroup_storage_size / WORKGROUP_BYTES_PER_THREAD)
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn upload(&self, topology: &GraphTopology, block_width: u32) -> ApspResult<GpuMirror> {
        topology.validate()?;
        let nvertex = topology.nvertex();

        if !self.limits.fits(nvertex) {
            return Err(ApspError::DeviceAllocation {
                bytes: DeviceMemoryLimits::mirror_bytes(nvertex),
                reason: format!(
                    "exceeds device buffer limits ({} bytes per matrix)",
                    self.limits.max_matrix_bytes
                ),
            });
        }

        let matrices = GpuMatrixBuffers::upload(&self.device, topology).await?;

        let raw = self.device.device();
        raw.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipelines = KernelPipelines::new(&self.device, block_width);
        let params = self.device.create_buffer(
            "APSP Params",
            std::mem::size_of::<KernelParams>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let bind_group = pipelines.bind_group(&self.device, &params, &matrices);
        if let Some(err) = raw.pop_error_scope().await {
            return Err(ApspError::KernelLaunch(format!(
                "building kernels for {block_width}-wide blocks: {err}"
            )));
        }

        log::debug!(
            "Uploaded {nvertex}x{nvertex} topology to {} (pitch {}, {} bytes)",
            self.device.info().name,
            matrices.pitch(),
            matrices.bytes()
        );

        Ok(GpuMirror {
            matrices,
            params,
            bind_group,
            pipelines,
            block_width,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn launch(&self, mirror: &mut GpuMirror, launch: &KernelLaunch) -> ApspResult<()> {
        let geometry = launch.geometry;
        if geometry.block != Dim2::square(mirror.block_width) {
            return Err(ApspError::KernelLaunch(format!(
                "{}: block {}x{} does not match the compiled {w}x{w} workgroup",
                launch.step,
                geometry.block.x,
                geometry.block.y,
                w = mirror.block_width
            )));
        }
        if geometry.is_empty() {
            return Ok(());
        }

        // GraphTopology keeps nvertex and pitch within u32 range
        let params = KernelParams {
            nvertex: mirror.matrices.nvertex() as u32,
            pitch: mirror.matrices.pitch() as u32,
            step: step_index(launch.step),
            _padding: 0,
        };

        let raw = self.device.device();
        raw.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device
            .queue()
            .write_buffer(&mirror.params, 0, bytemuck::bytes_of(&params));

        let mut encoder = raw.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("APSP Command Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("APSP Compute Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(mirror.pipelines.pipeline(&launch.step));
            compute_pass.set_bind_group(0, &mirror.bind_group, &[]);
            compute_pass.dispatch_workgroups(geometry.grid.x, geometry.grid.y, 1);
        }
        self.device.queue().submit(Some(encoder.finish()));

        if let Some(err) = raw.pop_error_scope().await {
            return Err(ApspError::KernelLaunch(format!("{}: {err}", launch.step)));
        }

        log::trace!(
            "{}: dispatched {}x{} workgroups",
            launch.step,
            geometry.grid.x,
            geometry.grid.y
        );
        Ok(())
    }

    async fn synchronize(&self, _mirror: &GpuMirror) -> ApspResult<()> {
        self.device.device().poll(wgpu::Maintain::Wait);
        match self.device.lost_reason() {
            Some(reason) => Err(ApspError::Synchronization(reason)),
            None => Ok(()),
        }
    }

    async fn download(&self, mirror: GpuMirror, topology: &mut GraphTopology) -> ApspResult<()> {
        mirror.matrices.download(&self.device, topology).await?;
        log::debug!(
            "Downloaded {n}x{n} topology, releasing {} bytes",
            mirror.bytes(),
            n = mirror.nvertex()
        );
        Ok(())
    }
}
