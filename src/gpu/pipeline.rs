//! Compute pipelines for the relaxation kernels
//!
//! WGSL fixes the workgroup size and workgroup array lengths at compile time,
//! so the shader sources are templates instantiated once per block width.
//! Every kernel shares one bind group layout:
//!
//! - `@binding(0)`: uniform [`KernelParams`]
//! - `@binding(1)`: storage D (`read_write`)
//! - `@binding(2)`: storage P (`read_write`)

use super::{GpuDevice, GpuMatrixBuffers};
use crate::device::ParallelStep;

const COMMON: &str = include_str!("shaders/common.wgsl");
const NAIVE: &str = include_str!("shaders/naive.wgsl");
const DEPENDENT: &str = include_str!("shaders/dependent.wgsl");
const PARTIALLY_DEPENDENT: &str = include_str!("shaders/partially_dependent.wgsl");
const INDEPENDENT: &str = include_str!("shaders/independent.wgsl");

/// Uniform parameters of one dispatch
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct KernelParams {
    pub(crate) nvertex: u32,
    pub(crate) pitch: u32,
    pub(crate) step: u32,
    pub(crate) _padding: u32,
}

/// Instantiate a kernel template for `tile`-wide blocks
pub(crate) fn kernel_source(body: &str, tile: u32) -> String {
    format!("{COMMON}\n{body}")
        .replace("{{TILE_AREA}}", &(tile * tile).to_string())
        .replace("{{TILE}}", &tile.to_string())
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// The four relaxation pipelines for one block width
#[derive(Debug)]
pub(crate) struct KernelPipelines {
    layout: wgpu::BindGroupLayout,
    naive: wgpu::ComputePipeline,
    dependent: wgpu::ComputePipeline,
    partially_dependent: wgpu::ComputePipeline,
    independent: wgpu::ComputePipeline,
}

impl KernelPipelines {
    /// Compile every kernel for `tile`-wide blocks
    ///
    /// Compilation errors surface through the device's validation error scope.
    pub(crate) fn new(device: &GpuDevice, tile: u32) -> Self {
        let raw = device.device();
        let layout = raw.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("APSP Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1),
                storage_entry(2),
            ],
        });

        let pipeline_layout = raw.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("APSP Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let build = |label: &str, body: &str, entry_point: &str| {
            let module = raw.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(kernel_source(body, tile).into()),
            });
            raw.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        Self {
            naive: build("APSP naive kernel", NAIVE, "relax_pivot"),
            dependent: build("APSP dependent phase", DEPENDENT, "dependent_phase"),
            partially_dependent: build(
                "APSP partially dependent phase",
                PARTIALLY_DEPENDENT,
                "partially_dependent_phase",
            ),
            independent: build("APSP independent phase", INDEPENDENT, "independent_phase"),
            layout,
        }
    }

    /// Pipeline that runs `step`
    pub(crate) const fn pipeline(&self, step: &ParallelStep) -> &wgpu::ComputePipeline {
        match step {
            ParallelStep::NaivePivot { .. } => &self.naive,
            ParallelStep::Dependent { .. } => &self.dependent,
            ParallelStep::PartiallyDependent { .. } => &self.partially_dependent,
            ParallelStep::Independent { .. } => &self.independent,
        }
    }

    /// Bind the parameter buffer and both matrices
    pub(crate) fn bind_group(
        &self,
        device: &GpuDevice,
        params: &wgpu::Buffer,
        matrices: &GpuMatrixBuffers,
    ) -> wgpu::BindGroup {
        device
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("APSP Bind Group"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: matrices.dist.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: matrices.pred.as_entire_binding(),
                    },
                ],
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_source_substitution() {
        let source = kernel_source(DEPENDENT, 16);
        assert!(source.contains("@workgroup_size(16, 16, 1)"));
        assert!(source.contains("array<i32, 256>"));
        assert!(source.contains("const TILE: u32 = 16u;"));
        assert!(!source.contains("{{"));
    }

    #[test]
    fn test_every_kernel_declares_its_entry_point() {
        for (body, entry) in [
            (NAIVE, "fn relax_pivot("),
            (DEPENDENT, "fn dependent_phase("),
            (PARTIALLY_DEPENDENT, "fn partially_dependent_phase("),
            (INDEPENDENT, "fn independent_phase("),
        ] {
            assert!(kernel_source(body, 8).contains(entry), "{entry}");
        }
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<KernelParams>(), 16);
    }

    #[tokio::test]
    async fn test_pipelines_compile() {
        if !GpuDevice::is_gpu_available().await {
            eprintln!("⚠️  Skipping test_pipelines_compile: GPU not available");
            return;
        }

        let device = GpuDevice::new().await.unwrap();
        device.device().push_error_scope(wgpu::ErrorFilter::Validation);
        let _pipelines = KernelPipelines::new(&device, 8);
        let error = device.device().pop_error_scope().await;
        assert!(error.is_none(), "kernel compilation failed: {error:?}");
    }
}
