//! GPU buffers for the pitched distance and predecessor matrices
//!
//! Rows are padded to [`row_pitch`] elements on upload; the padding holds
//! `i32::MIN` so a stray kernel write is visible on readback. Readback goes
//! through a single `MAP_READ` staging buffer holding both matrices.

use super::GpuDevice;
use crate::device::{row_pitch, DeviceMemoryLimits};
use crate::error::{ApspError, ApspResult};
use crate::storage::GraphTopology;

const PADDING_POISON: i32 = i32::MIN;

/// Device-resident D and P of one run
///
/// Both buffers are destroyed when this value is dropped.
#[derive(Debug)]
pub struct GpuMatrixBuffers {
    nvertex: usize,
    pitch: usize,

    /// Pitched distance matrix (`nvertex × pitch` i32)
    pub(crate) dist: wgpu::Buffer,

    /// Pitched predecessor matrix (`nvertex × pitch` i32)
    pub(crate) pred: wgpu::Buffer,
}

fn pitched(rows: &[i32], nvertex: usize, pitch: usize) -> Vec<i32> {
    let mut padded = vec![PADDING_POISON; nvertex * pitch];
    for (dst, src) in padded.chunks_exact_mut(pitch).zip(rows.chunks_exact(nvertex)) {
        dst[..nvertex].copy_from_slice(src);
    }
    padded
}

impl GpuMatrixBuffers {
    /// Allocate both matrices on the device and copy the topology into them
    ///
    /// # Errors
    ///
    /// `DeviceAllocation` if the device reports out-of-memory or rejects the
    /// buffer size
    pub async fn upload(device: &GpuDevice, topology: &GraphTopology) -> ApspResult<Self> {
        let nvertex = topology.nvertex();
        let pitch = row_pitch(nvertex);
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;

        let dist_rows = pitched(topology.distances(), nvertex, pitch);
        let pred_rows = pitched(topology.predecessors(), nvertex, pitch);

        let raw = device.device();
        raw.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        raw.push_error_scope(wgpu::ErrorFilter::Validation);
        let dist = device.create_buffer_init("APSP distances", bytemuck::cast_slice(&dist_rows), usage);
        let pred =
            device.create_buffer_init("APSP predecessors", bytemuck::cast_slice(&pred_rows), usage);
        let validation = raw.pop_error_scope().await;
        let out_of_memory = raw.pop_error_scope().await;

        if let Some(err) = out_of_memory.or(validation) {
            return Err(ApspError::DeviceAllocation {
                bytes: DeviceMemoryLimits::mirror_bytes(nvertex),
                reason: err.to_string(),
            });
        }

        Ok(Self {
            nvertex,
            pitch,
            dist,
            pred,
        })
    }

    /// Number of vertices
    #[must_use]
    pub const fn nvertex(&self) -> usize {
        self.nvertex
    }

    /// Row stride in elements
    #[must_use]
    pub const fn pitch(&self) -> usize {
        self.pitch
    }

    /// Bytes held on the device (both matrices)
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        DeviceMemoryLimits::mirror_bytes(self.nvertex)
    }

    /// Read both matrices back and strip the row padding into `topology`
    ///
    /// # Errors
    ///
    /// `MemoryTransfer` if the topology shape differs or buffer mapping fails
    pub async fn download(&self, device: &GpuDevice, topology: &mut GraphTopology) -> ApspResult<()> {
        let (n, pitch) = (self.nvertex, self.pitch);
        if topology.nvertex() != n {
            return Err(ApspError::MemoryTransfer(format!(
                "device holds {n} vertices, topology has {}",
                topology.nvertex()
            )));
        }

        let matrix_bytes = DeviceMemoryLimits::matrix_bytes(n);
        let staging = device.create_buffer(
            "APSP readback staging",
            2 * matrix_bytes,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let mut encoder = device
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("APSP readback"),
            });
        encoder.copy_buffer_to_buffer(&self.dist, 0, &staging, 0, matrix_bytes);
        encoder.copy_buffer_to_buffer(&self.pred, 0, &staging, matrix_bytes, matrix_bytes);
        device.queue().submit(Some(encoder.finish()));

        let buffer_slice = staging.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        device.device().poll(wgpu::Maintain::Wait);
        rx.receive()
            .await
            .ok_or_else(|| ApspError::MemoryTransfer("readback channel closed".to_string()))?
            .map_err(|e| ApspError::MemoryTransfer(format!("buffer mapping failed: {e}")))?;

        {
            let data = buffer_slice.get_mapped_range();
            let values: &[i32] = bytemuck::cast_slice(&data);
            let (dist, pred) = values.split_at(n * pitch);

            let (out_d, out_p) = topology.matrices_mut();
            for (row, (dst_d, dst_p)) in out_d
                .chunks_exact_mut(n)
                .zip(out_p.chunks_exact_mut(n))
                .enumerate()
            {
                dst_d.copy_from_slice(&dist[row * pitch..row * pitch + n]);
                dst_p.copy_from_slice(&pred[row * pitch..row * pitch + n]);
            }
        }
        staging.unmap();
        staging.destroy();

        Ok(())
    }
}

impl Drop for GpuMatrixBuffers {
    fn drop(&mut self) {
        self.dist.destroy();
        self.pred.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitched_layout() {
        let rows = vec![1, 2, 3, 4];
        let padded = pitched(&rows, 2, 64);

        assert_eq!(padded.len(), 128);
        assert_eq!(&padded[..2], &[1, 2]);
        assert_eq!(&padded[64..66], &[3, 4]);
        assert!(padded[2..64].iter().all(|&v| v == PADDING_POISON));
    }

    #[tokio::test]
    async fn test_upload_download_roundtrip() {
        if !GpuDevice::is_gpu_available().await {
            eprintln!("⚠️  Skipping test_upload_download_roundtrip: GPU not available");
            return;
        }

        let device = GpuDevice::new().await.unwrap();
        let topology = GraphTopology::from_edge_list(5, &[(0, 1, 3), (4, 2, 9)]).unwrap();

        let buffers = GpuMatrixBuffers::upload(&device, &topology).await.unwrap();
        assert_eq!(buffers.nvertex(), 5);
        assert_eq!(buffers.pitch(), 64);
        assert_eq!(buffers.bytes(), DeviceMemoryLimits::mirror_bytes(5));

        let mut result = GraphTopology::new(5).unwrap();
        buffers.download(&device, &mut result).await.unwrap();
        assert_eq!(result, topology);
    }

    #[tokio::test]
    async fn test_download_shape_mismatch() {
        if !GpuDevice::is_gpu_available().await {
            eprintln!("⚠️  Skipping test_download_shape_mismatch: GPU not available");
            return;
        }

        let device = GpuDevice::new().await.unwrap();
        let buffers = GpuMatrixBuffers::upload(&device, &GraphTopology::new(3).unwrap())
            .await
            .unwrap();
        let mut other = GraphTopology::new(4).unwrap();
        assert!(matches!(
            buffers.download(&device, &mut other).await,
            Err(ApspError::MemoryTransfer(_))
        ));
    }
}
