//! Device memory sizing and limits
//!
//! Mirrors are pitched: every row is padded to a multiple of
//! [`PITCH_ALIGNMENT_BYTES`], the way `cudaMallocPitch` aligns rows for
//! coalesced access.

/// Row alignment of a device mirror, in bytes
pub const PITCH_ALIGNMENT_BYTES: usize = 256;

const ELEMENT_BYTES: usize = std::mem::size_of::<i32>();

/// Row stride in elements for an `nvertex`-wide matrix
///
/// # Example
///
/// ```
/// use trueno_apsp::device::row_pitch;
///
/// assert_eq!(row_pitch(1), 64);   // 256 bytes of i32
/// assert_eq!(row_pitch(64), 64);
/// assert_eq!(row_pitch(65), 128);
/// ```
#[must_use]
pub const fn row_pitch(nvertex: usize) -> usize {
    let row_bytes = nvertex * ELEMENT_BYTES;
    let padded = row_bytes.div_ceil(PITCH_ALIGNMENT_BYTES) * PITCH_ALIGNMENT_BYTES;
    let pitch = padded / ELEMENT_BYTES;
    if pitch == 0 {
        PITCH_ALIGNMENT_BYTES / ELEMENT_BYTES
    } else {
        pitch
    }
}

/// Device memory limits for mirror allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMemoryLimits {
    /// Total device bytes available for one mirror (both matrices)
    pub capacity_bytes: u64,

    /// Largest single matrix buffer the device accepts
    pub max_matrix_bytes: u64,
}

impl Default for DeviceMemoryLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl DeviceMemoryLimits {
    /// No limit beyond what the allocator itself refuses
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            capacity_bytes: u64::MAX,
            max_matrix_bytes: u64::MAX,
        }
    }

    /// Cap total mirror size at `capacity_bytes`
    #[must_use]
    pub const fn with_capacity(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            max_matrix_bytes: capacity_bytes,
        }
    }

    /// Derive limits from a wgpu device
    ///
    /// Each matrix is one storage buffer, so it must fit both the buffer size
    /// and the storage binding size. Total VRAM is estimated from
    /// `max_buffer_size`.
    #[cfg(feature = "gpu")]
    #[must_use]
    pub fn detect(device: &crate::gpu::GpuDevice) -> Self {
        let limits = device.limits();
        Self {
            capacity_bytes: limits.max_buffer_size,
            max_matrix_bytes: limits
                .max_buffer_size
                .min(u64::from(limits.max_storage_buffer_binding_size)),
        }
    }

    /// Bytes of one pitched `nvertex × pitch` matrix
    #[must_use]
    pub const fn matrix_bytes(nvertex: usize) -> u64 {
        (nvertex as u64) * (row_pitch(nvertex) as u64) * (ELEMENT_BYTES as u64)
    }

    /// Bytes of a full mirror (distances + predecessors)
    #[must_use]
    pub const fn mirror_bytes(nvertex: usize) -> u64 {
        2 * Self::matrix_bytes(nvertex)
    }

    /// Check if a mirror for `nvertex` vertices fits within these limits
    #[must_use]
    pub const fn fits(&self, nvertex: usize) -> bool {
        Self::matrix_bytes(nvertex) <= self.max_matrix_bytes
            && Self::mirror_bytes(nvertex) <= self.capacity_bytes
    }
}
