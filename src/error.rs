//! Error taxonomy for APSP runs
//!
//! Every device-layer failure is fatal for the current run: the mirror is left
//! in an undefined state, so the run aborts and the device storage is released.

use thiserror::Error;

/// Result alias for core APSP operations
pub type ApspResult<T> = std::result::Result<T, ApspError>;

/// APSP run errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApspError {
    /// Zero-size, non-square or inconsistent input (rejected before device work)
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Rejected solver configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device storage for the mirror could not be allocated
    #[error("Device allocation of {bytes} bytes failed: {reason}")]
    DeviceAllocation {
        /// Requested mirror size in bytes
        bytes: u64,
        /// Backend-specific reason
        reason: String,
    },

    /// Host/device copy failed
    #[error("Memory transfer failed: {0}")]
    MemoryTransfer(String),

    /// A parallel step could not be issued
    #[error("Kernel launch failed: {0}")]
    KernelLaunch(String),

    /// Device-side execution fault observed while waiting for completion
    #[error("Device synchronization failed: {0}")]
    Synchronization(String),

    /// Run abandoned between two parallel steps
    #[error("Run cancelled after {completed_steps} steps")]
    Cancelled {
        /// Number of parallel steps that completed before the run stopped
        completed_steps: usize,
    },
}

impl ApspError {
    /// Allocation or transfer failure on the device memory bridge
    #[must_use]
    pub const fn is_device_memory_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceAllocation { .. } | Self::MemoryTransfer(_)
        )
    }

    /// Any failure raised by the accelerator itself (as opposed to input validation)
    #[must_use]
    pub const fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceAllocation { .. }
                | Self::MemoryTransfer(_)
                | Self::KernelLaunch(_)
                | Self::Synchronization(_)
        )
    }
}
