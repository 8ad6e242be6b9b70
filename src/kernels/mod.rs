//! Relaxation kernels of the host accelerator
//!
//! - `naive`: one full-matrix sweep per pivot vertex
//! - `blocked`: tiled three-phase kernels (dependent, partially dependent, independent)
//!
//! The WGSL versions of the same kernels live in `gpu/shaders/`.

pub(crate) mod blocked;
pub(crate) mod naive;

use crate::storage::INF;

/// What one parallel step did (for trace logging)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StepStats {
    pub(crate) blocks: u64,
    pub(crate) barriers_per_block: usize,
}

/// Length of the path `via + tail`, or `None` if either leg is unreachable
///
/// A sum below `i32::MIN` is also `None`: it cannot be stored, so it never
/// improves a distance.
#[inline]
pub(crate) fn path_through(via: i32, tail: i32) -> Option<i32> {
    if via >= INF || tail >= INF {
        return None;
    }
    via.checked_add(tail)
}
