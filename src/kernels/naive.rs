//! Naive relaxation kernel: one parallel step per pivot vertex
//!
//! Every thread owns one `(x, y)` cell and relaxes it through the pivot `u`:
//! `D[y][x] = min(D[y][x], D[y][u] + D[u][x])`, taking `P[u][x]` as the new
//! predecessor. Row `u` and column `u` cannot change during step `u` (the
//! diagonal stays zero without negative cycles), so every thread reads them as
//! they were when the step started.

use super::{path_through, StepStats};
use crate::device::host::PitchedMatrices;
use crate::device::LaunchGeometry;
use crate::error::{ApspError, ApspResult};
use rayon::prelude::*;

/// Relax every cell through `pivot`
///
/// Blocks of one grid row run in parallel; threads with a cell outside the
/// matrix are no-ops.
pub(crate) fn relax_pivot(
    matrices: &mut PitchedMatrices,
    pivot: usize,
    geometry: &LaunchGeometry,
) -> ApspResult<StepStats> {
    let n = matrices.nvertex();
    if pivot >= n {
        return Err(ApspError::KernelLaunch(format!(
            "pivot {pivot} out of range for {n} vertices"
        )));
    }

    let width = geometry.block.x as usize;
    let grid = geometry.grid;
    let pitch = matrices.pitch();

    let pivot_row: Vec<i32> = (0..n).map(|x| matrices.dist(pivot, x)).collect();
    let pivot_row_pred: Vec<i32> = (0..n).map(|x| matrices.pred(pivot, x)).collect();
    let pivot_col: Vec<i32> = (0..n).map(|y| matrices.dist(y, pivot)).collect();

    let (dist, pred) = matrices.storage_mut();
    dist.par_chunks_mut(pitch * width)
        .zip(pred.par_chunks_mut(pitch * width))
        .enumerate()
        .take(grid.y as usize)
        .for_each(|(block_y, (dist_rows, pred_rows))| {
            for block_x in 0..grid.x as usize {
                for ty in 0..width {
                    let y = block_y * width + ty;
                    if y >= n {
                        break;
                    }
                    for tx in 0..width {
                        let x = block_x * width + tx;
                        if x >= n {
                            break;
                        }
                        let Some(candidate) = path_through(pivot_col[y], pivot_row[x]) else {
                            continue;
                        };
                        let idx = ty * pitch + x;
                        if candidate < dist_rows[idx] {
                            dist_rows[idx] = candidate;
                            pred_rows[idx] = pivot_row_pred[x];
                        }
                    }
                }
            }
        });

    Ok(StepStats {
        blocks: grid.count(),
        barriers_per_block: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Dim2;
    use crate::storage::{GraphTopology, INF, NONE};

    fn geometry(n: u32, width: u32) -> LaunchGeometry {
        LaunchGeometry::new(Dim2::square(n.div_ceil(width)), Dim2::square(width))
    }

    #[test]
    fn test_single_pivot_step() {
        // 0 → 1 (3), 1 → 2 (1): pivot 1 creates 0 → 2 (4)
        let topology = GraphTopology::from_edge_list(3, &[(0, 1, 3), (1, 2, 1)]).unwrap();
        let mut matrices = PitchedMatrices::from_topology(&topology).unwrap();

        relax_pivot(&mut matrices, 1, &geometry(3, 2)).unwrap();

        assert_eq!(matrices.dist(0, 2), 4);
        assert_eq!(matrices.pred(0, 2), 1);
        assert_eq!(matrices.dist(2, 0), INF);
        assert_eq!(matrices.pred(2, 0), NONE);
        assert!(matrices.padding_untouched());
    }

    #[test]
    fn test_pivot_without_paths_changes_nothing() {
        let topology = GraphTopology::from_edge_list(4, &[(0, 1, 3), (1, 2, 1)]).unwrap();
        let mut matrices = PitchedMatrices::from_topology(&topology).unwrap();

        // Nothing enters vertex 0
        relax_pivot(&mut matrices, 0, &geometry(4, 2)).unwrap();

        let mut after = GraphTopology::new(4).unwrap();
        matrices.copy_into(&mut after).unwrap();
        assert_eq!(after, topology);
    }

    #[test]
    fn test_pivot_out_of_range() {
        let topology = GraphTopology::new(2).unwrap();
        let mut matrices = PitchedMatrices::from_topology(&topology).unwrap();
        let err = relax_pivot(&mut matrices, 2, &geometry(2, 2)).unwrap_err();
        assert!(matches!(err, ApspError::KernelLaunch(_)));
    }

    #[test]
    fn test_partial_blocks_masked() {
        // 5 vertices with 4-wide blocks: the second block row/column is mostly masked
        let edges = [(0, 4, 1), (4, 3, 1), (3, 0, 1)];
        let topology = GraphTopology::from_edge_list(5, &edges).unwrap();
        let mut matrices = PitchedMatrices::from_topology(&topology).unwrap();

        let stats = relax_pivot(&mut matrices, 4, &geometry(5, 4)).unwrap();

        assert_eq!(stats.blocks, 4);
        assert_eq!(matrices.dist(0, 3), 2);
        assert_eq!(matrices.pred(0, 3), 4);
        assert!(matrices.padding_untouched());
    }
}
