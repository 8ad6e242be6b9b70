//! Execution block emulation: lock-step threads and block-local tiles
//!
//! A block's threads run one barrier-delimited region at a time: every thread
//! finishes the region before any thread enters the next one. This is exactly
//! the ordering `__syncthreads()` / `workgroupBarrier()` provides, so kernels
//! written against [`ThreadBlock`] keep their barrier placement visible.

use super::host::PitchedMatrices;
use crate::storage::{INF, NONE};

/// Thread coordinates inside a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ThreadIdx {
    pub(crate) row: usize,
    pub(crate) col: usize,
}

impl ThreadIdx {
    pub(crate) const fn linear(self, width: usize) -> usize {
        self.row * width + self.col
    }
}

/// One `width × width` block of threads
#[derive(Debug)]
pub(crate) struct ThreadBlock {
    width: usize,
    barriers: usize,
}

impl ThreadBlock {
    pub(crate) const fn new(width: usize) -> Self {
        Self { width, barriers: 0 }
    }

    pub(crate) const fn width(&self) -> usize {
        self.width
    }

    /// Run every thread through one region, then wait at a block barrier
    pub(crate) fn sync_step(&mut self, body: impl FnMut(ThreadIdx)) {
        self.for_each_thread(body);
        self.barriers += 1;
    }

    /// Run every thread through the final region (kernel exit, no barrier)
    pub(crate) fn finish(&mut self, body: impl FnMut(ThreadIdx)) {
        self.for_each_thread(body);
    }

    /// Barriers passed so far
    pub(crate) const fn barriers(&self) -> usize {
        self.barriers
    }

    fn for_each_thread(&self, mut body: impl FnMut(ThreadIdx)) {
        for row in 0..self.width {
            for col in 0..self.width {
                body(ThreadIdx { row, col });
            }
        }
    }
}

/// Block-local copy of one `width × width` tile of D and P
///
/// Cells whose global index falls outside the matrix hold `INF` / `NONE` and
/// are never stored back.
#[derive(Debug, Clone)]
pub(crate) struct SharedTile {
    width: usize,
    dist: Vec<i32>,
    pred: Vec<i32>,
}

impl SharedTile {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            width,
            dist: vec![INF; width * width],
            pred: vec![NONE; width * width],
        }
    }

    /// Thread `t` loads its own cell of the tile whose top-left corner is `origin`
    pub(crate) fn load_cell(
        &mut self,
        matrices: &PitchedMatrices,
        origin: (usize, usize),
        t: ThreadIdx,
    ) {
        let (row, col) = (origin.0 + t.row, origin.1 + t.col);
        let cell = t.linear(self.width);
        if row < matrices.nvertex() && col < matrices.nvertex() {
            self.dist[cell] = matrices.dist(row, col);
            self.pred[cell] = matrices.pred(row, col);
        } else {
            self.dist[cell] = INF;
            self.pred[cell] = NONE;
        }
    }

    /// Write the in-range cells back to the tile whose top-left corner is `origin`
    pub(crate) fn store(&self, matrices: &mut PitchedMatrices, origin: (usize, usize)) {
        let n = matrices.nvertex();
        for r in 0..self.width {
            let row = origin.0 + r;
            if row >= n {
                break;
            }
            for c in 0..self.width {
                let col = origin.1 + c;
                if col >= n {
                    break;
                }
                let cell = r * self.width + c;
                matrices.set(row, col, self.dist[cell], self.pred[cell]);
            }
        }
    }

    pub(crate) fn dist(&self, row: usize, col: usize) -> i32 {
        self.dist[row * self.width + col]
    }

    pub(crate) fn pred(&self, row: usize, col: usize) -> i32 {
        self.pred[row * self.width + col]
    }

    pub(crate) fn set(&mut self, t: ThreadIdx, dist: i32, pred: i32) {
        let cell = t.linear(self.width);
        self.dist[cell] = dist;
        self.pred[cell] = pred;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::GraphTopology;

    #[test]
    fn test_sync_step_runs_all_threads() {
        let mut block = ThreadBlock::new(4);
        let mut visited = Vec::new();
        block.sync_step(|t| visited.push(t.linear(4)));
        assert_eq!(visited, (0..16).collect::<Vec<_>>());
        assert_eq!(block.barriers(), 1);

        block.finish(|_| {});
        assert_eq!(block.barriers(), 1);
    }

    #[test]
    fn test_barrier_orders_reads_after_writes() {
        // Every thread writes its id, then (after the barrier) reads its neighbour's
        let width = 3;
        let mut block = ThreadBlock::new(width);
        let mut shared = vec![0_usize; width * width];
        let mut seen = vec![0_usize; width * width];

        block.sync_step(|t| shared[t.linear(width)] = t.linear(width) + 1);
        block.finish(|t| {
            let neighbour = (t.linear(width) + 1) % (width * width);
            seen[t.linear(width)] = shared[neighbour];
        });

        assert!(seen.iter().all(|&v| v != 0));
    }

    #[test]
    fn test_tile_masks_out_of_range_cells() {
        // 3 vertices, 4-wide tile: row 3 and column 3 are outside the matrix
        let topology = GraphTopology::from_edge_list(3, &[(0, 2, 5)]).unwrap();
        let mut matrices = PitchedMatrices::from_topology(&topology).unwrap();

        let mut block = ThreadBlock::new(4);
        let mut tile = SharedTile::new(4);
        block.sync_step(|t| tile.load_cell(&matrices, (0, 0), t));

        assert_eq!(tile.dist(0, 2), 5);
        assert_eq!(tile.pred(0, 2), 0);
        assert_eq!(tile.dist(3, 0), INF);
        assert_eq!(tile.dist(0, 3), INF);
        assert_eq!(tile.pred(3, 3), NONE);

        tile.set(ThreadIdx { row: 3, col: 3 }, 1, 1);
        tile.store(&mut matrices, (0, 0));
        assert!(matrices.padding_untouched());
    }
}
