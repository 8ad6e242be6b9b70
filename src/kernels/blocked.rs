//! Blocked (tiled) relaxation kernels
//!
//! Based on Venkataraman et al. (2003) "A blocked all-pairs shortest-paths
//! algorithm" and Katz & Kider (2008). For diagonal tile `k` the driver issues
//! three steps in order:
//!
//! 1. dependent: tile `(k, k)` relaxes through its own pivots
//! 2. partially dependent: tiles `(k, j)` and `(i, k)` relax against the
//!    finalized diagonal tile
//! 3. independent: every other tile `(i, j)` relaxes against `(i, k)` and `(k, j)`
//!
//! Phases 1 and 2 update a tile that other threads of the same block read, so
//! each inner pivot needs a barrier between computing and committing, and
//! another before the next pivot. Phase 3 only reads the two source tiles and
//! needs a single barrier after loading them.

use super::{path_through, StepStats};
use crate::device::block::{SharedTile, ThreadBlock, ThreadIdx};
use crate::device::host::PitchedMatrices;
use crate::device::{tile_index_skipping, LaunchGeometry};
use crate::error::{ApspError, ApspResult};
use rayon::prelude::*;

/// A tile finished by one block: (top-left corner, contents, barriers passed)
type FinishedTile = ((usize, usize), SharedTile, usize);

fn check_round(matrices: &PitchedMatrices, round: u32, width: usize) -> ApspResult<()> {
    let n = matrices.nvertex();
    if width == 0 || round as usize * width >= n {
        return Err(ApspError::KernelLaunch(format!(
            "diagonal tile {round} of width {width} out of range for {n} vertices"
        )));
    }
    Ok(())
}

/// Relax `own` through every inner pivot `p` of the block
///
/// `candidate(own, t, p)` returns the path length through pivot `p` for thread
/// `t` and the predecessor that goes with it.
fn relax_in_place<F>(block: &mut ThreadBlock, own: &mut SharedTile, candidate: F)
where
    F: Fn(&SharedTile, ThreadIdx, usize) -> Option<(i32, i32)>,
{
    let width = block.width();
    let mut staged: Vec<Option<(i32, i32)>> = vec![None; width * width];

    for p in 0..width {
        block.sync_step(|t| {
            staged[t.linear(width)] =
                candidate(&*own, t, p).filter(|&(d, _)| d < own.dist(t.row, t.col));
        });
        block.sync_step(|t| {
            if let Some((d, pred)) = staged[t.linear(width)].take() {
                own.set(t, d, pred);
            }
        });
    }
}

fn commit(matrices: &mut PitchedMatrices, finished: &[FinishedTile]) -> StepStats {
    for (origin, tile, _) in finished {
        tile.store(matrices, *origin);
    }
    StepStats {
        blocks: finished.len() as u64,
        barriers_per_block: finished.first().map_or(0, |(_, _, barriers)| *barriers),
    }
}

/// Phase 1: relax diagonal tile `(round, round)` in isolation
pub(crate) fn dependent_phase(
    matrices: &mut PitchedMatrices,
    round: u32,
    geometry: &LaunchGeometry,
) -> ApspResult<StepStats> {
    let width = geometry.block.x as usize;
    check_round(matrices, round, width)?;

    let corner = round as usize * width;
    let origin = (corner, corner);
    let mut block = ThreadBlock::new(width);
    let mut tile = SharedTile::new(width);

    block.sync_step(|t| tile.load_cell(matrices, origin, t));
    relax_in_place(&mut block, &mut tile, |own, t, p| {
        path_through(own.dist(t.row, p), own.dist(p, t.col)).map(|d| (d, own.pred(p, t.col)))
    });

    Ok(commit(matrices, &[(origin, tile, block.barriers())]))
}

/// Phase 2: relax the tiles of block-row and block-column `round`
///
/// Grid row 0 holds the row tiles `(round, t)`, grid row 1 the column tiles
/// `(t, round)`, with `t` skipping the diagonal.
pub(crate) fn partially_dependent_phase(
    matrices: &mut PitchedMatrices,
    round: u32,
    geometry: &LaunchGeometry,
) -> ApspResult<StepStats> {
    let width = geometry.block.x as usize;
    check_round(matrices, round, width)?;

    let corner = round as usize * width;
    let diag_origin = (corner, corner);
    let grid = geometry.grid;
    let blocks: Vec<(u32, u32)> = (0..grid.y.min(2))
        .flat_map(|by| (0..grid.x).map(move |bx| (bx, by)))
        .collect();

    let source: &PitchedMatrices = matrices;
    let finished: Vec<FinishedTile> = blocks
        .par_iter()
        .map(|&(bx, by)| {
            let other = tile_index_skipping(bx, round) as usize * width;
            let is_row_tile = by == 0;
            let origin = if is_row_tile {
                (corner, other)
            } else {
                (other, corner)
            };

            let mut block = ThreadBlock::new(width);
            let mut diag = SharedTile::new(width);
            let mut own = SharedTile::new(width);
            block.sync_step(|t| {
                diag.load_cell(source, diag_origin, t);
                own.load_cell(source, origin, t);
            });

            if is_row_tile {
                relax_in_place(&mut block, &mut own, |own, t, p| {
                    path_through(diag.dist(t.row, p), own.dist(p, t.col))
                        .map(|d| (d, own.pred(p, t.col)))
                });
            } else {
                relax_in_place(&mut block, &mut own, |own, t, p| {
                    path_through(own.dist(t.row, p), diag.dist(p, t.col))
                        .map(|d| (d, diag.pred(p, t.col)))
                });
            }

            (origin, own, block.barriers())
        })
        .collect();

    Ok(commit(matrices, &finished))
}

/// Phase 3: relax every tile `(i, j)` with `i ≠ round` and `j ≠ round`
pub(crate) fn independent_phase(
    matrices: &mut PitchedMatrices,
    round: u32,
    geometry: &LaunchGeometry,
) -> ApspResult<StepStats> {
    let width = geometry.block.x as usize;
    check_round(matrices, round, width)?;

    let corner = round as usize * width;
    let grid = geometry.grid;
    let blocks: Vec<(u32, u32)> = (0..grid.y)
        .flat_map(|by| (0..grid.x).map(move |bx| (bx, by)))
        .collect();

    let source: &PitchedMatrices = matrices;
    let finished: Vec<FinishedTile> = blocks
        .par_iter()
        .map(|&(bx, by)| {
            let i = tile_index_skipping(by, round) as usize * width;
            let j = tile_index_skipping(bx, round) as usize * width;

            let mut block = ThreadBlock::new(width);
            let mut col_src = SharedTile::new(width);
            let mut row_src = SharedTile::new(width);
            let mut own = SharedTile::new(width);
            block.sync_step(|t| {
                col_src.load_cell(source, (i, corner), t);
                row_src.load_cell(source, (corner, j), t);
                own.load_cell(source, (i, j), t);
            });

            // Each thread only touches its own cell from here on
            block.finish(|t| {
                for p in 0..width {
                    let Some(d) = path_through(col_src.dist(t.row, p), row_src.dist(p, t.col))
                    else {
                        continue;
                    };
                    if d < own.dist(t.row, t.col) {
                        own.set(t, d, row_src.pred(p, t.col));
                    }
                }
            });

            ((i, j), own, block.barriers())
        })
        .collect();

    Ok(commit(matrices, &finished))
}
