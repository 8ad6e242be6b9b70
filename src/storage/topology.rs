//! Dense graph topology: distance and predecessor matrices
//!
//! Both matrices are square, row-major and `nvertex × nvertex`.
//!
//! ```text
//! Edges: 0 → 1 (3), 1 → 2 (1)
//!
//! distances:            predecessors:
//!   [  0,   3, INF]       [NONE,    0, NONE]
//!   [INF,   0,   1]       [NONE, NONE,    1]
//!   [INF, INF,   0]       [NONE, NONE, NONE]
//! ```

use crate::error::{ApspError, ApspResult};

/// Distance sentinel for unreachable pairs
///
/// Half of `i32::MAX`, so adding two sentinel-adjacent values never overflows.
pub const INF: i32 = i32::MAX / 2;

/// Predecessor sentinel: no predecessor (diagonal or unreachable)
pub const NONE: i32 = -1;

/// Host-side graph topology: the canonical distance and predecessor matrices
///
/// Created once from input, mutated in place by a run, and read back as the
/// result.
///
/// # Example
///
/// ```
/// use trueno_apsp::{GraphTopology, INF};
///
/// let topology = GraphTopology::from_edge_list(3, &[(0, 1, 3), (1, 2, 1)]).unwrap();
/// assert_eq!(topology.nvertex(), 3);
/// assert_eq!(topology.distance(0, 1), Some(3));
/// assert_eq!(topology.distance(0, 2), None); // not relaxed yet
/// assert_eq!(topology.distances()[2], INF);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphTopology {
    nvertex: usize,
    distances: Vec<i32>,
    predecessors: Vec<i32>,
}

impl GraphTopology {
    /// Create a topology with no edges: zero diagonal, `INF` elsewhere
    ///
    /// # Errors
    ///
    /// Returns `InvalidTopology` if `nvertex` is zero
    pub fn new(nvertex: usize) -> ApspResult<Self> {
        if nvertex == 0 {
            return Err(ApspError::InvalidTopology(
                "nvertex must be at least 1".to_string(),
            ));
        }
        let len = checked_area(nvertex)?;

        let mut distances = vec![INF; len];
        for i in 0..nvertex {
            distances[i * nvertex + i] = 0;
        }

        Ok(Self {
            nvertex,
            distances,
            predecessors: vec![NONE; len],
        })
    }

    /// Create a topology from a weighted edge list
    ///
    /// Parallel edges keep the smallest weight, self-loops are ignored and
    /// weights at or above [`INF`] mean "no edge".
    ///
    /// # Errors
    ///
    /// Returns `InvalidTopology` if `nvertex` is zero, an edge endpoint is out of
    /// range or a weight is below `-INF`
    pub fn from_edge_list(nvertex: usize, edges: &[(usize, usize, i32)]) -> ApspResult<Self> {
        let mut topology = Self::new(nvertex)?;

        for &(src, dst, weight) in edges {
            if src >= nvertex || dst >= nvertex {
                return Err(ApspError::InvalidTopology(format!(
                    "edge {src} -> {dst} out of range for {nvertex} vertices"
                )));
            }
            check_weight(weight)?;
            if src == dst || weight >= INF {
                continue;
            }
            let cell = &mut topology.distances[src * nvertex + dst];
            *cell = (*cell).min(weight);
        }

        topology.seed_predecessors();
        Ok(topology)
    }

    /// Create a topology from a row-major dense distance matrix
    ///
    /// The diagonal is forced to zero and values at or above [`INF`] are clamped
    /// to [`INF`]. Predecessors are seeded from the finite off-diagonal entries.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTopology` if `nvertex` is zero, the matrix is not
    /// `nvertex × nvertex` or an off-diagonal value is below `-INF`
    pub fn from_dense(nvertex: usize, mut distances: Vec<i32>) -> ApspResult<Self> {
        if nvertex == 0 {
            return Err(ApspError::InvalidTopology(
                "nvertex must be at least 1".to_string(),
            ));
        }
        let len = checked_area(nvertex)?;
        if distances.len() != len {
            return Err(ApspError::InvalidTopology(format!(
                "expected {len} distances for {nvertex} vertices, got {}",
                distances.len()
            )));
        }

        for (idx, d) in distances.iter_mut().enumerate() {
            if idx / nvertex == idx % nvertex {
                *d = 0;
            } else if *d > INF {
                *d = INF;
            } else {
                check_weight(*d)?;
            }
        }

        let mut topology = Self {
            nvertex,
            distances,
            predecessors: vec![NONE; len],
        };
        topology.seed_predecessors();
        Ok(topology)
    }

    /// Create a topology from matrix rows
    ///
    /// # Errors
    ///
    /// Returns `InvalidTopology` if there are no rows or any row length differs
    /// from the number of rows
    pub fn from_rows(rows: &[Vec<i32>]) -> ApspResult<Self> {
        let nvertex = rows.len();
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != nvertex) {
            return Err(ApspError::InvalidTopology(format!(
                "matrix is not square: row {idx} has {} columns, expected {nvertex}",
                row.len()
            )));
        }
        Self::from_dense(nvertex, rows.concat())
    }

    /// Rebuild a topology from stored matrices without reseeding predecessors
    ///
    /// # Errors
    ///
    /// Returns `InvalidTopology` if the matrices are inconsistent
    pub fn from_parts(
        nvertex: usize,
        distances: Vec<i32>,
        predecessors: Vec<i32>,
    ) -> ApspResult<Self> {
        let topology = Self {
            nvertex,
            distances,
            predecessors,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Check the shape invariants: `nvertex ≥ 1`, both matrices `nvertex × nvertex`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTopology` describing the first violated invariant
    pub fn validate(&self) -> ApspResult<()> {
        if self.nvertex == 0 {
            return Err(ApspError::InvalidTopology(
                "nvertex must be at least 1".to_string(),
            ));
        }
        let len = checked_area(self.nvertex)?;
        if self.distances.len() != len || self.predecessors.len() != len {
            return Err(ApspError::InvalidTopology(format!(
                "matrices must be {n}x{n}: distances has {} cells, predecessors has {}",
                self.distances.len(),
                self.predecessors.len(),
                n = self.nvertex
            )));
        }
        Ok(())
    }

    /// Number of vertices
    #[must_use]
    pub const fn nvertex(&self) -> usize {
        self.nvertex
    }

    /// Row-major distance matrix
    #[must_use]
    pub fn distances(&self) -> &[i32] {
        &self.distances
    }

    /// Row-major predecessor matrix
    #[must_use]
    pub fn predecessors(&self) -> &[i32] {
        &self.predecessors
    }

    /// Both matrices, mutable (used when the device mirror is downloaded)
    pub(crate) fn matrices_mut(&mut self) -> (&mut [i32], &mut [i32]) {
        (&mut self.distances, &mut self.predecessors)
    }

    /// Distance from `from` to `to` (`None` if unreachable or out of range)
    #[must_use]
    pub fn distance(&self, from: usize, to: usize) -> Option<i32> {
        self.cell(from, to)
            .map(|idx| self.distances[idx])
            .filter(|&d| d < INF)
    }

    /// Vertex preceding `to` on the shortest known path from `from`
    #[must_use]
    pub fn predecessor(&self, from: usize, to: usize) -> Option<usize> {
        self.cell(from, to)
            .and_then(|idx| usize::try_from(self.predecessors[idx]).ok())
    }

    /// Check if `to` is reachable from `from`
    #[must_use]
    pub fn is_reachable(&self, from: usize, to: usize) -> bool {
        self.distance(from, to).is_some()
    }

    /// Reconstruct the shortest known path from `from` to `to`
    ///
    /// Follows the predecessor matrix backwards from `to`. Returns `None` if the
    /// target is unreachable or the chain does not reach `from` within `nvertex`
    /// vertices.
    ///
    /// # Example
    ///
    /// ```
    /// use trueno_apsp::{algorithms::floyd_warshall, GraphTopology};
    ///
    /// let mut topology = GraphTopology::from_edge_list(3, &[(0, 1, 1), (1, 2, 2)]).unwrap();
    /// floyd_warshall(&mut topology);
    /// assert_eq!(topology.path(0, 2), Some(vec![0, 1, 2]));
    /// assert_eq!(topology.path(2, 0), None);
    /// ```
    #[must_use]
    pub fn path(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        if from >= self.nvertex || to >= self.nvertex {
            return None;
        }
        if from == to {
            return Some(vec![from]);
        }
        if !self.is_reachable(from, to) {
            return None;
        }

        let mut path = vec![to];
        let mut current = to;
        while current != from {
            current = self.predecessor(from, current)?;
            path.push(current);
            if path.len() > self.nvertex {
                return None;
            }
        }

        path.reverse();
        Some(path)
    }

    /// Iterate `(from, to, distance, predecessor)` over finite off-diagonal pairs
    pub fn reachable_pairs(&self) -> impl Iterator<Item = (usize, usize, i32, i32)> + '_ {
        let n = self.nvertex;
        self.distances
            .iter()
            .zip(&self.predecessors)
            .enumerate()
            .filter(move |&(idx, (&d, _))| d < INF && idx / n != idx % n)
            .map(move |(idx, (&d, &p))| (idx / n, idx % n, d, p))
    }

    fn cell(&self, from: usize, to: usize) -> Option<usize> {
        (from < self.nvertex && to < self.nvertex).then(|| from * self.nvertex + to)
    }

    /// `P[i][j] = i` for every finite off-diagonal entry, `NONE` elsewhere
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn seed_predecessors(&mut self) {
        let n = self.nvertex;
        for (idx, (pred, &d)) in self
            .predecessors
            .iter_mut()
            .zip(&self.distances)
            .enumerate()
        {
            let (row, col) = (idx / n, idx % n);
            *pred = if row != col && d < INF { row as i32 } else { NONE };
        }
    }
}

/// Weights below `-INF` could underflow the first relaxation
fn check_weight(weight: i32) -> ApspResult<()> {
    if weight < -INF {
        return Err(ApspError::InvalidTopology(format!(
            "weight {weight} is below the minimum {}",
            -INF
        )));
    }
    Ok(())
}

fn checked_area(nvertex: usize) -> ApspResult<usize> {
    if i32::try_from(nvertex).is_err() {
        return Err(ApspError::InvalidTopology(format!(
            "{nvertex} vertices exceed the i32 predecessor range"
        )));
    }
    nvertex
        .checked_mul(nvertex)
        .ok_or_else(|| ApspError::InvalidTopology(format!("{nvertex}x{nvertex} overflows")))
}
