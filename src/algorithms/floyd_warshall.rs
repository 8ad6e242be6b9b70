//! Sequential Floyd-Warshall (CPU baseline)
//!
//! Applies the same relaxation rule as the accelerator kernels, one pivot at a
//! time on a single thread. Used as the reference the naive and blocked
//! strategies are checked against.

use crate::storage::{GraphTopology, INF};

/// Relax all pairs through every pivot in place
///
/// For each pivot `u`, `D[i][j]` becomes `D[i][u] + D[u][j]` when that is
/// strictly shorter, and `P[i][j]` takes `P[u][j]`. Paths never extend through
/// an [`INF`] operand, and a sum that underflows `i32` is not an improvement.
///
/// # Complexity
///
/// O(V³) time, no extra memory
///
/// # Example
///
/// ```
/// use trueno_apsp::{algorithms::floyd_warshall, GraphTopology};
///
/// let edges = [(0, 1, 4), (0, 2, 1), (2, 1, 2)];
/// let mut topology = GraphTopology::from_edge_list(3, &edges).unwrap();
/// floyd_warshall(&mut topology);
///
/// // 0→2→1 = 3, not 0→1 = 4
/// assert_eq!(topology.distance(0, 1), Some(3));
/// assert_eq!(topology.predecessor(0, 1), Some(2));
/// ```
pub fn floyd_warshall(topology: &mut GraphTopology) {
    let n = topology.nvertex();
    let (dist, pred) = topology.matrices_mut();

    for u in 0..n {
        for i in 0..n {
            let via = dist[i * n + u];
            if via >= INF {
                continue;
            }
            for j in 0..n {
                let tail = dist[u * n + j];
                if tail >= INF {
                    continue;
                }
                let Some(candidate) = via.checked_add(tail) else {
                    continue;
                };
                if candidate < dist[i * n + j] {
                    dist[i * n + j] = candidate;
                    pred[i * n + j] = pred[u * n + j];
                }
            }
        }
    }
}
