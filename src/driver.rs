//! Driver: plans the parallel steps of a run and issues them in order
//!
//! A run validates its inputs, uploads the topology, launches every step of
//! the plan (checking for cancellation between steps), synchronizes and
//! downloads the result into the caller's topology. The device mirror is
//! dropped on every early return, so device storage never outlives a run.

use crate::config::{ApspConfig, Strategy};
use crate::device::{Accelerator, Dim2, KernelLaunch, LaunchGeometry, ParallelStep};
use crate::error::{ApspError, ApspResult};
use crate::storage::GraphTopology;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag that stops a run before its next step
///
/// # Example
///
/// ```
/// use trueno_apsp::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Strategy that was run
    pub strategy: Strategy,
    /// Number of vertices
    pub nvertex: usize,
    /// Tile width `B`
    pub block_size: u32,
    /// Parallel steps launched
    pub steps: usize,
    /// Wall time from upload to the end of download
    pub elapsed: Duration,
    /// Accelerator the run executed on
    pub accelerator: String,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} APSP of {} vertices (B = {}) on {}: {} steps in {:.3} ms",
            self.strategy,
            self.nvertex,
            self.block_size,
            self.accelerator,
            self.steps,
            self.elapsed.as_secs_f64() * 1000.0
        )
    }
}

/// Compute the ordered list of parallel steps for a run
///
/// Naive: one step per pivot over a `ceil(n / B)²` grid. Blocked: for every
/// diagonal tile, the dependent phase on one block, then (when there is more
/// than one tile per dimension) the partially dependent phase on a
/// `(num_blocks - 1) × 2` grid and the independent phase on a
/// `(num_blocks - 1)²` grid. Empty phases are not planned.
///
/// A zero `block_size` or `nvertex` yields an empty plan.
///
/// # Example
///
/// ```
/// use trueno_apsp::{schedule, ParallelStep, Strategy};
///
/// let plan = schedule(Strategy::Blocked, 33, 32);
/// assert_eq!(plan.len(), 6);
/// assert_eq!(plan[0].step, ParallelStep::Dependent { round: 0 });
/// assert_eq!(plan[2].step, ParallelStep::Independent { round: 0 });
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn schedule(strategy: Strategy, nvertex: usize, block_size: u32) -> Vec<KernelLaunch> {
    if nvertex == 0 || block_size == 0 {
        return Vec::new();
    }

    // GraphTopology keeps nvertex within i32 range
    let n = nvertex as u32;
    let num_blocks = n.div_ceil(block_size);
    let block = Dim2::square(block_size);

    match strategy {
        Strategy::Naive => {
            let geometry = LaunchGeometry::new(Dim2::square(num_blocks), block);
            (0..n)
                .map(|pivot| KernelLaunch {
                    step: ParallelStep::NaivePivot { pivot },
                    geometry,
                })
                .collect()
        }
        Strategy::Blocked => {
            let dependent = LaunchGeometry::new(Dim2::square(1), block);
            let partial = LaunchGeometry::new(Dim2::new(num_blocks - 1, 2), block);
            let independent = LaunchGeometry::new(Dim2::square(num_blocks - 1), block);

            let mut plan = Vec::with_capacity(num_blocks as usize * 3);
            for round in 0..num_blocks {
                plan.push(KernelLaunch {
                    step: ParallelStep::Dependent { round },
                    geometry: dependent,
                });
                if partial.is_empty() {
                    continue;
                }
                plan.push(KernelLaunch {
                    step: ParallelStep::PartiallyDependent { round },
                    geometry: partial,
                });
                plan.push(KernelLaunch {
                    step: ParallelStep::Independent { round },
                    geometry: independent,
                });
            }
            plan
        }
    }
}

/// Runs Floyd-Warshall on one accelerator
///
/// # Example
///
/// ```
/// use trueno_apsp::{ApspConfig, ApspSolver, CancelToken, GraphTopology, HostAccelerator};
///
/// # tokio_test::block_on(async {
/// let accelerator = HostAccelerator::new();
/// let mut topology = GraphTopology::from_edge_list(3, &[(0, 1, 1), (1, 2, 1)]).unwrap();
///
/// let report = ApspSolver::new(&accelerator, ApspConfig::naive())
///     .with_cancel_token(CancelToken::new())
///     .run(&mut topology)
///     .await
///     .unwrap();
///
/// assert_eq!(report.steps, 3);
/// assert_eq!(topology.path(0, 2), Some(vec![0, 1, 2]));
/// # });
/// ```
#[derive(Debug)]
pub struct ApspSolver<'a, A: Accelerator> {
    accelerator: &'a A,
    config: ApspConfig,
    cancel: Option<CancelToken>,
}

impl<'a, A: Accelerator> ApspSolver<'a, A> {
    /// Create a solver for `accelerator`
    #[must_use]
    pub const fn new(accelerator: &'a A, config: ApspConfig) -> Self {
        Self {
            accelerator,
            config,
            cancel: None,
        }
    }

    /// Stop the run before the next step once `token` is cancelled
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Configuration used by [`ApspSolver::run`]
    #[must_use]
    pub const fn config(&self) -> &ApspConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    fn check_inputs(&self, topology: &GraphTopology) -> ApspResult<()> {
        topology.validate()?;
        self.config.validate()?;

        let max_threads = self.accelerator.max_threads_per_block();
        if self.config.threads_per_block() > u64::from(max_threads) {
            return Err(ApspError::KernelLaunch(format!(
                "block size {} needs {} threads per block, {} allows {max_threads}",
                self.config.block_size,
                self.config.threads_per_block(),
                self.accelerator.name()
            )));
        }
        Ok(())
    }

    /// Replace the topology's D and P with all-pairs shortest paths
    ///
    /// On error the topology keeps its pre-run contents and device storage has
    /// been released.
    ///
    /// # Errors
    ///
    /// - `InvalidTopology` / `InvalidConfig` before any device work
    /// - `KernelLaunch` if `B²` exceeds the accelerator's threads per block, or
    ///   a step is rejected
    /// - `DeviceAllocation`, `MemoryTransfer`, `Synchronization` from the device
    /// - `Cancelled` if the cancel token fires between steps
    pub async fn run(&self, topology: &mut GraphTopology) -> ApspResult<RunReport> {
        self.check_inputs(topology)?;

        let nvertex = topology.nvertex();
        let ApspConfig {
            strategy,
            block_size,
        } = self.config;
        let plan = schedule(strategy, nvertex, block_size);

        log::debug!("Planned {} {strategy} steps for {nvertex} vertices (B = {block_size})", plan.len());
        if strategy == Strategy::Blocked && nvertex <= block_size as usize {
            log::debug!("Single tile: skipping partially dependent and independent phases");
        }

        let start = Instant::now();
        let mut mirror = self.accelerator.upload(topology, block_size).await?;

        for (completed_steps, launch) in plan.iter().enumerate() {
            if self.is_cancelled() {
                log::warn!(
                    "APSP run cancelled after {completed_steps} of {} steps",
                    plan.len()
                );
                return Err(ApspError::Cancelled { completed_steps });
            }
            self.accelerator.launch(&mut mirror, launch).await?;
        }

        self.accelerator.synchronize(&mirror).await?;
        self.accelerator.download(mirror, topology).await?;

        let report = RunReport {
            strategy,
            nvertex,
            block_size,
            steps: plan.len(),
            elapsed: start.elapsed(),
            accelerator: self.accelerator.name(),
        };
        log::info!("{report}");
        Ok(report)
    }
}

/// Run APSP on `topology` with `config` (shorthand for [`ApspSolver::run`])
///
/// # Errors
///
/// See [`ApspSolver::run`]
pub async fn solve<A: Accelerator>(
    accelerator: &A,
    topology: &mut GraphTopology,
    config: &ApspConfig,
) -> ApspResult<RunReport> {
    ApspSolver::new(accelerator, *config).run(topology).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::floyd_warshall;
    use crate::device::HostAccelerator;

    fn chain(nvertex: usize) -> GraphTopology {
        let edges: Vec<_> = (1..nvertex).map(|v| (v - 1, v, 1)).collect();
        GraphTopology::from_edge_list(nvertex, &edges).unwrap()
    }

    #[test]
    fn test_naive_schedule() {
        let plan = schedule(Strategy::Naive, 5, 4);
        assert_eq!(plan.len(), 5);
        for (u, launch) in plan.iter().enumerate() {
            assert_eq!(launch.step, ParallelStep::NaivePivot { pivot: u as u32 });
            assert_eq!(launch.geometry.grid, Dim2::square(2));
            assert_eq!(launch.geometry.block, Dim2::square(4));
        }
    }

    #[test]
    fn test_blocked_schedule_phase_order() {
        let plan = schedule(Strategy::Blocked, 129, 32);
        // 5 tiles per dimension, three phases each
        assert_eq!(plan.len(), 15);

        for (round, steps) in plan.chunks_exact(3).enumerate() {
            let round = round as u32;
            assert_eq!(steps[0].step, ParallelStep::Dependent { round });
            assert_eq!(steps[0].geometry.grid, Dim2::square(1));
            assert_eq!(steps[1].step, ParallelStep::PartiallyDependent { round });
            assert_eq!(steps[1].geometry.grid, Dim2::new(4, 2));
            assert_eq!(steps[2].step, ParallelStep::Independent { round });
            assert_eq!(steps[2].geometry.grid, Dim2::square(4));
        }
    }

    #[test]
    fn test_single_tile_schedule() {
        for n in [1, 2, 31, 32] {
            let plan = schedule(Strategy::Blocked, n, 32);
            assert_eq!(plan.len(), 1, "n = {n}");
            assert_eq!(plan[0].step, ParallelStep::Dependent { round: 0 });
        }
    }

    #[test]
    fn test_degenerate_schedule() {
        assert!(schedule(Strategy::Blocked, 0, 32).is_empty());
        assert!(schedule(Strategy::Naive, 10, 0).is_empty());
    }

    #[tokio::test]
    async fn test_solve_matches_reference() {
        let accelerator = HostAccelerator::new();
        for config in [
            ApspConfig::naive().with_block_size(4),
            ApspConfig::blocked().with_block_size(4),
        ] {
            let mut topology = chain(10);
            let mut expected = topology.clone();
            floyd_warshall(&mut expected);

            let report = solve(&accelerator, &mut topology, &config).await.unwrap();
            assert_eq!(topology.distances(), expected.distances());
            assert_eq!(report.nvertex, 10);
            assert_eq!(report.strategy, config.strategy);
            assert_eq!(report.steps, schedule(config.strategy, 10, 4).len());
        }
        assert_eq!(accelerator.bytes_in_use(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let accelerator = HostAccelerator::new();
        let mut topology = chain(6);
        let before = topology.clone();

        let token = CancelToken::new();
        token.cancel();
        let err = ApspSolver::new(&accelerator, ApspConfig::default())
            .with_cancel_token(token)
            .run(&mut topology)
            .await
            .unwrap_err();

        assert_eq!(err, ApspError::Cancelled { completed_steps: 0 });
        assert_eq!(topology, before);
        assert_eq!(accelerator.bytes_in_use(), 0);
    }

    #[tokio::test]
    async fn test_block_too_large_for_accelerator() {
        let accelerator = HostAccelerator::new();
        let mut topology = chain(4);
        let err = solve(&accelerator, &mut topology, &ApspConfig::default().with_block_size(64))
            .await
            .unwrap_err();
        assert!(matches!(err, ApspError::KernelLaunch(_)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_upload() {
        let accelerator = HostAccelerator::with_memory_limit(0);
        let mut topology = chain(4);
        let err = solve(&accelerator, &mut topology, &ApspConfig::default().with_block_size(6))
            .await
            .unwrap_err();
        assert!(matches!(err, ApspError::InvalidConfig(_)));
    }

    #[test]
    fn test_report_display() {
        let report = RunReport {
            strategy: Strategy::Blocked,
            nvertex: 64,
            block_size: 32,
            steps: 6,
            elapsed: Duration::from_millis(2),
            accelerator: "host".to_string(),
        };
        assert_eq!(
            report.to_string(),
            "blocked APSP of 64 vertices (B = 32) on host: 6 steps in 2.000 ms"
        );
    }
}
