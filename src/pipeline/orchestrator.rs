use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use once_cell::sync::OnceCell;
use rayon::ThreadPoolBuilder;

use crate::error::ReductionError;
use crate::pipeline::resolvent::{ReducedColumn, ReducedMatrices, ReducedMatrixBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    Sequential,
    #[default]
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => f.write_str("sequential"),
            ExecutionMode::Parallel => f.write_str("parallel"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "sequential" | "lin" => Ok(ExecutionMode::Sequential),
            "parallel" | "par" => Ok(ExecutionMode::Parallel),
            other => Err(format!(
                "unknown mode {other:?} (expected sequential|lin|parallel|par)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker: usize,
    pub columns: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorStats {
    pub mode: ExecutionMode,
    pub workers: Vec<WorkerStats>,
}

impl OrchestratorStats {
    pub fn columns(&self) -> usize {
        self.workers.iter().map(|w| w.columns).sum()
    }

    pub fn iterations(&self) -> usize {
        self.workers.iter().map(|w| w.iterations).sum()
    }
}

/// `nr` write-once column slots. A slot can be filled exactly once, so two
/// workers can never publish the same column.
struct ColumnArena {
    slots: Vec<OnceCell<ReducedColumn>>,
}

impl ColumnArena {
    fn new(columns: usize) -> Self {
        Self {
            slots: (0..columns).map(|_| OnceCell::new()).collect(),
        }
    }

    fn store(&self, column: ReducedColumn) -> std::result::Result<(), ReductionError> {
        let index = column.index;
        let slot = self
            .slots
            .get(index)
            .ok_or(ReductionError::DimensionMismatch {
                expected: self.slots.len(),
                got: index + 1,
            })?;
        slot.set(column)
            .map_err(|_| ReductionError::ColumnRewritten(index))
    }

    fn write_into(self, matrices: &mut ReducedMatrices) -> Result<()> {
        for (index, slot) in self.slots.into_iter().enumerate() {
            let column = slot
                .into_inner()
                .ok_or_else(|| anyhow!("column {index} was never computed"))?;
            matrices.write_column(&column);
        }
        Ok(())
    }
}

/// State shared by every worker loop of one run.
struct SharedRun<'b, 'a> {
    builder: &'b ReducedMatrixBuilder<'a>,
    arena: ColumnArena,
    cursor: AtomicUsize,
    abort: AtomicBool,
    first_error: Mutex<Option<ReductionError>>,
}

impl<'b, 'a> SharedRun<'b, 'a> {
    fn new(builder: &'b ReducedMatrixBuilder<'a>) -> Self {
        Self {
            builder,
            arena: ColumnArena::new(builder.column_count()),
            cursor: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    /// Claims columns until none are left or another worker failed.
    fn worker_loop(&self, worker: usize) -> WorkerStats {
        let total = self.builder.column_count();
        let mut scratch = self.builder.scratch();
        let mut stats = WorkerStats {
            worker,
            ..WorkerStats::default()
        };
        while !self.abort.load(Ordering::Acquire) {
            let column = self.cursor.fetch_add(1, Ordering::Relaxed);
            if column >= total {
                break;
            }
            let outcome = self
                .builder
                .compute_column(column, &mut scratch)
                .and_then(|reduced| {
                    let iterations = reduced.iterations;
                    self.arena.store(reduced).map(|_| iterations)
                });
            match outcome {
                Ok(iterations) => {
                    stats.columns += 1;
                    stats.iterations += iterations;
                }
                Err(err) => {
                    self.fail(err);
                    break;
                }
            }
        }
        debug!(
            "worker {} finished: {} columns, {} resolvent iterations",
            worker, stats.columns, stats.iterations
        );
        stats
    }

    fn fail(&self, err: ReductionError) {
        self.abort.store(true, Ordering::Release);
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert(err);
    }

    fn finish(self, matrices: &mut ReducedMatrices) -> Result<()> {
        let failure = self
            .first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(err) = failure {
            return Err(err.into());
        }
        self.arena.write_into(matrices)
    }
}

/// Distributes the per-column resolvent work over a pool of workers that
/// claim columns dynamically.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelOrchestrator {
    mode: ExecutionMode,
    threads: Option<usize>,
}

impl ParallelOrchestrator {
    pub fn new(mode: ExecutionMode, threads: Option<usize>) -> Self {
        Self { mode, threads }
    }

    pub fn thread_count(&self) -> usize {
        match self.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => self
                .threads
                .filter(|&threads| threads > 0)
                .unwrap_or_else(|| {
                    thread::available_parallelism()
                        .map(NonZeroUsize::get)
                        .unwrap_or(1)
                }),
        }
    }

    /// Fills every column of `matrices`. The matrix shapes are checked before
    /// any work starts.
    pub fn run(
        &self,
        builder: &ReducedMatrixBuilder<'_>,
        matrices: &mut ReducedMatrices,
    ) -> Result<OrchestratorStats> {
        matrices.validate(builder.column_count())?;
        let shared = SharedRun::new(builder);
        let workers = self.dispatch(&shared)?;
        shared.finish(matrices)?;
        let stats = OrchestratorStats {
            mode: self.mode,
            workers,
        };
        for worker in &stats.workers {
            info!(
                "worker {:3}: {:5} columns, {:8} iterations",
                worker.worker, worker.columns, worker.iterations
            );
        }
        Ok(stats)
    }

    /// Runs the worker loops of `shared` on the calling thread or on a fresh
    /// pool, depending on the mode.
    fn dispatch(&self, shared: &SharedRun<'_, '_>) -> Result<Vec<WorkerStats>> {
        match self.mode {
            ExecutionMode::Sequential => Ok(vec![shared.worker_loop(0)]),
            ExecutionMode::Parallel => {
                let threads = self.thread_count();
                let pool = ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("rgmatrix-worker-{index}"))
                    .build()
                    .with_context(|| format!("start worker pool with {threads} threads"))?;
                info!(
                    "distributing {} columns over {} workers",
                    shared.builder.column_count(),
                    threads
                );
                Ok(pool.broadcast(|ctx| shared.worker_loop(ctx.index())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DirectedGraph;
    use crate::selection::SelectedNodes;
    use crate::spectral::{PowerConfig, SpectralProjector, SpectralState};
    use nalgebra::DMatrix;

    fn fixture() -> (DirectedGraph, SelectedNodes, SpectralState) {
        let graph = DirectedGraph::from_edges(
            7,
            vec![
                (0, 1),
                (0, 2),
                (1, 2),
                (2, 3),
                (3, 0),
                (3, 4),
                (4, 5),
                (5, 1),
                (5, 3),
                (2, 5),
            ],
        )
        .expect("graph");
        let selection = SelectedNodes::new(vec![0, 3, 6], 7).expect("selection");
        let spectral = SpectralProjector::new(&graph, PowerConfig::default())
            .compute(&selection)
            .expect("projection");
        (graph, selection, spectral)
    }

    fn column_of(matrix: &DMatrix<f64>, index: usize) -> Vec<f64> {
        matrix.column(index).iter().copied().collect()
    }

    fn blank_column(index: usize, len: usize) -> ReducedColumn {
        ReducedColumn {
            index,
            g_r: vec![0.0; len],
            g_rr: vec![0.0; len],
            g_pr: vec![0.0; len],
            g_qr: vec![0.0; len],
            g_i: vec![0.0; len],
            iterations: 0,
            quality: 0.0,
        }
    }

    #[test]
    fn parallel_run_matches_sequential_bitwise() {
        let (graph, selection, spectral) = fixture();
        let builder =
            ReducedMatrixBuilder::new(&graph, &spectral, &selection, PowerConfig::default())
                .expect("builder");

        let mut sequential = ReducedMatrices::zeros(3);
        let seq_stats = ParallelOrchestrator::new(ExecutionMode::Sequential, None)
            .run(&builder, &mut sequential)
            .expect("sequential");
        let mut parallel = ReducedMatrices::zeros(3);
        let par_stats = ParallelOrchestrator::new(ExecutionMode::Parallel, Some(3))
            .run(&builder, &mut parallel)
            .expect("parallel");

        assert_eq!(sequential, parallel);
        assert_eq!(seq_stats.columns(), 3);
        assert_eq!(par_stats.columns(), 3);
        assert_eq!(par_stats.workers.len(), 3);
        assert_eq!(seq_stats.iterations(), par_stats.iterations());
    }

    #[test]
    fn single_column_equals_full_run() {
        let (graph, selection, spectral) = fixture();
        let builder =
            ReducedMatrixBuilder::new(&graph, &spectral, &selection, PowerConfig::default())
                .expect("builder");
        let mut matrices = ReducedMatrices::zeros(3);
        ParallelOrchestrator::new(ExecutionMode::Parallel, Some(2))
            .run(&builder, &mut matrices)
            .expect("run");

        let mut scratch = builder.scratch();
        let column = builder.compute_column(1, &mut scratch).expect("column");
        assert_eq!(column_of(&matrices.g_r, 1), column.g_r);
        assert_eq!(column_of(&matrices.g_rr, 1), column.g_rr);
        assert_eq!(column_of(&matrices.g_pr, 1), column.g_pr);
        assert_eq!(column_of(&matrices.g_qr, 1), column.g_qr);
        assert_eq!(column_of(&matrices.g_i, 1), column.g_i);
    }

    #[test]
    fn mis_sized_output_is_rejected_before_work() {
        let (graph, selection, spectral) = fixture();
        let builder =
            ReducedMatrixBuilder::new(&graph, &spectral, &selection, PowerConfig::default())
                .expect("builder");
        let mut matrices = ReducedMatrices::zeros(3);
        matrices.g_rr = DMatrix::zeros(4, 4);
        let err = ParallelOrchestrator::new(ExecutionMode::Sequential, None)
            .run(&builder, &mut matrices)
            .unwrap_err();
        assert!(err.to_string().contains("G_rr"));
    }

    #[test]
    fn arena_slots_are_write_once() {
        let arena = ColumnArena::new(2);
        arena.store(blank_column(1, 2)).expect("first write");
        assert_eq!(
            arena.store(blank_column(1, 2)),
            Err(ReductionError::ColumnRewritten(1))
        );
    }

    #[test]
    fn failing_column_aborts_remaining_work() {
        let (graph, selection, spectral) = fixture();
        let builder =
            ReducedMatrixBuilder::new(&graph, &spectral, &selection, PowerConfig::default())
                .expect("builder");
        let shared = SharedRun::new(&builder);
        shared.arena.store(blank_column(0, 3)).expect("prefill");

        let workers = ParallelOrchestrator::new(ExecutionMode::Sequential, None)
            .dispatch(&shared)
            .expect("dispatch");
        assert_eq!(workers[0].columns, 0);
        assert!(shared.abort.load(Ordering::Acquire));
        assert_eq!(shared.cursor.load(Ordering::Relaxed), 1);

        let mut matrices = ReducedMatrices::zeros(3);
        let err = shared.finish(&mut matrices).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReductionError>(),
            Some(&ReductionError::ColumnRewritten(0))
        );
        assert_eq!(matrices, ReducedMatrices::zeros(3));
    }

    #[test]
    fn parallel_failure_surfaces_the_column_error() {
        let (graph, selection, spectral) = fixture();
        let builder =
            ReducedMatrixBuilder::new(&graph, &spectral, &selection, PowerConfig::default())
                .expect("builder");
        let shared = SharedRun::new(&builder);
        shared.arena.store(blank_column(2, 3)).expect("prefill");

        let workers = ParallelOrchestrator::new(ExecutionMode::Parallel, Some(2))
            .dispatch(&shared)
            .expect("dispatch");
        assert!(workers.iter().map(|w| w.columns).sum::<usize>() < 3);
        let err = shared
            .finish(&mut ReducedMatrices::zeros(3))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReductionError>(),
            Some(&ReductionError::ColumnRewritten(2))
        );
    }

    #[test]
    fn first_reported_error_wins() {
        let (graph, selection, spectral) = fixture();
        let builder =
            ReducedMatrixBuilder::new(&graph, &spectral, &selection, PowerConfig::default())
                .expect("builder");
        let shared = SharedRun::new(&builder);
        shared.fail(ReductionError::ColumnRewritten(1));
        shared.fail(ReductionError::VanishingMass { iteration: 4 });

        // an aborted run claims nothing
        assert_eq!(shared.worker_loop(0).columns, 0);
        assert_eq!(shared.cursor.load(Ordering::Relaxed), 0);
        let err = shared
            .finish(&mut ReducedMatrices::zeros(3))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReductionError>(),
            Some(&ReductionError::ColumnRewritten(1))
        );
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("lin".parse::<ExecutionMode>(), Ok(ExecutionMode::Sequential));
        assert_eq!("Parallel".parse::<ExecutionMode>(), Ok(ExecutionMode::Parallel));
        assert!("threads".parse::<ExecutionMode>().is_err());
    }
}
