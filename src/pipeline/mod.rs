pub mod orchestrator;
pub mod resolvent;
pub mod workflow;

pub use orchestrator::{ExecutionMode, OrchestratorStats, ParallelOrchestrator, WorkerStats};
pub use resolvent::{
    ColumnScratch, MatrixKind, ReducedColumn, ReducedMatrices, ReducedMatrixBuilder,
};
pub use workflow::{ReductionConfig, ReductionSummary, ReductionWorkflow};
