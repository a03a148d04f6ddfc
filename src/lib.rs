pub mod cache;
pub mod error;
pub mod graph;
pub mod numeric;
pub mod pipeline;
pub mod report;
pub mod selection;
pub mod spectral;

pub use cache::SpectralCache;
pub use error::ReductionError;
pub use graph::{DirectedGraph, GraphLoader};
pub use numeric::DenseVector;
pub use pipeline::{
    ExecutionMode, MatrixKind, OrchestratorStats, ParallelOrchestrator, ReducedMatrices,
    ReducedMatrixBuilder, ReductionConfig, ReductionSummary, ReductionWorkflow,
};
pub use report::{ReportWriter, default_file_name};
pub use selection::{SelectedNodes, SelectionLoader};
pub use spectral::{PowerConfig, SpectralProjector, SpectralState};
