use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ReductionError, Result};
use crate::graph::DirectedGraph;
use crate::numeric::DenseVector;
use crate::selection::SelectedNodes;
use crate::spectral::power::{Direction, PowerConfig, PowerIteration, PowerOutcome};

/// Leading left/right eigenvectors of the operator restricted to the
/// background nodes, normalised so that `psi_left · psi_right == 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralState {
    pub psi_left: DenseVector,
    pub psi_right: DenseVector,
    /// Plain PageRank of the full graph (empty leak set).
    pub pagerank: DenseVector,
    /// Leaked eigenvalue estimate of the right run.
    pub dlambda: f64,
    /// Leaked eigenvalue estimate of the left run.
    pub dlambda_left: f64,
}

impl SpectralState {
    pub fn dim(&self) -> usize {
        self.psi_right.dim()
    }

    /// `v ← ((psiL·v)/scale)·psiR`
    pub fn project_p(&self, vector: &mut DenseVector, scale: f64) -> Result<()> {
        let overlap = self.psi_left.dot(vector)? / scale;
        vector.assign_scaled(overlap, &self.psi_right)
    }

    /// `v ← v - (psiL·v)·psiR`
    pub fn project_q(&self, vector: &mut DenseVector) -> Result<()> {
        let overlap = self.psi_left.dot(vector)?;
        vector.axpy(-overlap, &self.psi_right)
    }
}

/// Runs the three independent power iterations and normalises the
/// resulting eigenvector pair.
pub struct SpectralProjector<'a> {
    graph: &'a DirectedGraph,
    config: PowerConfig,
}

impl<'a> SpectralProjector<'a> {
    pub fn new(graph: &'a DirectedGraph, config: PowerConfig) -> Self {
        Self { graph, config }
    }

    pub fn compute(&self, selection: &SelectedNodes) -> Result<SpectralState> {
        let n = self.graph.node_count();
        if selection.len() >= n {
            return Err(ReductionError::EmptyBackground {
                selected: selection.len(),
            });
        }
        let leak = selection.as_slice();
        let solver = PowerIteration::new(self.graph, self.config);

        let mut psi_right = DenseVector::filled(n, 1.0);
        let mut psi_left = DenseVector::filled(n, 1.0);
        let mut pagerank = DenseVector::filled(n, 1.0);

        let ((right, left), reference) = rayon::join(
            || {
                rayon::join(
                    || solver.run(&mut psi_right, leak, Direction::Forward),
                    || solver.run(&mut psi_left, leak, Direction::Transpose),
                )
            },
            || solver.run(&mut pagerank, &[], Direction::Forward),
        );
        let right = right?;
        let left = left?;
        let reference = reference?;
        log_outcome("right", &right);
        log_outcome("left", &left);
        log_outcome("pagerank", &reference);

        let overlap = psi_left.dot(&psi_right)?;
        if overlap == 0.0 || !overlap.is_finite() {
            return Err(ReductionError::DegenerateProjection { overlap });
        }
        psi_left.scale(1.0 / overlap);

        info!(
            "dlambda = {:24.16}   diff = {:e}",
            right.leaked,
            (right.leaked - left.leaked).abs()
        );
        info!(
            "psi_left^T * psi_right = {:26.16}",
            psi_left.dot(&psi_right)?
        );

        Ok(SpectralState {
            psi_left,
            psi_right,
            pagerank,
            dlambda: right.leaked,
            dlambda_left: left.leaked,
        })
    }
}

fn log_outcome(label: &str, outcome: &PowerOutcome) {
    info!(
        "{} eigenvector: {:?} after {} iterations (rel {:.3e}, leaked {:.16})",
        label, outcome.stop, outcome.iterations, outcome.quality_rel, outcome.leaked
    );
}
